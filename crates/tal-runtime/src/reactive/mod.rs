#![forbid(unsafe_code)]

//! Reactive data layer.
//!
//! - [`Observable`]: identity-stable wrapper over an object, array, callable
//!   or primitive, with per-property observer callbacks and a parent link
//!   forming a context chain.
//! - [`Subscription`]: RAII guard that unobserves on drop.
//! - [`BindingScope`]: collects the subscriptions of one owner.
//! - [`detect`]: thread-local dependency detection window used to discover
//!   which properties an expression reads.
//! - `define_computed`: derived properties recomputed on dependency change.
//!
//! # Architecture
//!
//! Wrappers are `Rc` handles. A thread-local identity table maps raw target
//! addresses to weak wrapper handles, so wrapping the same target twice
//! returns the same wrapper while any handle is alive.
//!
//! Nested objects and arrays are wrapped on first read and the wrapper is
//! written back into the container; the wrapper links to the container
//! weakly, the container owns the wrapper.
//!
//! # Invariants
//!
//! 1. Observers of a property fire in registration order, once per change.
//! 2. A write that leaves the value strictly equal dispatches nothing.
//! 3. Within a detection window reads are recorded and writes suppressed.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    dispatch.

pub mod array;
pub mod computed;
pub mod detect;
mod identity;
pub mod observable;
pub mod observers;
pub mod scope;
mod wrap;

pub use array::{ArrayOp, MAX_LENGTH};
pub use detect::{Dependency, Detection, detect, detect_with, is_detecting};
pub use identity::live_wrappers;
pub use observable::{Observable, ObservableKind, RESERVED, WeakObservable, is_reserved};
pub use observers::{Callback, Change, ObserverRegistry, callback};
pub use scope::{BindingScope, Subscription};
pub use wrap::{wrap, wrap_array, wrap_function, wrap_object, wrap_primitive};
