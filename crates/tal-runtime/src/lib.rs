#![forbid(unsafe_code)]

//! Reactive TAL template binding.
//!
//! - [`reactive`]: observable wrappers, observers, dependency detection.
//! - [`tales`]: TALES expression resolution (`path:`, `not:`, `exists:`,
//!   string literals, `js:` host expressions from [`host`]).
//! - [`statements`]: directive grammar and semantics.
//! - [`parser`]: the tree walker ([`Renderer`]).
//! - [`config`]: renderer configuration.

pub mod config;
pub mod error;
pub mod host;
pub mod parser;
pub mod reactive;
pub mod statements;
pub mod tales;
pub mod value;

pub use config::TalConfig;
pub use error::{HostError, Result, TalError};
pub use parser::{Converter, Renderer, WeakRenderer, register_converter};
pub use reactive::{
    BindingScope, Callback, Change, Observable, ObservableKind, Subscription, WeakObservable,
    callback, wrap, wrap_array, wrap_function, wrap_object, wrap_primitive,
};
pub use statements::{Directives, Statement, TextMode};
pub use tales::{Expression, Getter};
pub use value::{Array, Function, Object, Value};
