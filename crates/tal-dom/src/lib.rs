#![forbid(unsafe_code)]

//! Minimal in-memory DOM for TAL templates.
//!
//! The template engine only needs a small DOM contract: create, clone,
//! insert, replace and remove nodes; read and write attributes, live
//! properties and text; parse and serialize HTML fragments; and deliver
//! events and property changes to callbacks. This crate provides exactly
//! that over a generational arena so it runs natively and deterministically
//! in tests.
//!
//! # Example
//!
//! ```
//! use tal_dom::{Document, Event};
//!
//! let doc = Document::from_html("<p id=greet>Hello</p>");
//! let p = doc.element_by_id("greet").unwrap();
//! doc.set_text_content(p, "Hi");
//! assert_eq!(doc.outer_html(p), "<p id=\"greet\">Hi</p>");
//! assert_eq!(doc.dispatch_event(p, Event::new("click")), 0);
//! ```

pub mod document;
pub mod event;
pub mod html;
pub mod node;

pub use document::{Document, WeakDocument};
pub use event::Event;
pub use html::decode_entities;
pub use node::{Listener, NodeId, NodeKind, Property, PropertyObserver};
