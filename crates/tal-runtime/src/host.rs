#![forbid(unsafe_code)]

//! Host expressions for the `js:` prefix.
//!
//! The host language here is Rust: `js:<name>` (or `js:<name>()`) evaluates
//! a function registered under `<name>` on the current thread. The function
//! receives the context observable; reads it performs are tracked like any
//! other read, so bindings built on it update when those properties change.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::HostError;
use crate::reactive::Observable;
use crate::value::Value;

/// Host expression body.
pub type HostFn = dyn Fn(&Observable) -> Result<Value, HostError>;

thread_local! {
    static REGISTRY: RefCell<AHashMap<String, Rc<HostFn>>> = RefCell::new(AHashMap::new());
}

/// Register (or replace) the host expression `name`.
pub fn register(
    name: impl Into<String>,
    f: impl Fn(&Observable) -> Result<Value, HostError> + 'static,
) {
    let name = name.into();
    tracing::debug!(message = "host.register", name = %name);
    let previous = REGISTRY.with_borrow_mut(|registry| registry.insert(name, Rc::new(f)));
    drop(previous);
}

/// Remove `name`; returns whether it was registered.
pub fn unregister(name: &str) -> bool {
    let previous = REGISTRY.with_borrow_mut(|registry| registry.remove(name));
    previous.is_some()
}

#[must_use]
pub fn is_registered(name: &str) -> bool {
    REGISTRY.with_borrow(|registry| registry.contains_key(name))
}

pub(crate) fn lookup(name: &str) -> Option<Rc<HostFn>> {
    REGISTRY.with_borrow(|registry| registry.get(name).cloned())
}

/// Strip the optional trailing `()` and surrounding whitespace.
pub(crate) fn expression_name(source: &str) -> &str {
    let trimmed = source.trim();
    trimmed
        .strip_suffix("()")
        .map_or(trimmed, str::trim_end)
}

/// Evaluate `source` against `context`, logging failures.
pub(crate) fn evaluate(source: &str, context: &Observable) -> Value {
    let name = expression_name(source);
    let Some(f) = lookup(name) else {
        tracing::warn!(message = "tales.js.unknown", expression = source);
        return Value::Undefined;
    };
    match f(context) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(
                message = "tales.js.failed",
                expression = source,
                function = name,
                context = ?context,
                error = %err
            );
            Value::Undefined
        }
    }
}
