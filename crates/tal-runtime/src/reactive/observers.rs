#![forbid(unsafe_code)]

//! Per-observable callback registry.
//!
//! Maps a property name to the callbacks observing it. Callback identity is
//! the `Rc` allocation: registering the same `Rc` twice for one property is a
//! no-op, and [`ObserverRegistry::unobserve`] removes by the same identity.
//!
//! # Invariants
//!
//! 1. Callbacks for a property fire in registration order.
//! 2. A `(property, callback)` pair is registered at most once.
//! 3. [`ObserverRegistry::snapshot`] hands out clones so dispatch can run
//!    without the registry borrowed (callbacks may (un)subscribe re-entrantly).

use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::value::Value;

/// Payload delivered to observers.
///
/// Plain property writes carry [`Change::Value`]; array mutations carry the
/// edit itself so list consumers can mirror it without diffing.
#[derive(Clone, Debug)]
pub enum Change {
    /// New value (or old value, for `*.beforeChange` notifications).
    Value(Value),
    Push(Vec<Value>),
    Unshift(Vec<Value>),
    Splice {
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    },
    Shift(Value),
    Pop(Value),
    Clear,
    /// Indexed assignment.
    Set { index: usize, value: Value },
    Length(usize),
}

impl Change {
    /// Scalar view of the payload: the value written, removed or assigned, or
    /// the new length. Structural edits without a single value yield `undefined`.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::Value(value) | Self::Shift(value) | Self::Pop(value) => value.clone(),
            Self::Set { value, .. } => value.clone(),
            Self::Length(len) => Value::from(*len),
            Self::Push(_) | Self::Unshift(_) | Self::Splice { .. } | Self::Clear => Value::Undefined,
        }
    }
}

/// Observer callback: `(change, property)`.
pub type Callback = Rc<dyn Fn(&Change, &str)>;

/// Wrap a closure as a [`Callback`].
pub fn callback(f: impl Fn(&Change, &str) + 'static) -> Callback {
    Rc::new(f)
}

pub(crate) fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Property name → ordered callback set.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: AHashMap<String, SmallVec<[Callback; 2]>>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; returns `false` if it was already registered.
    pub fn observe(&mut self, property: &str, callback: Callback) -> bool {
        let list = self.entries.entry(property.to_owned()).or_default();
        if list.iter().any(|existing| same_callback(existing, &callback)) {
            return false;
        }
        list.push(callback);
        true
    }

    /// Remove `callback`, handing it back so the caller drops it outside any borrow.
    pub fn unobserve(&mut self, property: &str, callback: &Callback) -> Option<Callback> {
        let list = self.entries.get_mut(property)?;
        let pos = list.iter().position(|existing| same_callback(existing, callback))?;
        let removed = list.remove(pos);
        if list.is_empty() {
            self.entries.remove(property);
        }
        Some(removed)
    }

    #[must_use]
    pub fn snapshot(&self, property: &str) -> SmallVec<[Callback; 2]> {
        self.entries.get(property).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, property: &str) -> usize {
        self.entries.get(property).map_or(0, SmallVec::len)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.values().map(SmallVec::len).sum()
    }

    /// Observed property names (order unspecified).
    #[must_use]
    pub fn properties(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every registration out, leaving the registry empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("properties", &self.entries.len())
            .field("callbacks", &self.total())
            .finish()
    }
}
