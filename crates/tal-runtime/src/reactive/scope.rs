#![forbid(unsafe_code)]

//! Subscription guards and per-owner binding scopes.
//!
//! A [`Subscription`] unregisters its callback when dropped. A
//! [`BindingScope`] collects the subscriptions (and any state they share) of
//! one logical owner, typically a rendered DOM node, so the whole group is
//! released at once.
//!
//! # Invariants
//!
//! 1. Subscriptions are released in reverse registration order on drop.
//! 2. After drop, no callback held by the scope fires again.
//! 3. `clear()` releases everything immediately; the scope stays reusable.
//! 4. A subscription never keeps its source observable alive.

use std::any::Any;
use std::rc::{Rc, Weak};

use super::observable::{Observable, ObservableInner};
use super::observers::{Callback, Change};

/// Guard for one `(observable, property, callback)` registration.
#[must_use = "dropping a Subscription unobserves immediately"]
pub struct Subscription {
    source: Weak<ObservableInner>,
    property: String,
    callback: Weak<dyn Fn(&Change, &str)>,
}

impl Subscription {
    pub(crate) fn new(source: &Observable, property: &str, callback: &Callback) -> Self {
        Self {
            source: source.downgrade_inner(),
            property: property.to_owned(),
            callback: Rc::downgrade(callback),
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Whether both the source and the callback are still alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.source.strong_count() > 0 && self.callback.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let (Some(inner), Some(callback)) = (self.source.upgrade(), self.callback.upgrade())
        else {
            return;
        };
        let source = Observable { inner };
        source.unobserve(&self.property, &callback);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("property", &self.property)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BindingScope
// ---------------------------------------------------------------------------

/// Collects subscriptions for one owner.
///
/// Besides subscriptions, a scope can [`retain`](BindingScope::retain) shared
/// state whose lifetime should match the bindings (callbacks then capture
/// only a `Weak` to it).
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
    retained: Vec<Rc<dyn Any>>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// Keep `sub` alive until the scope is cleared or dropped.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Subscribe within this scope. Returns the scope for chaining.
    pub fn subscribe(
        &mut self,
        source: &Observable,
        property: &str,
        f: impl Fn(&Change, &str) + 'static,
    ) -> &mut Self {
        let sub = source.subscribe(property, f);
        self.subscriptions.push(sub);
        self
    }

    /// Subscribe an existing callback within this scope.
    pub fn subscribe_callback(
        &mut self,
        source: &Observable,
        property: &str,
        callback: &Callback,
    ) -> &mut Self {
        let sub = source.subscribe_callback(property, Rc::clone(callback));
        self.subscriptions.push(sub);
        self
    }

    /// Tie the lifetime of `state` to this scope.
    pub fn retain(&mut self, state: Rc<dyn Any>) {
        self.retained.push(state);
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.retained.is_empty()
    }

    /// Move every binding of `other` into this scope.
    pub fn absorb(&mut self, mut other: BindingScope) {
        self.subscriptions.append(&mut other.subscriptions);
        self.retained.append(&mut other.retained);
    }

    /// Release everything immediately.
    pub fn clear(&mut self) {
        while let Some(sub) = self.subscriptions.pop() {
            drop(sub);
        }
        while let Some(state) = self.retained.pop() {
            drop(state);
        }
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.subscriptions.len())
            .field("retained", &self.retained.len())
            .finish()
    }
}
