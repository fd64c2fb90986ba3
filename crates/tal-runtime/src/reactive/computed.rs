#![forbid(unsafe_code)]

//! Computed properties.
//!
//! [`Observable::define_computed`] installs a getter on an object wrapper.
//! The getter is run once inside a detection window to learn what it reads;
//! whenever one of those dependencies changes, it is recomputed and, if the
//! result differs (strict equality), observers of the computed name are
//! notified.
//!
//! Dependencies are fixed at definition time. A getter that reads different
//! properties on different branches only tracks the branch taken first.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Result, TalError};
use crate::value::Value;

use super::detect;
use super::observable::{Observable, Target, is_reserved};
use super::observers::{Change, callback};

impl Observable {
    /// Define `name` as a property computed by `getter`.
    ///
    /// Fails with [`TalError::NotAnObject`] on non-object wrappers,
    /// [`TalError::ReservedProperty`] for reserved names and
    /// [`TalError::NestedDetection`] when called inside a detection window.
    pub fn define_computed(
        &self,
        name: &str,
        getter: impl Fn(&Observable) -> Value + 'static,
    ) -> Result<()> {
        let Target::Object(object) = &self.inner.target else {
            return Err(TalError::NotAnObject);
        };
        if is_reserved(name) {
            return Err(TalError::reserved(name));
        }
        let getter: Rc<dyn Fn(&Observable) -> Value> = Rc::new(getter);
        let (initial, deps) = detect::detect_with(|| getter(self))?;
        let replaced = object.define_getter(name, Rc::clone(&getter));
        drop(replaced);

        let cache = Rc::new(RefCell::new(initial));
        let owner = self.downgrade();
        let property = name.to_owned();
        let recompute = callback(move |_: &Change, _: &str| {
            let Some(owner) = owner.upgrade() else {
                return;
            };
            let next = getter(&owner);
            let changed = !cache.borrow().strict_eq(&next);
            if changed {
                let previous = cache.replace(next.clone());
                drop(previous);
                owner.dispatch(&property, &Change::Value(next));
            }
        });

        tracing::debug!(
            message = "observable.computed",
            property = name,
            dependencies = deps.len()
        );
        let subscriptions: Vec<_> = deps
            .iter()
            .filter(|dep| !(dep.observable.ptr_eq(self) && dep.property == name))
            .map(|dep| {
                dep.observable
                    .subscribe_callback(&dep.property, Rc::clone(&recompute))
            })
            .collect();
        drop(deps);
        self.inner.computed.borrow_mut().extend(subscriptions);
        Ok(())
    }
}
