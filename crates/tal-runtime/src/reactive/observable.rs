#![forbid(unsafe_code)]

//! Observable wrapper over objects, arrays, callables and primitives.
//!
//! An [`Observable`] is a shared handle (`Rc`) around a raw target plus its
//! [`ObserverRegistry`] and an optional parent link forming the context chain.
//! Access goes through explicit capability methods instead of ambient
//! interception:
//!
//! | Method | Effect |
//! |---|---|
//! | [`get`](Observable::get) | read, record dependency, wrap nested data on read, fall through to parent |
//! | [`set`](Observable::set) | write, dispatch `prop.beforeChange` and `prop` on change |
//! | [`observe`](Observable::observe) / [`subscribe`](Observable::subscribe) | register a callback |
//! | [`has`](Observable::has) / [`has_in_chain`](Observable::has_in_chain) | presence test |
//!
//! Array edits live in [`array`](super::array); computed properties in
//! [`computed`](super::computed).
//!
//! # Invariants
//!
//! 1. Wrapping the same target twice yields the same `Observable` while a
//!    handle to the first wrapper is alive.
//! 2. A write that leaves the value unchanged dispatches nothing.
//! 3. Writes during a detection window are no-ops that report success.
//! 4. Reserved names (`observe`, `unobserve`, `clearObservers`, `observers`,
//!    `refreshObservers`, `defineComputed`, `context`, `parent`, `root`)
//!    cannot be written.
//! 5. The parent link is assigned once; later assignments are ignored.
//!
//! # Failure Modes
//!
//! - Writing a reserved name: [`TalError::ReservedProperty`].
//! - Writing a computed (getter) property: no-op, returns `Ok(false)`.
//! - A parent that would make the chain cyclic is refused (logged at `warn`).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Result, TalError};
use crate::value::{Array, Function, Object, Slot, Value};

use super::array::MAX_LENGTH;
use super::detect;
use super::observers::{Callback, Change, ObserverRegistry, callback};
use super::scope::Subscription;
use super::wrap::wrap_child;

/// Names with built-in meaning on every observable.
pub const RESERVED: [&str; 9] = [
    "observe",
    "unobserve",
    "clearObservers",
    "observers",
    "refreshObservers",
    "defineComputed",
    "context",
    "parent",
    "root",
];

#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Shape of the wrapped target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservableKind {
    Object,
    Array,
    Function,
    Primitive,
}

pub(crate) enum Target {
    Object(Object),
    Array(Array),
    Function(Function),
    Primitive(RefCell<Value>),
}

/// Link to the enclosing context.
///
/// Wrappers created while reading nested data are owned by their container,
/// so they link back weakly; scope contexts link strongly.
pub(crate) enum ParentLink {
    None,
    Strong(Observable),
    Weak(Weak<ObservableInner>),
}

pub(crate) struct ObservableInner {
    pub(crate) target: Target,
    pub(crate) observers: RefCell<ObserverRegistry>,
    parent: RefCell<ParentLink>,
    /// Recompute subscriptions of computed properties defined on this target.
    pub(crate) computed: RefCell<Vec<Subscription>>,
}

/// Shared handle to an observed value.
///
/// Cloning an `Observable` creates a new handle to the **same** target and
/// observer registry. Equality is handle identity.
#[derive(Clone)]
pub struct Observable {
    pub(crate) inner: Rc<ObservableInner>,
}

/// Non-owning handle to an [`Observable`].
#[derive(Clone)]
pub struct WeakObservable(Weak<ObservableInner>);

impl WeakObservable {
    #[must_use]
    pub fn upgrade(&self) -> Option<Observable> {
        self.0.upgrade().map(|inner| Observable { inner })
    }
}

pub(crate) fn parse_index(property: &str) -> Option<usize> {
    if property.is_empty() || !property.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if property.len() > 1 && property.starts_with('0') {
        return None;
    }
    property.parse().ok().filter(|index| *index < MAX_LENGTH)
}

impl Observable {
    pub(crate) fn from_target(target: Target, parent: ParentLink) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                target,
                observers: RefCell::new(ObserverRegistry::new()),
                parent: RefCell::new(parent),
                computed: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ObservableKind {
        match &self.inner.target {
            Target::Object(_) => ObservableKind::Object,
            Target::Array(_) => ObservableKind::Array,
            Target::Function(_) => ObservableKind::Function,
            Target::Primitive(_) => ObservableKind::Primitive,
        }
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        self.kind() == ObservableKind::Function
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObservable {
        WeakObservable(Rc::downgrade(&self.inner))
    }

    pub(crate) fn downgrade_inner(&self) -> Weak<ObservableInner> {
        Rc::downgrade(&self.inner)
    }

    /// Address identifying the wrapped target (the wrapper itself for primitives).
    pub(crate) fn target_addr(&self) -> usize {
        match &self.inner.target {
            Target::Object(object) => object.addr(),
            Target::Array(array) => array.addr(),
            Target::Function(function) => function.addr(),
            Target::Primitive(_) => Rc::as_ptr(&self.inner) as *const () as usize,
        }
    }

    /// The wrapped target as a plain value.
    #[must_use]
    pub fn raw(&self) -> Value {
        match &self.inner.target {
            Target::Object(object) => Value::Object(object.clone()),
            Target::Array(array) => Value::Array(array.clone()),
            Target::Function(function) => Value::Function(function.clone()),
            Target::Primitive(cell) => cell.borrow().clone(),
        }
    }

    /// Current value of a primitive wrapper, without recording a dependency.
    #[must_use]
    pub fn primitive_value(&self) -> Option<Value> {
        match &self.inner.target {
            Target::Primitive(cell) => Some(cell.borrow().clone()),
            _ => None,
        }
    }

    // -- context chain ------------------------------------------------------

    /// Immediate parent context.
    #[must_use]
    pub fn parent(&self) -> Option<Observable> {
        match &*self.inner.parent.borrow() {
            ParentLink::None => None,
            ParentLink::Strong(parent) => Some(parent.clone()),
            ParentLink::Weak(weak) => weak.upgrade().map(|inner| Observable { inner }),
        }
    }

    /// Top of the context chain (`self` when there is no parent).
    #[must_use]
    pub fn root(&self) -> Observable {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Assign the parent link if none is set yet.
    pub(crate) fn adopt_parent(&self, link: ParentLink) {
        let candidate = match &link {
            ParentLink::None => return,
            ParentLink::Strong(parent) => parent.clone(),
            ParentLink::Weak(weak) => match weak.upgrade() {
                Some(inner) => Observable { inner },
                None => return,
            },
        };
        if !matches!(&*self.inner.parent.borrow(), ParentLink::None) {
            return;
        }
        let mut cursor = Some(candidate);
        while let Some(ancestor) = cursor {
            if ancestor.ptr_eq(self) {
                tracing::warn!(message = "observable.parent.cycle", observable = ?self);
                return;
            }
            cursor = ancestor.parent();
        }
        *self.inner.parent.borrow_mut() = link;
    }

    // -- reads --------------------------------------------------------------

    /// Read `property`, recording it as a dependency when detecting.
    #[must_use]
    pub fn get(&self, property: &str) -> Value {
        self.read(property, true)
    }

    /// Read `property` without recording a dependency.
    #[must_use]
    pub fn peek(&self, property: &str) -> Value {
        self.read(property, false)
    }

    fn read(&self, property: &str, track: bool) -> Value {
        match property {
            "context" => return Value::Observable(self.clone()),
            "parent" => return self.parent().map_or(Value::Undefined, Value::Observable),
            "root" => return Value::Observable(self.root()),
            _ if is_reserved(property) => return Value::Undefined,
            _ => {}
        }
        let tracked = |this: &Self| {
            if track {
                detect::record(this, property);
            }
        };
        match &self.inner.target {
            Target::Object(object) => match object.slot(property) {
                Some(Slot::Data(value)) => {
                    tracked(self);
                    self.wrap_on_read(value, |wrapped| {
                        object.insert(property, wrapped);
                    })
                }
                Some(Slot::Getter(getter)) => {
                    tracked(self);
                    getter(self)
                }
                None => self.read_parent(property, track),
            },
            Target::Array(array) => {
                if property == "length" {
                    tracked(self);
                    return Value::from(array.len());
                }
                let Some(index) = parse_index(property) else {
                    return self.read_parent(property, track);
                };
                tracked(self);
                match array.get(index) {
                    Some(value) => self.wrap_on_read(value, |wrapped| {
                        let replaced = array.with_mut(|items| {
                            items
                                .get_mut(index)
                                .map(|slot| std::mem::replace(slot, wrapped))
                        });
                        drop(replaced);
                    }),
                    None => Value::Undefined,
                }
            }
            Target::Function(function) => match function.prop(property) {
                Some(value) => {
                    tracked(self);
                    self.wrap_on_read(value, |wrapped| {
                        function.set_prop(property, wrapped);
                    })
                }
                None => self.read_parent(property, track),
            },
            Target::Primitive(cell) => {
                if property == "value" {
                    tracked(self);
                    cell.borrow().clone()
                } else {
                    self.read_parent(property, track)
                }
            }
        }
    }

    fn read_parent(&self, property: &str, track: bool) -> Value {
        match self.parent() {
            Some(parent) => parent.read(property, track),
            None => {
                tracing::trace!(message = "observable.get.undefined", property);
                Value::Undefined
            }
        }
    }

    /// Wrap nested objects/arrays on first read and store the wrapper back.
    fn wrap_on_read(&self, value: Value, store: impl FnOnce(Value)) -> Value {
        match value {
            Value::Object(_) | Value::Array(_) => {
                let wrapped = wrap_child(&value, ParentLink::Weak(self.downgrade_inner()));
                store(wrapped.clone());
                wrapped
            }
            other => other,
        }
    }

    /// Whether `property` is a built-in or present on the target itself.
    #[must_use]
    pub fn has(&self, property: &str) -> bool {
        if is_reserved(property) {
            return true;
        }
        match &self.inner.target {
            Target::Object(object) => object.contains_key(property),
            Target::Array(array) => {
                property == "length" || parse_index(property).is_some_and(|i| i < array.len())
            }
            Target::Function(function) => function.has_prop(property),
            Target::Primitive(_) => property == "value",
        }
    }

    /// Whether `property` resolves on this context or any ancestor.
    #[must_use]
    pub fn has_in_chain(&self, property: &str) -> bool {
        self.has(property) || self.parent().is_some_and(|parent| parent.has_in_chain(property))
    }

    // -- writes -------------------------------------------------------------

    /// Write `property`.
    ///
    /// Returns `Ok(true)` when the write was applied, suppressed by an open
    /// detection window, or left the value unchanged; `Ok(false)` when the
    /// property is a computed getter.
    pub fn set(&self, property: &str, value: Value) -> Result<bool> {
        if detect::is_detecting() {
            return Ok(true);
        }
        if is_reserved(property) {
            return Err(TalError::reserved(property));
        }
        match &self.inner.target {
            Target::Object(object) => {
                let old = match object.slot(property) {
                    Some(Slot::Getter(_)) => {
                        tracing::debug!(message = "observable.set.getter", property);
                        return Ok(false);
                    }
                    Some(Slot::Data(old)) => old,
                    None => Value::Undefined,
                };
                if old.strict_eq(&value) {
                    return Ok(true);
                }
                self.dispatch(
                    &format!("{property}.beforeChange"),
                    &Change::Value(old.clone()),
                );
                let replaced = object.insert(property, value);
                drop(replaced);
                let current = object.get(property).unwrap_or_default();
                if !old.strict_eq(&current) {
                    self.dispatch(property, &Change::Value(current));
                }
                Ok(true)
            }
            Target::Array(_) => {
                if property == "length" {
                    let len = value
                        .as_number()
                        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_LENGTH as f64)
                        .ok_or_else(|| TalError::unsupported("invalid array length"))?;
                    self.set_length(len as usize)?;
                    return Ok(true);
                }
                match parse_index(property) {
                    Some(index) => self.set_index(index, value).map(|_| true),
                    None => Err(TalError::unsupported(format!("set {property} on array"))),
                }
            }
            Target::Function(function) => {
                let old = function.prop(property).unwrap_or_default();
                if old.strict_eq(&value) {
                    return Ok(true);
                }
                let replaced = function.set_prop(property, value);
                drop(replaced);
                let current = function.prop(property).unwrap_or_default();
                if !old.strict_eq(&current) {
                    self.dispatch(property, &Change::Value(current));
                }
                Ok(true)
            }
            Target::Primitive(_) => {
                if property == "value" {
                    self.set_value(value)
                } else {
                    Err(TalError::NotAnObject)
                }
            }
        }
    }

    // -- primitives ---------------------------------------------------------

    /// Read a primitive wrapper (records a `value` dependency).
    pub fn value(&self) -> Result<Value> {
        match &self.inner.target {
            Target::Primitive(cell) => {
                detect::record(self, "value");
                Ok(cell.borrow().clone())
            }
            _ => Err(TalError::NotAPrimitive),
        }
    }

    /// Write a primitive wrapper, dispatching `value.beforeChange` with the
    /// old value and then `value` with the new one.
    pub fn set_value(&self, value: Value) -> Result<bool> {
        let Target::Primitive(cell) = &self.inner.target else {
            return Err(TalError::NotAPrimitive);
        };
        if detect::is_detecting() {
            return Ok(true);
        }
        let old = cell.borrow().clone();
        if old.strict_eq(&value) {
            return Ok(true);
        }
        self.dispatch("value.beforeChange", &Change::Value(old));
        let replaced = std::mem::replace(&mut *cell.borrow_mut(), value.clone());
        drop(replaced);
        self.dispatch("value", &Change::Value(value));
        Ok(true)
    }

    // -- callables ----------------------------------------------------------

    /// Invoke a wrapped callable with the parent context as `this`.
    ///
    /// A primitive wrapper acts as an accessor: no argument reads the value,
    /// one argument writes it and returns the new value.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match &self.inner.target {
            Target::Function(function) => {
                let this = self.parent().map_or(Value::Undefined, Value::Observable);
                Ok(function.call(&this, args))
            }
            Target::Primitive(_) => match args.first() {
                None => self.value(),
                Some(next) => {
                    self.set_value(next.clone())?;
                    Ok(next.clone())
                }
            },
            _ => Err(TalError::NotAFunction),
        }
    }

    // -- observers ----------------------------------------------------------

    /// Register `callback` for `property`; returns `false` if already registered.
    pub fn observe(&self, property: &str, callback: &Callback) -> bool {
        self.inner
            .observers
            .borrow_mut()
            .observe(property, Rc::clone(callback))
    }

    pub fn unobserve(&self, property: &str, callback: &Callback) -> bool {
        let removed = self.inner.observers.borrow_mut().unobserve(property, callback);
        removed.is_some()
    }

    /// Register a closure and return a guard that unregisters it on drop.
    pub fn subscribe(&self, property: &str, f: impl Fn(&Change, &str) + 'static) -> Subscription {
        self.subscribe_callback(property, callback(f))
    }

    pub fn subscribe_callback(&self, property: &str, callback: Callback) -> Subscription {
        self.observe(property, &callback);
        Subscription::new(self, property, &callback)
    }

    /// Drop every registered callback.
    pub fn clear_observers(&self) {
        let old = self.inner.observers.borrow_mut().take();
        drop(old);
    }

    #[must_use]
    pub fn observer_count(&self, property: &str) -> usize {
        self.inner.observers.borrow().count(property)
    }

    #[must_use]
    pub fn total_observer_count(&self) -> usize {
        self.inner.observers.borrow().total()
    }

    /// Re-dispatch the current value of every observed property the target holds.
    pub fn refresh_observers(&self) {
        let properties = self.inner.observers.borrow().properties();
        for property in properties {
            if !self.has(&property) || is_reserved(&property) {
                continue;
            }
            let change = match (&self.inner.target, parse_index(&property)) {
                (Target::Array(array), _) if property == "length" => Change::Length(array.len()),
                (Target::Array(_), Some(index)) => Change::Set {
                    index,
                    value: self.peek(&property),
                },
                _ => Change::Value(self.peek(&property)),
            };
            self.dispatch(&property, &change);
        }
    }

    /// Invoke the callbacks observing `property` with `change`.
    pub(crate) fn dispatch(&self, property: &str, change: &Change) {
        let callbacks = self.inner.observers.borrow().snapshot(property);
        if callbacks.is_empty() {
            return;
        }
        tracing::trace!(
            message = "observable.dispatch",
            property,
            observers = callbacks.len()
        );
        for cb in &callbacks {
            cb(change, property);
        }
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Observable {}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("kind", &self.kind())
            .field("observers", &self.inner.observers.borrow().total())
            .finish()
    }
}

impl fmt::Debug for WeakObservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakObservable")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}
