#![forbid(unsafe_code)]

//! Wrapping raw values into [`Observable`]s.
//!
//! Wrapping is identity-stable: a raw target that already has a live wrapper
//! gets that wrapper back, and a parent is only attached if the wrapper has
//! none yet.

use std::cell::RefCell;

use crate::error::{Result, TalError};
use crate::value::{Array, Value};

use super::identity;
use super::observable::{Observable, ParentLink, Target};

fn link(parent: Option<&Observable>) -> ParentLink {
    parent.map_or(ParentLink::None, |p| ParentLink::Strong(p.clone()))
}

fn wrap_target(addr: usize, make: impl FnOnce() -> Target, parent: ParentLink) -> (Observable, bool) {
    if let Some(existing) = identity::lookup(addr) {
        existing.adopt_parent(parent);
        return (existing, false);
    }
    let observable = Observable::from_target(make(), ParentLink::None);
    observable.adopt_parent(parent);
    identity::register(addr, &observable);
    tracing::trace!(message = "observable.wrap", kind = ?observable.kind());
    (observable, true)
}

/// Wrap compound elements of a freshly wrapped array so each element's
/// context chain reaches the array.
fn wrap_elements(observable: &Observable, array: &Array) {
    let items = array.to_vec();
    if !items
        .iter()
        .any(|item| matches!(item, Value::Object(_) | Value::Array(_)))
    {
        return;
    }
    let wrapped: Vec<Value> = items
        .iter()
        .map(|item| match item {
            Value::Object(_) | Value::Array(_) => {
                wrap_child(item, ParentLink::Weak(observable.downgrade_inner()))
            }
            other => other.clone(),
        })
        .collect();
    let previous = array.with_mut(|vec| std::mem::replace(vec, wrapped));
    drop(previous);
}

/// Wrap `value` with the given parent link; primitives and other
/// non-compound values are returned unchanged.
pub(crate) fn wrap_child(value: &Value, parent: ParentLink) -> Value {
    match value {
        Value::Object(object) => {
            let object = object.clone();
            let (obs, _) = wrap_target(object.addr(), || Target::Object(object), parent);
            Value::Observable(obs)
        }
        Value::Array(array) => {
            let array = array.clone();
            let raw = array.clone();
            let (obs, fresh) = wrap_target(array.addr(), || Target::Array(array), parent);
            if fresh {
                wrap_elements(&obs, &raw);
            }
            Value::Observable(obs)
        }
        Value::Function(function) => {
            let function = function.clone();
            let (obs, _) = wrap_target(function.addr(), || Target::Function(function), parent);
            Value::Observable(obs)
        }
        Value::Observable(obs) => {
            obs.adopt_parent(parent);
            value.clone()
        }
        _ => value.clone(),
    }
}

/// Wrap any value.
///
/// Objects, arrays and callables become (identity-stable) observables;
/// primitives become primitive observables; `undefined`, `null`, nodes,
/// events and existing observables are returned unchanged (an existing
/// observable without a parent adopts `parent`).
#[must_use]
pub fn wrap(value: Value, parent: Option<&Observable>) -> Value {
    match value {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Value::Observable(
            Observable::from_target(Target::Primitive(RefCell::new(value)), link(parent)),
        ),
        Value::Undefined | Value::Null | Value::Node(_) | Value::Event(_) => value,
        other => wrap_child(&other, link(parent)),
    }
}

fn expect_shape(
    value: &Value,
    parent: Option<&Observable>,
    accepts: impl Fn(&Value) -> bool,
    error: TalError,
) -> Result<Observable> {
    let raw_ok = match value {
        Value::Observable(obs) => accepts(&obs.raw()),
        other => accepts(other),
    };
    if !raw_ok {
        return Err(error);
    }
    match wrap_child(value, link(parent)) {
        Value::Observable(obs) => Ok(obs),
        _ => Err(error),
    }
}

/// Wrap an object; fails with [`TalError::NotAnObject`] for other shapes.
pub fn wrap_object(value: &Value, parent: Option<&Observable>) -> Result<Observable> {
    expect_shape(value, parent, |v| matches!(v, Value::Object(_)), TalError::NotAnObject)
}

/// Wrap an array; fails with [`TalError::NotAnArray`] for other shapes.
pub fn wrap_array(value: &Value, parent: Option<&Observable>) -> Result<Observable> {
    expect_shape(value, parent, |v| matches!(v, Value::Array(_)), TalError::NotAnArray)
}

/// Wrap a callable; fails with [`TalError::NotAFunction`] for other shapes.
pub fn wrap_function(value: &Value, parent: Option<&Observable>) -> Result<Observable> {
    expect_shape(value, parent, |v| matches!(v, Value::Function(_)), TalError::NotAFunction)
}

/// Wrap a primitive; fails with [`TalError::NotAPrimitive`] for other shapes.
pub fn wrap_primitive(value: &Value, parent: Option<&Observable>) -> Result<Observable> {
    match value {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(Observable::from_target(
            Target::Primitive(RefCell::new(value.clone())),
            link(parent),
        )),
        Value::Observable(obs) if obs.primitive_value().is_some() => {
            obs.adopt_parent(link(parent));
            Ok(obs.clone())
        }
        _ => Err(TalError::NotAPrimitive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Function, Object};

    #[test]
    fn shape_checks() {
        let object = Value::from(Object::new());
        let array = Value::from(Array::new());
        assert!(wrap_object(&object, None).is_ok());
        assert_eq!(wrap_object(&array, None).unwrap_err(), TalError::NotAnObject);
        assert_eq!(wrap_array(&object, None).unwrap_err(), TalError::NotAnArray);
        assert_eq!(
            wrap_function(&Value::from(1), None).unwrap_err(),
            TalError::NotAFunction
        );
        assert_eq!(
            wrap_primitive(&object, None).unwrap_err(),
            TalError::NotAPrimitive
        );
        assert!(wrap_function(&Value::from(Function::new(|_, _| Value::Null)), None).is_ok());
    }

    #[test]
    fn rewrapping_an_observable_checks_its_target() {
        let wrapped = wrap_object(&Value::from(Object::new()), None).unwrap();
        let again = wrap_object(&Value::from(wrapped.clone()), None).unwrap();
        assert!(again.ptr_eq(&wrapped));
        assert!(wrap_array(&Value::from(wrapped), None).is_err());
    }

    #[test]
    fn pass_through_values() {
        assert!(wrap(Value::Undefined, None).is_undefined());
        assert!(matches!(wrap(Value::Null, None), Value::Null));
        let prim = wrap(Value::from(3), None);
        assert_eq!(
            prim.as_observable().and_then(Observable::primitive_value).and_then(|v| v.as_number()),
            Some(3.0)
        );
    }

    #[test]
    fn array_elements_are_wrapped_eagerly() {
        let inner = Object::new().with("n", 1);
        let array: Array = [Value::from(inner.clone()), Value::from("text")].into_iter().collect();
        let obs = wrap_array(&Value::from(array.clone()), None).unwrap();
        assert!(matches!(array.get(0), Some(Value::Observable(_))));
        assert!(matches!(array.get(1), Some(Value::String(_))));
        let item = wrap_object(&Value::from(inner), None).unwrap();
        assert!(item.parent().unwrap().ptr_eq(&obs));
    }

    #[test]
    fn identity_survives_only_while_a_handle_lives() {
        let raw = Value::from(Object::new());
        let first = wrap_object(&raw, None).unwrap();
        let weak = first.downgrade();
        assert!(wrap_object(&raw, None).unwrap().ptr_eq(&first));
        drop(first);
        assert!(weak.upgrade().is_none());
        let fresh = wrap_object(&raw, None).unwrap();
        assert_eq!(fresh.total_observer_count(), 0);
    }
}
