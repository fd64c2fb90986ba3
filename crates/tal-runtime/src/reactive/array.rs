#![forbid(unsafe_code)]

//! Reactive array edits.
//!
//! Every structural edit on an array [`Observable`] dispatches one
//! notification named after the operation, carrying enough data for a list
//! consumer to mirror it without rescanning:
//!
//! | Operation | Property | Payload |
//! |---|---|---|
//! | `push(items)` | `push` | [`Change::Push`] |
//! | `unshift(items)` | `unshift` | [`Change::Unshift`] |
//! | `splice(start, n, items)` | `splice` | [`Change::Splice`] (normalized start/count) |
//! | `shift()` | `shift` | [`Change::Shift`] (removed value) |
//! | `pop()` | `pop` | [`Change::Pop`] (removed value) |
//! | `clear()` | `clear` | [`Change::Clear`] |
//! | `a[i] = v` | `set` and `"i"` | [`Change::Set`] |
//! | `length = n` | `length` | [`Change::Length`] |
//!
//! Any edit that changes the length additionally dispatches `length` after
//! its own notification.
//!
//! `sort`, `reverse`, `fill` and `copyWithin` reorder in ways a list consumer
//! cannot mirror incrementally and fail with
//! [`TalError::UnsupportedOperation`].
//!
//! Lengths are capped at [`MAX_LENGTH`]: a `length` write above it, or an
//! index write at or above it, fails instead of growing the array.

use crate::error::{Result, TalError};
use crate::value::{Array, Value};

use super::detect;
use super::observable::{Observable, ParentLink, Target};
use super::observers::Change;
use super::wrap::wrap_child;

/// Largest array length, as in the host (`2^32 - 1`).
pub const MAX_LENGTH: usize = u32::MAX as usize;

/// A structural array edit.
#[derive(Clone, Debug)]
pub enum ArrayOp {
    Push(Vec<Value>),
    Unshift(Vec<Value>),
    /// `start` may be negative (counted from the end); a missing
    /// `delete_count` removes everything from `start`.
    Splice {
        start: isize,
        delete_count: Option<usize>,
        items: Vec<Value>,
    },
    Shift,
    Pop,
    Clear,
    SetLength(usize),
    SetIndex { index: usize, value: Value },
}

fn integer_arg(args: &[Value], index: usize) -> Option<f64> {
    args.get(index)
        .and_then(Value::as_number)
        .filter(|n| !n.is_nan())
        .map(f64::trunc)
}

impl ArrayOp {
    /// Build an operation from a method name and call arguments.
    pub fn parse(name: &str, args: &[Value]) -> Result<Self> {
        match name {
            "push" => Ok(Self::Push(args.to_vec())),
            "unshift" => Ok(Self::Unshift(args.to_vec())),
            "splice" => Ok(Self::Splice {
                start: integer_arg(args, 0).unwrap_or(0.0) as isize,
                delete_count: if args.len() < 2 {
                    None
                } else {
                    Some(integer_arg(args, 1).unwrap_or(0.0).max(0.0) as usize)
                },
                items: args.get(2..).map(<[Value]>::to_vec).unwrap_or_default(),
            }),
            "shift" => Ok(Self::Shift),
            "pop" => Ok(Self::Pop),
            "clear" => Ok(Self::Clear),
            "sort" | "reverse" | "fill" | "copyWithin" => {
                Err(TalError::unsupported(format!("array {name}")))
            }
            other => Err(TalError::unsupported(format!("unknown array method {other}"))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::Unshift(_) => "unshift",
            Self::Splice { .. } => "splice",
            Self::Shift => "shift",
            Self::Pop => "pop",
            Self::Clear => "clear",
            Self::SetLength(_) => "length",
            Self::SetIndex { .. } => "set",
        }
    }
}

/// Extend `vec` with `undefined` up to `len`; allocation failure is an error.
fn grow(vec: &mut Vec<Value>, len: usize) -> Result<()> {
    vec.try_reserve_exact(len.saturating_sub(vec.len()))
        .map_err(|_| TalError::unsupported(format!("array length {len}")))?;
    vec.resize(len, Value::Undefined);
    Ok(())
}

fn resolve_start(start: isize, len: usize) -> usize {
    if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        (start as usize).min(len)
    }
}

impl Observable {
    fn array_target(&self) -> Result<&Array> {
        match &self.inner.target {
            Target::Array(array) => Ok(array),
            _ => Err(TalError::NotAnArray),
        }
    }

    /// Length of a wrapped array, `None` for other shapes.
    #[must_use]
    pub fn array_len(&self) -> Option<usize> {
        self.array_target().ok().map(Array::len)
    }

    /// Snapshot of the elements of a wrapped array (compounds wrapped).
    #[must_use]
    pub fn array_items(&self) -> Option<Vec<Value>> {
        let len = self.array_len()?;
        Some((0..len).map(|i| self.peek(&i.to_string())).collect())
    }

    fn wrap_items(&self, items: Vec<Value>) -> Vec<Value> {
        items
            .into_iter()
            .map(|item| match item {
                Value::Object(_) | Value::Array(_) => {
                    wrap_child(&item, ParentLink::Weak(self.downgrade_inner()))
                }
                other => other,
            })
            .collect()
    }

    /// Apply a structural edit and notify observers.
    ///
    /// Returns the host-style result: the new length for `push`/`unshift`,
    /// the removed elements for `splice`, the removed value for
    /// `shift`/`pop`, `undefined` otherwise. During a detection window the
    /// edit is suppressed and `undefined` is returned.
    pub fn apply(&self, op: ArrayOp) -> Result<Value> {
        let array = self.array_target()?.clone();
        match &op {
            ArrayOp::SetLength(len) if *len > MAX_LENGTH => {
                return Err(TalError::unsupported(format!("array length {len}")));
            }
            ArrayOp::SetIndex { index, .. } if *index >= MAX_LENGTH => {
                return Err(TalError::unsupported(format!("array index {index}")));
            }
            _ => {}
        }
        if detect::is_detecting() {
            return Ok(Value::Undefined);
        }
        let name = op.name();
        let before = array.len();
        let (result, change, garbage): (Value, Option<Change>, Vec<Value>) = match op {
            ArrayOp::Push(items) => {
                let items = self.wrap_items(items);
                let len = array.with_mut(|vec| {
                    vec.extend(items.iter().cloned());
                    vec.len()
                });
                (Value::from(len), Some(Change::Push(items)), Vec::new())
            }
            ArrayOp::Unshift(items) => {
                let items = self.wrap_items(items);
                let len = array.with_mut(|vec| {
                    vec.splice(0..0, items.iter().cloned());
                    vec.len()
                });
                (Value::from(len), Some(Change::Unshift(items)), Vec::new())
            }
            ArrayOp::Splice {
                start,
                delete_count,
                items,
            } => {
                let start = resolve_start(start, before);
                let delete_count = delete_count
                    .unwrap_or(before - start)
                    .min(before - start);
                let items = self.wrap_items(items);
                let removed: Vec<Value> = array.with_mut(|vec| {
                    vec.splice(start..start + delete_count, items.iter().cloned())
                        .collect()
                });
                let change = Change::Splice {
                    start,
                    delete_count,
                    items,
                };
                (Value::from(removed.clone()), Some(change), removed)
            }
            ArrayOp::Shift => {
                let removed = array.with_mut(|vec| (!vec.is_empty()).then(|| vec.remove(0)));
                match removed {
                    Some(value) => (value.clone(), Some(Change::Shift(value)), Vec::new()),
                    None => (Value::Undefined, None, Vec::new()),
                }
            }
            ArrayOp::Pop => match array.with_mut(Vec::pop) {
                Some(value) => (value.clone(), Some(Change::Pop(value)), Vec::new()),
                None => (Value::Undefined, None, Vec::new()),
            },
            ArrayOp::Clear => {
                let removed = array.with_mut(std::mem::take);
                (Value::Undefined, Some(Change::Clear), removed)
            }
            ArrayOp::SetLength(len) => {
                let removed = array.with_mut(|vec| -> Result<Vec<Value>> {
                    if len < vec.len() {
                        return Ok(vec.split_off(len));
                    }
                    grow(vec, len)?;
                    Ok(Vec::new())
                })?;
                (Value::Undefined, None, removed)
            }
            ArrayOp::SetIndex { index, value } => {
                let value = self.wrap_items(vec![value]).pop().unwrap_or_default();
                let old = array.with_mut(|vec| -> Result<Option<Value>> {
                    if index >= vec.len() {
                        grow(vec, index + 1)?;
                        vec[index] = value.clone();
                        Ok(None)
                    } else {
                        Ok(Some(std::mem::replace(&mut vec[index], value.clone())))
                    }
                })?;
                match old {
                    Some(old) if old.strict_eq(&value) => (Value::Undefined, None, vec![old]),
                    Some(old) => (
                        Value::Undefined,
                        Some(Change::Set { index, value }),
                        vec![old],
                    ),
                    None => (Value::Undefined, Some(Change::Set { index, value }), Vec::new()),
                }
            }
        };
        drop(garbage);
        if let Some(change) = change {
            tracing::trace!(message = "observable.array", op = name, len = array.len());
            if let Change::Set { index, .. } = &change {
                self.dispatch(&index.to_string(), &change);
            }
            self.dispatch(name, &change);
        }
        let after = array.len();
        if after != before {
            self.dispatch("length", &Change::Length(after));
        }
        Ok(result)
    }

    /// Call an array method by name (`push`, `splice`, ...).
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
        self.apply(ArrayOp::parse(method, args)?)
    }

    pub fn push(&self, items: impl IntoIterator<Item = Value>) -> Result<usize> {
        self.apply(ArrayOp::Push(items.into_iter().collect()))
            .map(|len| len.as_number().unwrap_or(0.0) as usize)
    }

    pub fn unshift(&self, items: impl IntoIterator<Item = Value>) -> Result<usize> {
        self.apply(ArrayOp::Unshift(items.into_iter().collect()))
            .map(|len| len.as_number().unwrap_or(0.0) as usize)
    }

    /// Remove `delete_count` elements at `start` and insert `items` there;
    /// returns the removed elements.
    pub fn splice(
        &self,
        start: isize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        let removed = self.apply(ArrayOp::Splice {
            start,
            delete_count: Some(delete_count),
            items: items.into_iter().collect(),
        })?;
        Ok(match removed {
            Value::Array(array) => array.to_vec(),
            _ => Vec::new(),
        })
    }

    pub fn shift(&self) -> Result<Value> {
        self.apply(ArrayOp::Shift)
    }

    pub fn pop(&self) -> Result<Value> {
        self.apply(ArrayOp::Pop)
    }

    pub fn clear(&self) -> Result<()> {
        self.apply(ArrayOp::Clear).map(drop)
    }

    /// Truncate or extend (with `undefined`) to `len`.
    pub fn set_length(&self, len: usize) -> Result<()> {
        self.apply(ArrayOp::SetLength(len)).map(drop)
    }

    /// Indexed assignment; an index past the end extends the array.
    pub fn set_index(&self, index: usize, value: Value) -> Result<()> {
        self.apply(ArrayOp::SetIndex { index, value }).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{callback, wrap_array};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn list(items: &[&str]) -> Observable {
        let raw: Array = items.iter().copied().collect();
        wrap_array(&Value::from(raw), None).unwrap()
    }

    fn texts(obs: &Observable) -> Vec<String> {
        obs.array_items()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn log_of(obs: &Observable, props: &[&str]) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for prop in props {
            let sink = Rc::clone(&log);
            obs.observe(
                prop,
                &callback(move |change, prop| {
                    sink.borrow_mut().push(format!("{prop}:{change:?}"));
                }),
            );
        }
        log
    }

    #[test]
    fn push_dispatches_items_then_length() {
        let obs = list(&["a"]);
        let log = log_of(&obs, &["push", "length"]);
        assert_eq!(obs.push([Value::from("b"), Value::from("c")]), Ok(3));
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("push:Push"));
        assert_eq!(log[1], "length:Length(3)");
        drop(log);
        assert_eq!(texts(&obs), ["a", "b", "c"]);
    }

    #[test]
    fn splice_normalizes_arguments() {
        let obs = list(&["a", "b", "c", "d"]);
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        obs.observe(
            "splice",
            &callback(move |change, _| {
                if let Change::Splice {
                    start,
                    delete_count,
                    ..
                } = change
                {
                    *sink.borrow_mut() = Some((*start, *delete_count));
                }
            }),
        );
        let removed = obs.splice(-2, 10, [Value::from("x")]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(*seen.borrow(), Some((2, 2)));
        assert_eq!(texts(&obs), ["a", "b", "x"]);
    }

    #[test]
    fn shift_and_pop_on_empty_are_silent() {
        let obs = list(&[]);
        let log = log_of(&obs, &["shift", "pop", "length"]);
        assert!(obs.shift().unwrap().is_undefined());
        assert!(obs.pop().unwrap().is_undefined());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn set_index_past_end_extends() {
        let obs = list(&["a"]);
        let log = log_of(&obs, &["set", "3"]);
        obs.set_index(3, Value::from("d")).unwrap();
        assert_eq!(obs.array_len(), Some(4));
        assert!(obs.peek("1").is_undefined());
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn set_index_with_same_value_is_silent() {
        let obs = list(&["a"]);
        let log = log_of(&obs, &["set"]);
        obs.set_index(0, Value::from("a")).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn length_assignment_truncates() {
        let obs = list(&["a", "b", "c"]);
        let log = log_of(&obs, &["length"]);
        obs.set("length", Value::from(1)).unwrap();
        assert_eq!(texts(&obs), ["a"]);
        assert_eq!(*log.borrow(), vec!["length:Length(1)".to_owned()]);
    }

    #[test]
    fn reordering_methods_are_rejected() {
        let obs = list(&["b", "a"]);
        for method in ["sort", "reverse", "fill", "copyWithin"] {
            assert!(matches!(
                obs.invoke(method, &[]),
                Err(TalError::UnsupportedOperation { .. })
            ));
        }
        assert_eq!(texts(&obs), ["b", "a"]);
    }

    #[test]
    fn non_arrays_reject_edits() {
        let obs = crate::reactive::wrap_object(&Value::from(crate::value::Object::new()), None)
            .unwrap();
        assert_eq!(obs.pop(), Err(TalError::NotAnArray));
        assert_eq!(obs.array_len(), None);
    }

    #[test]
    fn pushed_objects_are_wrapped_with_array_parent() {
        let obs = list(&[]);
        obs.push([Value::from(crate::value::Object::new().with("n", 1))])
            .unwrap();
        let item = obs.peek("0");
        let item = item.as_observable().unwrap();
        assert!(item.parent().unwrap().ptr_eq(&obs));
    }

    #[test]
    fn oversized_length_and_index_writes_fail_without_growing() {
        let obs = list(&["a"]);
        assert!(matches!(
            obs.set("length", Value::from(1.8e19)),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            obs.set("length", Value::from(1e10)),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            obs.set("18446744073709551615", Value::from("x")),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            obs.set("4294967295", Value::from("x")),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            obs.set_index(usize::MAX, Value::from("x")),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            obs.set_length(MAX_LENGTH + 1),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert_eq!(obs.array_len(), Some(1));
    }

    #[test]
    fn in_range_index_write_extends_with_undefined() {
        let obs = list(&["a"]);
        obs.set("3", Value::from("d")).unwrap();
        assert_eq!(obs.array_len(), Some(4));
        assert!(obs.peek("2").is_undefined());
        assert_eq!(obs.peek("3").as_str(), Some("d"));
    }

    #[test]
    fn edits_are_suppressed_while_detecting() {
        let obs = list(&["a"]);
        let window = crate::reactive::detect().unwrap();
        assert!(obs.push([Value::from("b")]).is_ok());
        drop(window);
        assert_eq!(obs.array_len(), Some(1));
    }

    fn numbers(obs: &Observable) -> Vec<f64> {
        obs.array_items()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_number)
            .collect()
    }

    proptest::proptest! {
        #[test]
        fn splice_matches_vec_splice(
            initial in proptest::collection::vec(0u8..100, 0..8),
            start in -10isize..10,
            delete_count in 0usize..10,
            items in proptest::collection::vec(0u8..100, 0..4),
        ) {
            let raw: Array = initial.iter().map(|n| Value::from(u32::from(*n))).collect();
            let obs = wrap_array(&Value::from(raw), None).unwrap();
            let seen = Rc::new(RefCell::new(None));
            let sink = Rc::clone(&seen);
            let _sub = obs.subscribe("splice", move |change, _| {
                *sink.borrow_mut() = Some(change.clone());
            });

            let mut model: Vec<f64> = initial.iter().map(|n| f64::from(*n)).collect();
            let len = model.len();
            let from = if start < 0 {
                len.saturating_sub(start.unsigned_abs())
            } else {
                start.unsigned_abs().min(len)
            };
            let to = from + delete_count.min(len - from);
            let expected_removed: Vec<f64> = model
                .splice(from..to, items.iter().map(|n| f64::from(*n)))
                .collect();

            let removed = obs
                .splice(start, delete_count, items.iter().map(|n| Value::from(u32::from(*n))))
                .unwrap();
            let removed: Vec<f64> = removed.iter().filter_map(Value::as_number).collect();
            proptest::prop_assert_eq!(removed, expected_removed);
            proptest::prop_assert_eq!(numbers(&obs), model);
            let normalized = matches!(
                &*seen.borrow(),
                Some(Change::Splice { start, delete_count, .. }) if *start == from && *delete_count == to - from
            );
            proptest::prop_assert!(normalized);
        }
    }
}
