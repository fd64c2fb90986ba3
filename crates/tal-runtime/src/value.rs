#![forbid(unsafe_code)]

//! Dynamic values bound into templates.
//!
//! [`Value`] is the data model shared by every layer: plain data handed in by
//! the caller (objects, arrays, callables, primitives), wrapped
//! [`Observable`]s, and the DOM handles directives pass to callables.
//!
//! Compound values (`Object`, `Array`, `Function`) are reference-counted
//! targets: cloning a `Value` clones the handle, not the data, and equality
//! between compounds is identity.
//!
//! # Invariants
//!
//! 1. `a.strict_eq(b)` for compounds holds iff both refer to the same target;
//!    an `Observable` compares equal to the raw target it wraps.
//! 2. `NaN` is never `strict_eq` to anything, itself included.
//! 3. Display never fails: `undefined`/`null` render as the empty string.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tal_dom::{Event, NodeId};

use crate::reactive::Observable;

/// Computed property body; receives the owning observable.
pub type GetterFn = dyn Fn(&Observable) -> Value;

/// Native callable body: `(this, args) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Value;

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Storage slot of an object property.
#[derive(Clone)]
pub enum Slot {
    Data(Value),
    Getter(Rc<GetterFn>),
}

/// Insertion-ordered property bag with shared identity.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<Vec<(Rc<str>, Slot)>>>);

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().iter().any(|(k, _)| &**k == key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0.borrow().iter().map(|(k, _)| Rc::clone(k)).collect()
    }

    #[must_use]
    pub fn slot(&self, key: &str) -> Option<Slot> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, slot)| slot.clone())
    }

    /// Stored data value; `None` for absent keys and getter slots.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.slot(key)? {
            Slot::Data(value) => Some(value),
            Slot::Getter(_) => None,
        }
    }

    /// Store a data value, replacing whatever slot held `key`.
    ///
    /// Returns the replaced slot so the caller controls when it is dropped.
    pub fn insert(&self, key: &str, value: Value) -> Option<Slot> {
        self.put(key, Slot::Data(value))
    }

    pub fn define_getter(&self, key: &str, getter: Rc<GetterFn>) -> Option<Slot> {
        self.put(key, Slot::Getter(getter))
    }

    fn put(&self, key: &str, slot: Slot) -> Option<Slot> {
        let mut entries = self.0.borrow_mut();
        if let Some((_, existing)) = entries.iter_mut().find(|(k, _)| &**k == key) {
            return Some(std::mem::replace(existing, slot));
        }
        entries.push((Rc::from(key), slot));
        None
    }

    pub fn remove(&self, key: &str) -> Option<Slot> {
        let mut entries = self.0.borrow_mut();
        let pos = entries.iter().position(|(k, _)| &**k == key)?;
        Some(entries.remove(pos).1)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Self::new();
        for (key, value) in iter {
            object.insert(key.as_ref(), value.into());
        }
        object
    }
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

/// Growable list with shared identity.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Raw append; no notification. Use [`Observable::push`] for reactive edits.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

struct FunctionData {
    call: Box<NativeFn>,
    props: RefCell<AHashMap<String, Value>>,
}

/// Native callable with its own property bag.
#[derive(Clone)]
pub struct Function(Rc<FunctionData>);

impl Function {
    pub fn new(call: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(FunctionData {
            call: Box::new(call),
            props: RefCell::new(AHashMap::new()),
        }))
    }

    /// Invoke with an explicit `this`.
    pub fn call(&self, this: &Value, args: &[Value]) -> Value {
        (self.0.call)(this, args)
    }

    #[must_use]
    pub fn prop(&self, key: &str) -> Option<Value> {
        self.0.props.borrow().get(key).cloned()
    }

    pub fn set_prop(&self, key: &str, value: Value) -> Option<Value> {
        self.0.props.borrow_mut().insert(key.to_owned(), value)
    }

    #[must_use]
    pub fn has_prop(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed template value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
    Function(Function),
    Observable(Observable),
    Node(NodeId),
    Event(Rc<Event>),
}

impl Value {
    /// Convenience constructor for string values.
    #[must_use]
    pub fn string(text: impl AsRef<str>) -> Self {
        Self::String(Rc::from(text.as_ref()))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Whether the value is a primitive (`bool`, number, string).
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Number(_) | Self::String(_))
    }

    /// Raw or wrapped callable.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        match self {
            Self::Function(_) => true,
            Self::Observable(obs) => obs.is_function(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_observable(&self) -> Option<&Observable> {
        match self {
            Self::Observable(obs) => Some(obs),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Host-language truthiness.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(text) => !text.is_empty(),
            Self::Observable(obs) => obs.primitive_value().is_none_or(|value| value.truthy()),
            Self::Object(_) | Self::Array(_) | Self::Function(_) | Self::Node(_) | Self::Event(_) => {
                true
            }
        }
    }

    /// Identity of a compound value (the address of its shared target).
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Self::Object(object) => Some(object.addr()),
            Self::Array(array) => Some(array.addr()),
            Self::Function(function) => Some(function.addr()),
            Self::Observable(obs) => Some(obs.target_addr()),
            Self::Event(event) => Some(Rc::as_ptr(event) as usize),
            _ => None,
        }
    }

    /// Strict (`===`) equality: primitives by value, compounds by identity.
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Short type label used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Function(_) => "function",
            Self::Observable(_) => "observable",
            Self::Node(_) => "node",
            Self::Event(_) => "event",
        }
    }
}

/// Number formatting in the host-language style: integral values without a
/// fractional part, `NaN`, `Infinity`.
pub(crate) fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == n.trunc() && n.abs() < 1e21 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined | Self::Null => Ok(()),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(n) => format_number(*n, f),
            Self::String(text) => f.write_str(text),
            Self::Object(_) => f.write_str("[object Object]"),
            Self::Array(array) => {
                for (i, item) in array.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Function(_) => f.write_str("function"),
            Self::Observable(obs) => write!(f, "{}", obs.raw()),
            Self::Node(_) => f.write_str("[object Node]"),
            Self::Event(event) => write!(f, "[object Event {}]", event.kind()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(flag) => write!(f, "Bool({flag})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(text) => write!(f, "String({text:?})"),
            Self::Object(object) => write!(f, "Object(keys={:?})", object.keys()),
            Self::Array(array) => write!(f, "Array(len={})", array.len()),
            Self::Function(_) => f.write_str("Function"),
            Self::Observable(obs) => write!(f, "{obs:?}"),
            Self::Node(id) => write!(f, "Node({id:?})"),
            Self::Event(event) => write!(f, "Event({:?})", event.kind()),
        }
    }
}

/// `==` is strict equality ([`Value::strict_eq`]); `NaN != NaN`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Self::Number(n as f64)
            }
        })*
    };
}

value_from_int!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::String(Rc::from(text))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(Rc::from(text))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(Array::from(items))
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<Observable> for Value {
    fn from(obs: Observable) -> Self {
        Self::Observable(obs)
    }
}

impl From<&Observable> for Value {
    fn from(obs: &Observable) -> Self {
        Self::Observable(obs.clone())
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        Self::Event(Rc::new(event))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(feature = "serde")]
mod json {
    use super::{Array, Object, Slot, Value};

    /// Nesting limit when converting to JSON; deeper values become `null`.
    const MAX_DEPTH: usize = 64;

    impl From<serde_json::Value> for Value {
        fn from(json: serde_json::Value) -> Self {
            match json {
                serde_json::Value::Null => Self::Null,
                serde_json::Value::Bool(flag) => Self::Bool(flag),
                serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
                serde_json::Value::String(text) => Self::from(text),
                serde_json::Value::Array(items) => {
                    Self::Array(items.into_iter().map(Self::from).collect::<Array>())
                }
                serde_json::Value::Object(map) => Self::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, Self::from(value)))
                        .collect::<Object>(),
                ),
            }
        }
    }

    impl Value {
        /// Snapshot as JSON. Callables, nodes, events and `undefined` map to
        /// `null`; observables serialize their target.
        #[must_use]
        pub fn to_json(&self) -> serde_json::Value {
            to_json(self, 0)
        }
    }

    fn to_json(value: &Value, depth: usize) -> serde_json::Value {
        if depth > MAX_DEPTH {
            return serde_json::Value::Null;
        }
        match value {
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Number(n) => number_to_json(*n),
            Value::String(text) => serde_json::Value::String(text.to_string()),
            Value::Array(array) => serde_json::Value::Array(
                array.to_vec().iter().map(|item| to_json(item, depth + 1)).collect(),
            ),
            Value::Object(object) => {
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    if let Some(Slot::Data(item)) = object.slot(&key) {
                        map.insert(key.to_string(), to_json(&item, depth + 1));
                    }
                }
                serde_json::Value::Object(map)
            }
            Value::Observable(obs) => to_json(&obs.raw(), depth + 1),
            _ => serde_json::Value::Null,
        }
    }

    /// Integral numbers become JSON integers; non-finite ones become `null`.
    #[allow(clippy::cast_possible_truncation)]
    fn number_to_json(n: f64) -> serde_json::Value {
        const LIMIT: f64 = 9_007_199_254_740_992.0;
        if n.fract() == 0.0 && n.abs() <= LIMIT {
            return serde_json::Value::Number(serde_json::Number::from(n as i64));
        }
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_host_rules() {
        for falsy in [
            Value::Undefined,
            Value::Null,
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(f64::NAN),
            Value::from(""),
        ] {
            assert!(!falsy.truthy(), "{falsy:?}");
        }
        for truthy in [
            Value::Bool(true),
            Value::Number(-1.0),
            Value::from("0"),
            Value::Object(Object::new()),
            Value::Array(Array::new()),
        ] {
            assert!(truthy.truthy(), "{truthy:?}");
        }
    }

    #[test]
    fn strict_eq_is_identity_for_compounds() {
        let a = Object::new();
        let b = Object::new();
        assert!(Value::from(a.clone()).strict_eq(&Value::from(a)));
        assert!(!Value::from(b).strict_eq(&Value::Object(Object::new())));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
        assert!(Value::from("x").strict_eq(&Value::from("x")));
        assert!(!Value::from(1).strict_eq(&Value::from("1")));
    }

    #[test]
    fn display_formats_like_the_host() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-0.0).to_string(), "0");
        assert_eq!(Value::Undefined.to_string(), "");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(f64::INFINITY).to_string(), "Infinity");
        let list: Array = [1, 2, 3].into_iter().collect();
        assert_eq!(Value::from(list).to_string(), "1,2,3");
        assert_eq!(Value::from(Object::new()).to_string(), "[object Object]");
    }

    #[test]
    fn object_slots_keep_insertion_order() {
        let object = Object::new().with("b", 1).with("a", 2).with("b", 3);
        let keys: Vec<String> = object.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(object.get("b").and_then(|v| v.as_number()), Some(3.0));
        assert!(object.remove("a").is_some());
        assert!(!object.contains_key("a"));
    }

    #[test]
    fn functions_receive_this_and_args() {
        let f = Function::new(|this, args| {
            Value::from(format!("{}:{}", this, args.len()))
        });
        assert_eq!(f.call(&Value::from("me"), &[Value::Null]).to_string(), "me:1");
        f.set_prop("label", Value::from("x"));
        assert!(f.has_prop("label"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_conversion() {
        let json = serde_json::json!({"name": "Ann", "items": [1, 2], "ok": true, "none": null});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_numbers_keep_integer_form() {
        assert_eq!(Value::from(3).to_json().to_string(), "3");
        assert_eq!(Value::Number(-0.0).to_json().to_string(), "0");
        assert_eq!(Value::Number(1.5).to_json().to_string(), "1.5");
        assert_eq!(Value::Number(1e300).to_json(), serde_json::json!(1e300));
        assert_eq!(Value::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Number(f64::INFINITY).to_json(), serde_json::Value::Null);
    }
}
