#![forbid(unsafe_code)]

//! TALES expression resolver.
//!
//! [`resolve`] compiles the text of a directive expression against a context
//! into an [`Expression`]: a constant, a [`Getter`] that can be (re)evaluated
//! and tells bindings which `(observable, property)` it reads, or
//! `Unresolved`.
//!
//! | Form | Result |
//! |---|---|
//! | `'text'`, `"text"`, `string:text` | literal string |
//! | `not:<expr>` | getter negating `<expr>`, keeping its target |
//! | `exists:<path>` | literal boolean, evaluated once |
//! | `path:<path>`, `<path>` | path getter (setter too when `writer`) |
//! | `js:<name>` | host expression getter (see [`host`](crate::host)) |
//! | `nocall:<path>` | [`TalError::UnsupportedOperation`] |
//! | anything else | literal string if quoted, else unresolved |
//!
//! Paths are `segment(/segment)*`; `.` is accepted as a separator too. A
//! multi-segment path getter remembers where it was resolved from, so a
//! binding can [`rebind`](Getter::rebind) it when an intermediate object is
//! replaced.
//!
//! # Failure Modes
//!
//! - Resolving a path or host expression against a context that is not an
//!   observable fails with [`TalError::ContextNotObservable`].
//! - A missing intermediate path segment is not an error: it is logged at
//!   `warn` and the expression is `Unresolved` (evaluates to `undefined`).

use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::{Result, TalError};
use crate::host;
use crate::reactive::{Observable, wrap};
use crate::value::Value;

static PREFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([a-z]+):(.+)$").unwrap_or_else(|_| unreachable!("static pattern"))
});

static STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^(?:'([^']*)'|"([^"]*)"|string:(.*))$"#)
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

static PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:path:)?([a-zA-Z][a-zA-Z0-9_]*(?:[/.][a-zA-Z0-9][a-zA-Z0-9_]*)*)$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Parse a string literal (`'..'`, `".."` or `string:..`).
#[must_use]
pub fn string_literal(expr: &str) -> Option<String> {
    let caps = STRING.captures(expr.trim())?;
    (1..=3)
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().to_owned())
}

/// Whether `expr` is syntactically a path (with or without `path:`).
#[must_use]
pub fn is_path(expr: &str) -> bool {
    PATH.is_match(expr.trim())
}

fn path_segments(expr: &str) -> Option<Vec<&str>> {
    let caps = PATH.captures(expr)?;
    let path = caps.get(1)?.as_str();
    Some(path.split(['/', '.']).collect())
}

fn context_observable<'a>(context: &'a Value, expr: &str) -> Result<&'a Observable> {
    context
        .as_observable()
        .filter(|obs| obs.primitive_value().is_none())
        .ok_or_else(|| TalError::ContextNotObservable {
            expression: expr.to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Getter
// ---------------------------------------------------------------------------

/// Context and segments a multi-segment path was resolved from.
struct Route {
    root: Observable,
    segments: Vec<String>,
}

#[derive(Clone)]
enum Source {
    /// Property `property` of `context`; `callable` when it named a callable
    /// at resolution time.
    Path {
        context: Observable,
        property: String,
        callable: bool,
        route: Option<Rc<Route>>,
    },
    Not(Box<Getter>),
    Host {
        source: String,
        context: Observable,
    },
}

/// Re-evaluable expression.
#[derive(Clone)]
pub struct Getter {
    source: Source,
    writable: bool,
}

impl Getter {
    /// Current value. Callables are invoked without arguments.
    #[must_use]
    pub fn value(&self) -> Value {
        self.invoke(&[])
    }

    /// Evaluate with arguments: callables receive them (with the context as
    /// `this`), a writable path stores the first one, otherwise they are
    /// ignored.
    pub fn invoke(&self, args: &[Value]) -> Value {
        match &self.source {
            Source::Path {
                context,
                property,
                callable: true,
                ..
            } => match context.get(property) {
                Value::Function(function) => function.call(&Value::Observable(context.clone()), args),
                Value::Observable(obs) => match obs.raw() {
                    Value::Function(function) => {
                        function.call(&Value::Observable(context.clone()), args)
                    }
                    _ => obs.call(args).unwrap_or_default(),
                },
                other => other,
            },
            Source::Path { context, property, .. } => match args.first() {
                Some(value) if self.writable => {
                    self.write(context, property, value.clone());
                    value.clone()
                }
                _ => context.get(property),
            },
            Source::Not(inner) => Value::from(!inner.value().truthy()),
            Source::Host { source, context } => host::evaluate(source, context),
        }
    }

    /// Store `value` through a writable path; logs and ignores otherwise.
    pub fn set(&self, value: Value) {
        match &self.source {
            Source::Path {
                context,
                property,
                callable: false,
                ..
            } if self.writable => self.write(context, property, value),
            _ => tracing::warn!(message = "tales.set.readonly", getter = ?self),
        }
    }

    fn write(&self, context: &Observable, property: &str, value: Value) {
        if let Err(err) = context.set(property, value) {
            tracing::error!(message = "tales.set.failed", property, error = %err);
        }
    }

    /// The `(observable, property)` a binding should observe, if any.
    #[must_use]
    pub fn target(&self) -> Option<(&Observable, &str)> {
        match &self.source {
            Source::Path { context, property, .. } => Some((context, property)),
            Source::Not(inner) => inner.target(),
            Source::Host { .. } => None,
        }
    }

    /// Context the expression was resolved against (host expressions and
    /// paths; for `not:` the inner one).
    #[must_use]
    pub fn context(&self) -> &Observable {
        match &self.source {
            Source::Path { context, .. } | Source::Host { context, .. } => context,
            Source::Not(inner) => inner.context(),
        }
    }

    /// Whether the path named a callable when it was resolved.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self.source, Source::Path { callable: true, .. })
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable && matches!(self.source, Source::Path { callable: false, .. })
    }

    /// Whether the getter reads through intermediate objects that may be
    /// replaced (a multi-segment path, possibly under `not:`).
    #[must_use]
    pub fn is_routed(&self) -> bool {
        match &self.source {
            Source::Path { route, .. } => route.is_some(),
            Source::Not(inner) => inner.is_routed(),
            Source::Host { .. } => false,
        }
    }

    /// Walk the path again from where it was resolved, reading every
    /// intermediate segment through [`Observable::get`] so an open detection
    /// window records them.
    ///
    /// Returns the getter unchanged when it is not [routed](Self::is_routed),
    /// and `Unresolved` when an intermediate segment no longer holds an
    /// object.
    #[must_use]
    pub fn rebind(&self) -> Expression {
        match &self.source {
            Source::Path {
                route: Some(route), ..
            } => {
                let Some((last, init)) = route.segments.split_last() else {
                    return Expression::Unresolved;
                };
                let mut current = route.root.clone();
                for segment in init {
                    match current.get(segment) {
                        Value::Observable(next) if next.primitive_value().is_none() => {
                            current = next;
                        }
                        _ => return Expression::Unresolved,
                    }
                }
                let callable = current.peek(last).is_callable();
                Expression::Getter(Self {
                    source: Source::Path {
                        context: current,
                        property: last.clone(),
                        callable,
                        route: Some(Rc::clone(route)),
                    },
                    writable: self.writable,
                })
            }
            Source::Not(inner) => match inner.rebind() {
                Expression::Getter(getter) => Expression::Getter(Self {
                    source: Source::Not(Box::new(getter)),
                    writable: false,
                }),
                Expression::Unresolved => Expression::Literal(Value::Bool(true)),
                Expression::Literal(value) => Expression::Literal(Value::from(!value.truthy())),
            },
            _ => Expression::Getter(self.clone()),
        }
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Path {
                property, callable, ..
            } => f
                .debug_struct("Path")
                .field("property", property)
                .field("callable", callable)
                .field("writable", &self.writable)
                .finish(),
            Source::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Source::Host { source, .. } => f.debug_tuple("Host").field(source).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Expression
// ---------------------------------------------------------------------------

/// Result of resolving an expression.
#[derive(Clone, Debug)]
pub enum Expression {
    Literal(Value),
    Getter(Getter),
    /// The expression did not resolve; evaluates to `undefined`.
    Unresolved,
}

impl Expression {
    #[must_use]
    pub fn evaluate(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Getter(getter) => getter.value(),
            Self::Unresolved => Value::Undefined,
        }
    }

    #[must_use]
    pub fn getter(&self) -> Option<&Getter> {
        match self {
            Self::Getter(getter) => Some(getter),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve `expr` against `context`.
///
/// With `writer`, a path that does not name a callable resolves to a getter
/// that also accepts writes ([`Getter::set`]).
pub fn resolve(expr: &str, context: &Value, writer: bool) -> Result<Expression> {
    let trimmed = expr.trim();
    if let Some(caps) = PREFIXED.captures(trimmed) {
        let prefix = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        match prefix {
            "string" => return Ok(Expression::Literal(Value::string(rest))),
            "not" => return not(rest, context),
            "exists" => return exists(rest, context).map(|found| Expression::Literal(found.into())),
            "path" => return path(rest, context, writer),
            "js" => return js(rest, context),
            "nocall" => return Err(TalError::unsupported("tales nocall:")),
            _ => {
                tracing::warn!(message = "tales.prefix.unknown", prefix, expression = trimmed);
                return Ok(Expression::Unresolved);
            }
        }
    }
    if is_path(trimmed) {
        return path(trimmed, context, writer);
    }
    Ok(string_literal(trimmed)
        .map_or(Expression::Unresolved, |text| Expression::Literal(Value::string(text))))
}

fn not(rest: &str, context: &Value) -> Result<Expression> {
    Ok(match resolve(rest, context, false)? {
        Expression::Literal(value) => Expression::Literal(Value::from(!value.truthy())),
        Expression::Getter(inner) => Expression::Getter(Getter {
            source: Source::Not(Box::new(inner)),
            writable: false,
        }),
        Expression::Unresolved => Expression::Literal(Value::Bool(true)),
    })
}

/// Step from `context` into `segment`, wrapping plain data.
fn descend(context: &Observable, segment: &str) -> Option<Observable> {
    match context.peek(segment) {
        Value::Observable(obs) if obs.primitive_value().is_none() => Some(obs),
        value @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => {
            match wrap(value, Some(context)) {
                Value::Observable(obs) => Some(obs),
                _ => None,
            }
        }
        _ => None,
    }
}

fn path(rest: &str, context: &Value, writer: bool) -> Result<Expression> {
    let Some(segments) = path_segments(rest.trim()) else {
        tracing::warn!(message = "tales.path.invalid", expression = rest);
        return Ok(Expression::Unresolved);
    };
    let root = context_observable(context, rest)?;
    let mut current = root.clone();
    let Some((last, init)) = segments.split_last() else {
        return Ok(Expression::Unresolved);
    };
    for (index, segment) in init.iter().enumerate() {
        if !current.has_in_chain(segment) {
            tracing::warn!(
                message = "tales.path.missing",
                expression = rest,
                segment = *segment,
                part = index
            );
            return Ok(Expression::Unresolved);
        }
        match descend(&current, segment) {
            Some(next) => current = next,
            None => {
                tracing::warn!(
                    message = "tales.path.not_object",
                    expression = rest,
                    segment = *segment,
                    part = index
                );
                return Ok(Expression::Unresolved);
            }
        }
    }
    let callable = current.peek(last).is_callable();
    let route = (!init.is_empty()).then(|| {
        Rc::new(Route {
            root: root.clone(),
            segments: segments.iter().map(|segment| (*segment).to_owned()).collect(),
        })
    });
    Ok(Expression::Getter(Getter {
        source: Source::Path {
            context: current,
            property: (*last).to_owned(),
            callable,
            route,
        },
        writable: writer,
    }))
}

/// Whether every segment of the path is present and the final value is not
/// `undefined`. Invalid paths are simply `false`.
fn exists(rest: &str, context: &Value) -> Result<bool> {
    let Some(segments) = path_segments(rest.trim()) else {
        return Ok(false);
    };
    let mut current = context_observable(context, rest)?.clone();
    let Some((last, init)) = segments.split_last() else {
        return Ok(false);
    };
    for segment in init {
        if !current.has_in_chain(segment) {
            return Ok(false);
        }
        match descend(&current, segment) {
            Some(next) => current = next,
            None => return Ok(false),
        }
    }
    Ok(current.has_in_chain(last) && !current.peek(last).is_undefined())
}

fn js(rest: &str, context: &Value) -> Result<Expression> {
    let context = context_observable(context, rest)?.clone();
    Ok(Expression::Getter(Getter {
        source: Source::Host {
            source: rest.trim().to_owned(),
            context,
        },
        writable: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::reactive::{detect_with, wrap_object};
    use crate::value::{Array, Function, Object};

    fn ctx() -> Value {
        let user = Object::new().with("name", "Ann").with("age", 7);
        let items: Array = ["a", "b"].into_iter().collect();
        let root = Object::new()
            .with("user", user)
            .with("items", items)
            .with("flag", false)
            .with("empty", Value::Null);
        Value::from(wrap_object(&Value::from(root), None).unwrap())
    }

    #[test]
    fn string_literals() {
        assert_eq!(string_literal("'a b'").as_deref(), Some("a b"));
        assert_eq!(string_literal("\"x\"").as_deref(), Some("x"));
        assert_eq!(string_literal("string:hello world").as_deref(), Some("hello world"));
        assert_eq!(string_literal("bare"), None);
        let lit = resolve("  'quoted' ", &Value::Undefined, false).unwrap();
        assert_eq!(lit.evaluate().as_str(), Some("quoted"));
    }

    #[test]
    fn paths_resolve_with_either_separator() {
        let ctx = ctx();
        for expr in ["user/name", "user.name", "path:user/name"] {
            let resolved = resolve(expr, &ctx, false).unwrap();
            assert_eq!(resolved.evaluate().as_str(), Some("Ann"), "{expr}");
            let (target, property) = resolved.getter().unwrap().target().unwrap();
            assert_eq!(property, "name");
            assert_eq!(target.peek("age").as_number(), Some(7.0));
        }
        assert_eq!(resolve("items/1", &ctx, false).unwrap().evaluate().as_str(), Some("b"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn missing_segments_are_unresolved() {
        let ctx = ctx();
        assert!(resolve("nobody/name", &ctx, false).unwrap().is_unresolved());
        assert!(logs_contain("tales.path.missing"));
        assert!(resolve("user/name/first", &ctx, false).unwrap().is_unresolved());
        let leaf = resolve("user/missing", &ctx, false).unwrap();
        assert!(leaf.evaluate().is_undefined());
    }

    #[test]
    fn non_observable_context_fails() {
        let err = resolve("user/name", &Value::from(Object::new()), false).unwrap_err();
        assert!(matches!(err, TalError::ContextNotObservable { .. }));
    }

    #[test]
    fn not_and_exists() {
        let ctx = ctx();
        assert_eq!(resolve("not:flag", &ctx, false).unwrap().evaluate(), Value::Bool(true));
        assert_eq!(resolve("not:user", &ctx, false).unwrap().evaluate(), Value::Bool(false));
        assert_eq!(resolve("not:nobody/x", &ctx, false).unwrap().evaluate(), Value::Bool(true));
        let negated = resolve("not:flag", &ctx, false).unwrap();
        assert_eq!(negated.getter().unwrap().target().unwrap().1, "flag");

        assert_eq!(resolve("exists:user/name", &ctx, false).unwrap().evaluate(), Value::Bool(true));
        assert_eq!(resolve("exists:empty", &ctx, false).unwrap().evaluate(), Value::Bool(true));
        assert_eq!(resolve("exists:user/zip", &ctx, false).unwrap().evaluate(), Value::Bool(false));
        assert_eq!(resolve("exists:nope/zip", &ctx, false).unwrap().evaluate(), Value::Bool(false));
    }

    #[test]
    fn nocall_and_unknown_prefixes() {
        let ctx = ctx();
        assert!(matches!(
            resolve("nocall:user", &ctx, false),
            Err(TalError::UnsupportedOperation { .. })
        ));
        assert!(resolve("python:1+1", &ctx, false).unwrap().is_unresolved());
        assert!(resolve("1 + 1", &ctx, false).unwrap().is_unresolved());
    }

    #[test]
    fn writer_paths_store_values() {
        let ctx = ctx();
        let resolved = resolve("user/name", &ctx, true).unwrap();
        let getter = resolved.getter().unwrap();
        assert!(getter.is_writable());
        getter.set(Value::from("Bob"));
        assert_eq!(getter.value().as_str(), Some("Bob"));
        let read_only = resolve("user/name", &ctx, false).unwrap();
        read_only.getter().unwrap().set(Value::from("Eve"));
        assert_eq!(read_only.evaluate().as_str(), Some("Bob"));
    }

    #[test]
    fn callables_are_late_bound_with_context_as_this() {
        let greet = Function::new(|this, args| {
            let name = match this {
                Value::Observable(ctx) => ctx.get("name").to_string(),
                _ => String::new(),
            };
            let suffix = args.first().map(ToString::to_string).unwrap_or_default();
            Value::string(format!("hi {name}{suffix}"))
        });
        let root = Object::new().with("user", Object::new().with("name", "Ann").with("greet", greet));
        let ctx = Value::from(wrap_object(&Value::from(root), None).unwrap());
        let resolved = resolve("user/greet", &ctx, true).unwrap();
        let getter = resolved.getter().unwrap();
        assert!(getter.is_callable());
        assert!(!getter.is_writable());
        assert_eq!(getter.value().as_str(), Some("hi Ann"));
        assert_eq!(getter.invoke(&[Value::from("!")]).as_str(), Some("hi Ann!"));
    }

    #[test]
    fn path_reads_are_detected() {
        let ctx = ctx();
        let resolved = resolve("user/name", &ctx, false).unwrap();
        let (value, deps) = detect_with(|| resolved.evaluate()).unwrap();
        assert_eq!(value.as_str(), Some("Ann"));
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].property, "name");
    }

    #[test]
    fn rebind_follows_a_replaced_intermediate() {
        let ctx = ctx();
        let resolved = resolve("user/name", &ctx, false).unwrap();
        let negated = resolve("not:user/name", &ctx, false).unwrap();
        let getter = resolved.getter().unwrap();
        assert!(getter.is_routed());
        assert!(!resolve("flag", &ctx, false).unwrap().getter().unwrap().is_routed());

        let root = ctx.as_observable().unwrap();
        root.set("user", Value::from(Object::new().with("name", "Cy"))).unwrap();
        assert_eq!(getter.value().as_str(), Some("Ann"));
        let (rebound, deps) = detect_with(|| {
            let rebound = getter.rebind();
            let _ = rebound.evaluate();
            rebound
        })
        .unwrap();
        assert_eq!(rebound.evaluate().as_str(), Some("Cy"));
        let properties: Vec<_> = deps.iter().map(|dep| dep.property.as_str()).collect();
        assert_eq!(properties, ["user", "name"]);

        root.set("user", Value::Null).unwrap();
        assert!(getter.rebind().is_unresolved());
        assert_eq!(negated.getter().unwrap().rebind().evaluate(), Value::Bool(true));
    }

    #[test]
    fn host_expressions() {
        host::register("tales_test_age_next", |ctx| {
            let user = ctx.get("user");
            let user = user.as_observable().ok_or_else(|| HostError::new("no user"))?;
            Ok(Value::from(user.get("age").as_number().unwrap_or(0.0) + 1.0))
        });
        let ctx = ctx();
        let resolved = resolve("js:tales_test_age_next()", &ctx, false).unwrap();
        let (value, deps) = detect_with(|| resolved.evaluate()).unwrap();
        assert_eq!(value.as_number(), Some(8.0));
        assert!(deps.iter().any(|d| d.property == "age"));
        assert!(resolved.getter().unwrap().target().is_none());
        host::unregister("tales_test_age_next");
    }
}
