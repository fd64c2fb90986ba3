#![forbid(unsafe_code)]

//! Directive interpreter.
//!
//! Each directive attribute is parsed into a [`Statement`] and applied to
//! its element by the function in the matching submodule. Directives that
//! bind data follow one protocol ([`bind`]):
//!
//! 1. resolve the expression, evaluate it inside a detection window and
//!    apply the value synchronously;
//! 2. subscribe a re-evaluation callback to every dependency read (and to
//!    the getter's own target), collecting the subscriptions in a
//!    [`BindingScope`] owned by a DOM node through the [`Renderer`].
//!
//! | Directive | Statement | Reactive |
//! |---|---|---|
//! | `define` | `[local\|global] name expr[; ...]` | no |
//! | `condition` | `expr` | yes |
//! | `with` | `expr` | yes |
//! | `repeat` | `name expr` | yes (array edits) |
//! | `content` | `[text\|structure] expr` | yes |
//! | `replace` | `[text\|structure] expr` | yes |
//! | `attributes` | `name expr[; ...]` | yes |
//! | `omit-tag` | `[expr]` | no |
//! | `listen` | `event path[; ...]` | DOM to data |

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::LazyLock;

use bitflags::bitflags;
use regex_lite::Regex;

use crate::error::{Result, TalError};
use crate::parser::Renderer;
use crate::reactive::{BindingScope, Callback, Dependency, Observable, callback, detect_with};
use crate::tales::{self, Expression, Getter};
use crate::value::Value;

pub mod attributes;
pub mod condition;
pub mod content;
pub mod define;
pub mod listen;
pub mod omit_tag;
pub mod repeat;

bitflags! {
    /// Set of directive kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Directives: u16 {
        const DEFINE     = 1 << 0;
        const CONDITION  = 1 << 1;
        const WITH       = 1 << 2;
        const REPEAT     = 1 << 3;
        const CONTENT    = 1 << 4;
        const REPLACE    = 1 << 5;
        const ATTRIBUTES = 1 << 6;
        const OMIT_TAG   = 1 << 7;
        const LISTEN     = 1 << 8;
    }
}

impl Directives {
    /// Single directives in application order.
    pub const ORDER: [Directives; 9] = [
        Self::DEFINE,
        Self::CONDITION,
        Self::WITH,
        Self::REPEAT,
        Self::CONTENT,
        Self::REPLACE,
        Self::ATTRIBUTES,
        Self::OMIT_TAG,
        Self::LISTEN,
    ];

    /// Directives that take ownership of the element and its subtree.
    pub const SCOPING: Directives = Self::CONDITION.union(Self::WITH).union(Self::REPEAT);

    /// Attribute name (without prefix) of a single directive.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DEFINE => "define",
            Self::CONDITION => "condition",
            Self::WITH => "with",
            Self::REPEAT => "repeat",
            Self::CONTENT => "content",
            Self::REPLACE => "replace",
            Self::ATTRIBUTES => "attributes",
            Self::OMIT_TAG => "omit-tag",
            Self::LISTEN => "listen",
            _ => "",
        }
    }

    #[must_use]
    pub fn from_directive_name(name: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|d| d.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Rendering mode of `content` and `replace`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextMode {
    #[default]
    Text,
    /// Parse the value as HTML.
    Structure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    /// `global` is accepted and treated like `local`.
    pub global: bool,
    pub name: String,
    pub expression: String,
}

/// `name expr` pair of `attributes` and `listen`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pair {
    pub name: String,
    pub expression: String,
}

/// A parsed directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Define(Vec<Definition>),
    Condition(String),
    With(String),
    Repeat { name: String, expression: String },
    Content { mode: TextMode, expression: String },
    Replace { mode: TextMode, expression: String },
    Attributes(Vec<Pair>),
    OmitTag(Option<String>),
    Listen(Vec<Pair>),
}

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?:(local|global)\s+)?(\S+)\s+(.+)$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(\S+)\s+(.+)$").unwrap_or_else(|_| unreachable!("static pattern"))
});

static MODED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?:(text|structure)\s+)?(.+)$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

fn group(caps: &regex_lite::Captures<'_>, index: usize) -> String {
    caps.get(index).map_or_else(String::new, |m| m.as_str().trim().to_owned())
}

fn pairs(directive: Directives, text: &str) -> Result<Vec<Pair>> {
    let parsed: Vec<Pair> = text
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            PAIR.captures(part)
                .map(|caps| Pair {
                    name: group(&caps, 1),
                    expression: group(&caps, 2),
                })
                .ok_or_else(|| TalError::invalid_statement(directive.name(), text))
        })
        .collect::<Result<_>>()?;
    if parsed.is_empty() {
        return Err(TalError::invalid_statement(directive.name(), text));
    }
    Ok(parsed)
}

fn moded(directive: Directives, text: &str) -> Result<(TextMode, String)> {
    let caps = MODED
        .captures(text.trim())
        .ok_or_else(|| TalError::invalid_statement(directive.name(), text))?;
    let mode = match caps.get(1).map(|m| m.as_str()) {
        Some("structure") => TextMode::Structure,
        _ => TextMode::Text,
    };
    Ok((mode, group(&caps, 2)))
}

fn non_empty(directive: Directives, text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TalError::invalid_statement(directive.name(), text));
    }
    Ok(trimmed.to_owned())
}

impl Statement {
    /// Parse the attribute text of a single `directive`.
    pub fn parse(directive: Directives, text: &str) -> Result<Self> {
        match directive {
            Directives::DEFINE => {
                let definitions: Vec<Definition> = text
                    .split(';')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| {
                        DEFINITION
                            .captures(part)
                            .map(|caps| Definition {
                                global: caps.get(1).is_some_and(|m| m.as_str() == "global"),
                                name: group(&caps, 2),
                                expression: group(&caps, 3),
                            })
                            .ok_or_else(|| TalError::invalid_statement("define", text))
                    })
                    .collect::<Result<_>>()?;
                if definitions.is_empty() {
                    return Err(TalError::invalid_statement("define", text));
                }
                Ok(Self::Define(definitions))
            }
            Directives::CONDITION => non_empty(directive, text).map(Self::Condition),
            Directives::WITH => non_empty(directive, text).map(Self::With),
            Directives::REPEAT => {
                let caps = PAIR
                    .captures(text.trim())
                    .ok_or_else(|| TalError::invalid_statement("repeat", text))?;
                Ok(Self::Repeat {
                    name: group(&caps, 1),
                    expression: group(&caps, 2),
                })
            }
            Directives::CONTENT => {
                moded(directive, text).map(|(mode, expression)| Self::Content { mode, expression })
            }
            Directives::REPLACE => {
                moded(directive, text).map(|(mode, expression)| Self::Replace { mode, expression })
            }
            Directives::ATTRIBUTES => pairs(directive, text).map(Self::Attributes),
            Directives::OMIT_TAG => {
                let trimmed = text.trim();
                Ok(Self::OmitTag((!trimmed.is_empty()).then(|| trimmed.to_owned())))
            }
            Directives::LISTEN => pairs(directive, text).map(Self::Listen),
            _ => Err(TalError::invalid_statement(format!("{directive:?}"), text)),
        }
    }

    #[must_use]
    pub fn directive(&self) -> Directives {
        match self {
            Self::Define(_) => Directives::DEFINE,
            Self::Condition(_) => Directives::CONDITION,
            Self::With(_) => Directives::WITH,
            Self::Repeat { .. } => Directives::REPEAT,
            Self::Content { .. } => Directives::CONTENT,
            Self::Replace { .. } => Directives::REPLACE,
            Self::Attributes(_) => Directives::ATTRIBUTES,
            Self::OmitTag(_) => Directives::OMIT_TAG,
            Self::Listen(_) => Directives::LISTEN,
        }
    }
}

// ---------------------------------------------------------------------------
// Binding protocol
// ---------------------------------------------------------------------------

/// Applies an evaluated value to the DOM.
pub(crate) type Apply = Rc<dyn Fn(&Renderer, &Value)>;

/// Resolve `expression` against `context`, logging when it does not resolve.
pub(crate) fn resolve(directive: Directives, expression: &str, context: &Value) -> Result<Expression> {
    let resolved = tales::resolve(expression, context, false)?;
    if resolved.is_unresolved() {
        tracing::warn!(
            message = "directive.unresolved",
            directive = directive.name(),
            expression
        );
    }
    Ok(resolved)
}

/// Evaluate `expression` in a detection window, apply the value, and keep
/// re-applying it whenever one of the properties it read changes.
///
/// The returned scope holds the subscriptions; the caller attaches it to a
/// node (and may retain additional state in it first). Callbacks stop
/// applying as soon as the scope is released, even if the notification that
/// released it is still being dispatched.
///
/// A multi-segment path also follows replacement of its intermediate
/// objects: see [`bind_routed`].
pub(crate) fn bind(renderer: &Renderer, expression: &Expression, apply: Apply) -> Result<BindingScope> {
    if let Some(getter) = expression.getter().filter(|getter| getter.is_routed()) {
        return bind_routed(renderer, getter, apply);
    }
    let (value, deps) = detect_with(|| expression.evaluate())?;
    apply(renderer, &value);

    let mut scope = BindingScope::new();
    let Expression::Getter(getter) = expression else {
        return Ok(scope);
    };
    let targets = targets(deps, expression);
    if targets.is_empty() {
        return Ok(scope);
    }

    let alive: Rc<dyn Any> = Rc::new(());
    let token: Weak<dyn Any> = Rc::downgrade(&alive);
    scope.retain(alive);

    let weak = renderer.downgrade();
    let getter = getter.clone();
    let update = callback(move |_, property| {
        if token.strong_count() == 0 {
            return;
        }
        let Some(renderer) = weak.upgrade() else {
            return;
        };
        tracing::trace!(message = "binding.update", property);
        let value = getter.value();
        apply(&renderer, &value);
    });
    for (observable, property) in &targets {
        scope.subscribe_callback(observable, property, &update);
    }
    tracing::debug!(message = "binding.bound", dependencies = targets.len());
    Ok(scope)
}

/// Recorded dependencies plus the getter's own target, without duplicates.
fn targets(deps: Vec<Dependency>, expression: &Expression) -> Vec<(Observable, String)> {
    let mut targets: Vec<(Observable, String)> = deps
        .into_iter()
        .map(|dep| (dep.observable, dep.property))
        .collect();
    if let Some((observable, property)) = expression.getter().and_then(Getter::target) {
        let known = targets
            .iter()
            .any(|(obs, prop)| obs.ptr_eq(observable) && prop == property);
        if !known {
            targets.push((observable.clone(), property.to_owned()));
        }
    }
    targets
}

/// Subscriptions of a routed binding. They are replaced whenever a
/// re-evaluation reads a different set of `(observable, property)` pairs.
struct Rebinding {
    targets: Vec<(Observable, String)>,
    subscriptions: BindingScope,
    update: Option<Callback>,
}

impl Rebinding {
    fn resubscribe(&mut self, targets: Vec<(Observable, String)>) {
        let unchanged = self.targets.len() == targets.len()
            && self
                .targets
                .iter()
                .zip(&targets)
                .all(|((a, p), (b, q))| a.ptr_eq(b) && p == q);
        if unchanged {
            return;
        }
        self.subscriptions.clear();
        if let Some(update) = &self.update {
            for (observable, property) in &targets {
                self.subscriptions.subscribe_callback(observable, property, update);
            }
        }
        tracing::trace!(message = "binding.resubscribed", dependencies = targets.len());
        self.targets = targets;
    }
}

/// Walk the getter's path again and evaluate it, recording every read.
fn walk(getter: &Getter) -> Result<(Expression, Value, Vec<Dependency>)> {
    let ((expression, value), deps) = detect_with(|| {
        let expression = getter.rebind();
        let value = expression.evaluate();
        (expression, value)
    })?;
    Ok((expression, value, deps))
}

/// [`bind`] for a path through intermediate objects (`user/name`).
///
/// Every notification re-walks the path from its root, so replacing `user`
/// re-targets the binding at the new object's `name`, and an intermediate
/// that is no longer an object makes the value `undefined` until it is one
/// again.
fn bind_routed(renderer: &Renderer, getter: &Getter, apply: Apply) -> Result<BindingScope> {
    let (expression, value, deps) = walk(getter)?;
    apply(renderer, &value);

    let state = Rc::new(RefCell::new(Rebinding {
        targets: Vec::new(),
        subscriptions: BindingScope::new(),
        update: None,
    }));
    let shared = Rc::downgrade(&state);
    let weak = renderer.downgrade();
    let origin = getter.clone();
    let update = callback(move |_, property| {
        let (Some(state), Some(renderer)) = (shared.upgrade(), weak.upgrade()) else {
            return;
        };
        let (expression, value, deps) = match walk(&origin) {
            Ok(walked) => walked,
            Err(err) => {
                tracing::error!(message = "binding.rebind.failed", property, error = %err);
                return;
            }
        };
        tracing::trace!(message = "binding.update", property, routed = true);
        state.borrow_mut().resubscribe(targets(deps, &expression));
        apply(&renderer, &value);
    });
    {
        let mut rebinding = state.borrow_mut();
        rebinding.update = Some(update);
        rebinding.resubscribe(targets(deps, &expression));
        tracing::debug!(
            message = "binding.bound",
            dependencies = rebinding.targets.len(),
            routed = true
        );
    }

    let mut scope = BindingScope::new();
    scope.retain(state);
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directive_names_round_trip() {
        for directive in Directives::ORDER {
            assert_eq!(Directives::from_directive_name(directive.name()), Some(directive));
        }
        assert_eq!(Directives::from_directive_name("switch"), None);
        assert!(Directives::SCOPING.contains(Directives::REPEAT));
        assert!(!Directives::SCOPING.contains(Directives::CONTENT));
    }

    #[test]
    fn parse_define() {
        let parsed = Statement::parse(Directives::DEFINE, "global a 'x'; b user/name;").unwrap();
        assert_eq!(
            parsed,
            Statement::Define(vec![
                Definition {
                    global: true,
                    name: "a".into(),
                    expression: "'x'".into(),
                },
                Definition {
                    global: false,
                    name: "b".into(),
                    expression: "user/name".into(),
                },
            ])
        );
        assert!(Statement::parse(Directives::DEFINE, "lonely").is_err());
    }

    #[test]
    fn parse_moded() {
        assert_eq!(
            Statement::parse(Directives::CONTENT, "structure body").unwrap(),
            Statement::Content {
                mode: TextMode::Structure,
                expression: "body".into(),
            }
        );
        assert_eq!(
            Statement::parse(Directives::REPLACE, " title ").unwrap(),
            Statement::Replace {
                mode: TextMode::Text,
                expression: "title".into(),
            }
        );
    }

    #[test]
    fn parse_repeat_requires_a_name() {
        assert_eq!(
            Statement::parse(Directives::REPEAT, "item items").unwrap(),
            Statement::Repeat {
                name: "item".into(),
                expression: "items".into(),
            }
        );
        assert_eq!(
            Statement::parse(Directives::REPEAT, "items"),
            Err(TalError::invalid_statement("repeat", "items"))
        );
    }

    #[test]
    fn parse_pairs_and_omit_tag() {
        assert_eq!(
            Statement::parse(Directives::ATTRIBUTES, "href link/url; title 'x'").unwrap(),
            Statement::Attributes(vec![
                Pair {
                    name: "href".into(),
                    expression: "link/url".into(),
                },
                Pair {
                    name: "title".into(),
                    expression: "'x'".into(),
                },
            ])
        );
        assert!(Statement::parse(Directives::LISTEN, "value").is_err());
        assert!(Statement::parse(Directives::ATTRIBUTES, " ; ").is_err());
        assert_eq!(
            Statement::parse(Directives::OMIT_TAG, "  ").unwrap(),
            Statement::OmitTag(None)
        );
        assert_eq!(
            Statement::parse(Directives::CONDITION, "").unwrap_err(),
            TalError::invalid_statement("condition", "")
        );
    }
}
