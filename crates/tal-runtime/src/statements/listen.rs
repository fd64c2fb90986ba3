#![forbid(unsafe_code)]

//! `listen`: write DOM state back into the context.
//!
//! | Name | DOM event | Written value |
//! |---|---|---|
//! | `value` | `change` | `value` property |
//! | `checked` | `change` | `checked` property |
//! | `input` | `input` | `value` property |
//! | `toggle` | `toggle` | the event's new state |
//! | other | same name | the event (callables are called with it) |
//!
//! Targets resolve in writer mode, so a path to a plain property becomes a
//! setter. Listeners hold the document weakly.
//!
//! `value` and `checked` also observe the property itself, so a
//! programmatic [`Document::set_property`](tal_dom::Document::set_property)
//! reaches the context without a `change` event.

use std::rc::Rc;

use tal_dom::{Event, Listener, NodeId, Property, PropertyObserver, WeakDocument};

use crate::error::Result;
use crate::parser::Renderer;
use crate::statements::{Directives, Pair};
use crate::tales::{self, Expression, Getter};
use crate::value::Value;

fn to_value(property: Option<Property>) -> Value {
    match property {
        Some(Property::Bool(flag)) => Value::from(flag),
        Some(Property::Text(text)) => Value::string(text),
        None => Value::Undefined,
    }
}

fn property_value(document: &WeakDocument, event: &Event, property: &str) -> Option<Value> {
    let doc = document.upgrade()?;
    let target = event.target()?;
    Some(to_value(doc.property(target, property)))
}

fn observer(getter: Getter) -> PropertyObserver {
    Rc::new(move |value: &Property| getter.set(to_value(Some(value.clone()))))
}

fn listener(name: &str, getter: Getter, document: WeakDocument) -> (String, Listener) {
    match name {
        "value" | "checked" => {
            let property = name.to_owned();
            let listener: Listener = Rc::new(move |event: &Event| {
                if let Some(value) = property_value(&document, event, &property) {
                    getter.set(value);
                }
            });
            ("change".to_owned(), listener)
        }
        "input" => {
            let listener: Listener = Rc::new(move |event: &Event| {
                if let Some(value) = property_value(&document, event, "value") {
                    getter.set(value);
                }
            });
            ("input".to_owned(), listener)
        }
        "toggle" => {
            let listener: Listener = Rc::new(move |event: &Event| {
                getter.set(event.new_state().map_or(Value::Undefined, Value::string));
            });
            ("toggle".to_owned(), listener)
        }
        other => {
            let listener: Listener = Rc::new(move |event: &Event| {
                let payload = Value::Event(Rc::new(event.clone()));
                if getter.is_callable() {
                    getter.invoke(&[payload]);
                } else {
                    getter.set(payload);
                }
            });
            (other.to_owned(), listener)
        }
    }
}

pub(crate) fn apply(renderer: &Renderer, el: NodeId, pairs: &[Pair], context: &Value) -> Result<()> {
    let doc = renderer.document();
    for pair in pairs {
        let getter = match tales::resolve(&pair.expression, context, true) {
            Ok(Expression::Getter(getter)) => getter,
            Ok(Expression::Literal(_)) => {
                tracing::debug!(message = "listen.literal", event = %pair.name);
                continue;
            }
            Ok(Expression::Unresolved) => {
                tracing::warn!(
                    message = "directive.unresolved",
                    directive = Directives::LISTEN.name(),
                    expression = %pair.expression
                );
                continue;
            }
            Err(err) => {
                tracing::error!(
                    message = "directive.failed",
                    directive = Directives::LISTEN.name(),
                    event = %pair.name,
                    error = %err
                );
                continue;
            }
        };
        if matches!(pair.name.as_str(), "value" | "checked") {
            doc.observe_property(el, &pair.name, observer(getter.clone()));
        }
        let (kind, listener) = listener(&pair.name, getter, doc.downgrade());
        tracing::trace!(message = "listen.attach", node = ?el, kind = %kind);
        doc.add_event_listener(el, &kind, listener);
    }
    Ok(())
}
