#![forbid(unsafe_code)]

//! `define`: assign values into the current context (evaluated once).
//!
//! A name that already holds a callable is treated as a setter hook: it is
//! called with `(value, element)` and the context as `this` instead of
//! being overwritten.

use tal_dom::NodeId;

use crate::error::{Result, TalError};
use crate::statements::{Definition, Directives};
use crate::tales::{self, Expression};
use crate::value::Value;

pub(crate) fn apply(el: NodeId, definitions: &[Definition], context: &Value) -> Result<()> {
    let Some(ctx) = context.as_observable() else {
        return Err(TalError::ContextNotObservable {
            expression: context.type_name().to_owned(),
        });
    };
    for definition in definitions {
        let value = match tales::resolve(&definition.expression, context, false) {
            Ok(Expression::Unresolved) => Value::string(&definition.expression),
            Ok(expression) => expression.evaluate(),
            Err(err) => {
                tracing::error!(
                    message = "directive.failed",
                    directive = Directives::DEFINE.name(),
                    name = %definition.name,
                    error = %err
                );
                continue;
            }
        };
        if definition.global {
            tracing::debug!(message = "define.global", name = %definition.name);
        }

        let hook = ctx.peek(&definition.name);
        let args = [value.clone(), Value::Node(el)];
        let this = Value::Observable(ctx.clone());
        match &hook {
            Value::Function(function) => {
                function.call(&this, &args);
                continue;
            }
            Value::Observable(obs) if obs.is_function() => {
                if let Value::Function(function) = obs.raw() {
                    function.call(&this, &args);
                }
                continue;
            }
            _ => {}
        }
        tracing::trace!(message = "define.assign", name = %definition.name);
        if let Err(err) = ctx.set(&definition.name, value) {
            tracing::error!(
                message = "define.failed",
                name = %definition.name,
                error = %err
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tal_dom::Document;

    use super::*;
    use crate::reactive::wrap_object;
    use crate::statements::Statement;
    use crate::value::{Function, Object};

    fn definitions(text: &str) -> Vec<Definition> {
        match Statement::parse(Directives::DEFINE, text).unwrap() {
            Statement::Define(definitions) => definitions,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn assigns_into_the_context() {
        let el = Document::new().create_element("p");
        let ctx = wrap_object(&Value::from(Object::new().with("user", "ann")), None).unwrap();
        apply(
            el,
            &definitions("a 'lit'; global b user; c some words"),
            &Value::Observable(ctx.clone()),
        )
        .unwrap();
        assert_eq!(ctx.get("a").as_str(), Some("lit"));
        assert_eq!(ctx.get("b").as_str(), Some("ann"));
        assert_eq!(ctx.get("c").as_str(), Some("some words"));
    }

    #[test]
    fn callable_names_are_hooks() {
        let el = Document::new().create_element("p");
        let seen: Rc<RefCell<Vec<Value>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let hook = Function::new(move |this, args| {
            assert!(this.as_observable().is_some());
            sink.borrow_mut().extend(args.iter().cloned());
            Value::Undefined
        });
        let ctx = wrap_object(&Value::from(Object::new().with("hook", hook)), None).unwrap();
        apply(el, &definitions("hook 'x'"), &Value::Observable(ctx.clone())).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen[0].as_str(), Some("x"));
        assert_eq!(seen[1].as_node(), Some(el));
        assert!(ctx.get("hook").is_callable());
    }

    #[test]
    fn reserved_names_are_logged_not_fatal() {
        let el = Document::new().create_element("p");
        let ctx = wrap_object(&Value::from(Object::new()), None).unwrap();
        apply(el, &definitions("root 'x'; ok 'y'"), &Value::Observable(ctx.clone()))
            .unwrap();
        assert_eq!(ctx.get("ok").as_str(), Some("y"));
    }
}
