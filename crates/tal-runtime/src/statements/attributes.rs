#![forbid(unsafe_code)]

//! `attributes`: bind attributes and their mirrored properties.
//!
//! `false`, `null` and `undefined` remove the attribute and reset the
//! property (`false` for booleans, `""` otherwise); anything else sets both
//! to the value.

use std::rc::Rc;

use tal_dom::{Document, NodeId, Property};

use crate::error::Result;
use crate::parser::Renderer;
use crate::reactive::BindingScope;
use crate::statements::{self, Apply, Directives, Pair};
use crate::value::Value;

fn write(doc: &Document, el: NodeId, name: &str, value: &Value) {
    if !doc.is_alive(el) {
        return;
    }
    let value = match value {
        Value::Observable(obs) => obs.primitive_value().unwrap_or_else(|| value.clone()),
        other => other.clone(),
    };
    match value {
        Value::Bool(false) => {
            doc.remove_attribute(el, name);
            doc.set_property(el, name, Property::Bool(false));
        }
        Value::Undefined | Value::Null => {
            doc.remove_attribute(el, name);
            doc.set_property(el, name, Property::Text(String::new()));
        }
        Value::Bool(true) => {
            doc.set_attribute(el, name, "true");
            doc.set_property(el, name, Property::Bool(true));
        }
        other => {
            let text = other.to_string();
            doc.set_attribute(el, name, &text);
            doc.set_property(el, name, Property::Text(text));
        }
    }
}

pub(crate) fn apply(renderer: &Renderer, el: NodeId, pairs: &[Pair], context: &Value) -> Result<()> {
    let mut scope = BindingScope::new();
    for pair in pairs {
        let resolved = match statements::resolve(Directives::ATTRIBUTES, &pair.expression, context) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::error!(
                    message = "directive.failed",
                    directive = Directives::ATTRIBUTES.name(),
                    attribute = %pair.name,
                    error = %err
                );
                continue;
            }
        };
        let name = pair.name.clone();
        let update: Apply = Rc::new(move |renderer, value| {
            write(renderer.document(), el, &name, value);
        });
        scope.absorb(statements::bind(renderer, &resolved, update)?);
    }
    renderer.attach(el, scope);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Observable, wrap_object};
    use crate::value::Object;
    use pretty_assertions::assert_eq;

    fn render(html: &str, data: Object) -> (Renderer, Observable, NodeId) {
        let renderer = Renderer::new(Document::from_html(html));
        let ctx = wrap_object(&Value::from(data), None).unwrap();
        renderer
            .render_by_id("app", &Value::Observable(ctx.clone()))
            .unwrap();
        let el = renderer.document().element_by_id("app").unwrap();
        (renderer, ctx, el)
    }

    #[test]
    fn sets_and_removes_attributes() {
        let (renderer, ctx, el) = render(
            r#"<a id="app" tal:attributes="href link; title 'fixed'"></a>"#,
            Object::new().with("link", "/x"),
        );
        let doc = renderer.document();
        assert_eq!(doc.outer_html(el), r#"<a id="app" href="&#x2f;x" title="fixed"></a>"#);
        ctx.set("link", Value::Null).unwrap();
        assert_eq!(doc.attribute(el, "href"), None);
        assert_eq!(doc.property(el, "href"), Some(Property::Text(String::new())));
        ctx.set("link", Value::from(5)).unwrap();
        assert_eq!(doc.attribute(el, "href").as_deref(), Some("5"));
    }

    #[test]
    fn booleans_mirror_onto_properties() {
        let (renderer, ctx, el) = render(
            r#"<input id="app" tal:attributes="checked on">"#,
            Object::new().with("on", true),
        );
        let doc = renderer.document();
        assert_eq!(doc.property(el, "checked"), Some(Property::Bool(true)));
        assert!(doc.has_attribute(el, "checked"));
        ctx.set("on", Value::from(false)).unwrap();
        assert_eq!(doc.property(el, "checked"), Some(Property::Bool(false)));
        assert!(!doc.has_attribute(el, "checked"));
    }

    #[test]
    fn a_failing_pair_does_not_block_the_others() {
        let (renderer, _, el) = render(
            r#"<p id="app" tal:attributes="title nocall:x; lang 'en'"></p>"#,
            Object::new(),
        );
        assert_eq!(renderer.document().attribute(el, "lang").as_deref(), Some("en"));
        assert_eq!(renderer.document().attribute(el, "title"), None);
    }
}
