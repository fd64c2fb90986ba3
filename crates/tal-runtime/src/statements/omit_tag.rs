#![forbid(unsafe_code)]

//! `omit-tag`: unwrap the element, keeping its children in place.

use tal_dom::NodeId;

use crate::error::Result;
use crate::parser::Renderer;
use crate::statements::{self, Directives};
use crate::value::Value;

/// Returns whether the element was removed.
pub(crate) fn apply(
    renderer: &Renderer,
    el: NodeId,
    expression: Option<&str>,
    context: &Value,
) -> Result<bool> {
    let omit = match expression {
        None => true,
        Some(expression) => statements::resolve(Directives::OMIT_TAG, expression, context)?
            .evaluate()
            .truthy(),
    };
    if !omit {
        return Ok(false);
    }
    let doc = renderer.document();
    let children = doc.children(el);
    if !doc.replace_with(el, &children) {
        tracing::warn!(message = "omit_tag.detached", node = ?el);
        return Ok(false);
    }
    renderer.remove_node(el);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use tal_dom::Document;

    use super::*;
    use crate::reactive::wrap_object;
    use crate::value::Object;
    use pretty_assertions::assert_eq;

    fn rendered(html: &str, data: Object) -> String {
        let renderer = Renderer::new(Document::from_html(html));
        let ctx = wrap_object(&Value::from(data), None).unwrap();
        renderer.render_by_id("app", &Value::Observable(ctx)).unwrap();
        let doc = renderer.document();
        doc.inner_html(doc.element_by_id("app").unwrap())
    }

    #[test]
    fn empty_expression_unwraps() {
        assert_eq!(
            rendered(
                r#"<div id="app"><span tal:omit-tag="">a<b tal:content="x">b</b></span></div>"#,
                Object::new().with("x", "X"),
            ),
            "a<b>X</b>"
        );
    }

    #[test]
    fn expression_decides() {
        let html = r#"<div id="app"><span tal:omit-tag="flag">a</span></div>"#;
        assert_eq!(rendered(html, Object::new().with("flag", true)), "a");
        assert_eq!(rendered(html, Object::new().with("flag", "")), "<span>a</span>");
    }

    #[test]
    fn detached_element_is_kept() {
        let renderer = Renderer::new(Document::new());
        let el = renderer.document().create_element("p");
        let ctx = wrap_object(&Value::from(Object::new()), None).unwrap();
        assert!(!apply(&renderer, el, None, &Value::Observable(ctx)).unwrap());
        assert!(renderer.document().is_alive(el));
    }
}
