#![forbid(unsafe_code)]

//! TAL reactive template binding: public facade.
//!
//! ```
//! use tal::prelude::*;
//!
//! let doc = Document::from_html(r#"<p id="app" tal:content="name"></p>"#);
//! let data = Object::new().with("name", "Ann");
//! let ctx = wrap_as_observable(Value::from(data), None);
//! let rendered = render(&doc, "app", &ctx).unwrap();
//!
//! let p = doc.element_by_id("app").unwrap();
//! assert_eq!(doc.text_content(p), "Ann");
//! rendered.context().set("name", Value::from("Bob")).unwrap();
//! assert_eq!(doc.text_content(p), "Bob");
//! ```

pub use tal_dom as dom;
pub use tal_runtime as runtime;

use tal_dom::{Document, NodeId};
use tal_runtime::{Observable, Renderer, Result, TalConfig, Value};

/// Wrap `value` for use as (part of) a template context.
///
/// Identity-stable: wrapping the same object, array or callable again
/// returns the same observable. Primitives get a fresh primitive wrapper;
/// `undefined`, `null` and existing observables pass through.
#[must_use]
pub fn wrap_as_observable(value: Value, parent: Option<&Observable>) -> Value {
    tal_runtime::wrap(value, parent)
}

/// Root of a render: an element or the `id` of one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Root<'a> {
    Node(NodeId),
    Id(&'a str),
}

impl From<NodeId> for Root<'_> {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl<'a> From<&'a str> for Root<'a> {
    fn from(id: &'a str) -> Self {
        Self::Id(id)
    }
}

/// Live bindings of one render. Dropping it unsubscribes them; the DOM
/// keeps its last rendered state.
#[derive(Debug)]
pub struct Rendered {
    renderer: Renderer,
    context: Observable,
}

impl Rendered {
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    #[must_use]
    pub fn context(&self) -> &Observable {
        &self.context
    }

    #[must_use]
    pub fn into_parts(self) -> (Renderer, Observable) {
        (self.renderer, self.context)
    }
}

/// Render `root` in `document` against `context` with the configuration
/// from the environment (`TAL_PREFIX`).
///
/// # Errors
///
/// `TemplateNotElement` if `root` does not name an element,
/// `ContextNotObservable` if `context` was not wrapped (see
/// [`wrap_as_observable`]), `Config` for an invalid `TAL_PREFIX`.
pub fn render<'a>(document: &Document, root: impl Into<Root<'a>>, context: &Value) -> Result<Rendered> {
    let config = TalConfig::from_env()?;
    let renderer = Renderer::with_config(document.clone(), config);
    let context = match root.into() {
        Root::Node(node) => renderer.render(node, context)?,
        Root::Id(id) => renderer.render_by_id(id, context)?,
    };
    Ok(Rendered { renderer, context })
}

pub mod prelude {
    pub use crate::{Rendered, Root, render, wrap_as_observable};
    pub use tal_dom::{Document, Event, NodeId, Property};
    pub use tal_runtime::{
        Array, BindingScope, Change, Function, Object, Observable, Renderer, TalConfig, TalError, Value,
        host, register_converter,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn roots_convert() {
        let doc = Document::new();
        let node = doc.create_element("p");
        assert_eq!(Root::from(node), Root::Node(node));
        assert_eq!(Root::from("app"), Root::Id("app"));
    }

    #[test]
    fn render_reports_contract_errors() {
        let doc = Document::from_html(r#"<p id="app"></p>"#);
        let ctx = wrap_as_observable(Value::from(Object::new()), None);
        assert!(matches!(
            render(&doc, "nope", &ctx),
            Err(TalError::TemplateNotElement)
        ));
        assert!(matches!(
            render(&doc, "app", &Value::from(Object::new())),
            Err(TalError::ContextNotObservable { .. })
        ));
    }

    #[test]
    fn rendered_keeps_bindings_alive() {
        let doc = Document::from_html(r#"<p id="app" tal:content="n"></p>"#);
        let ctx = wrap_as_observable(Value::from(Object::new().with("n", 1)), None);
        let rendered = render(&doc, "app", &ctx).unwrap();
        let p = doc.element_by_id("app").unwrap();
        rendered.context().set("n", Value::from(2)).unwrap();
        assert_eq!(doc.text_content(p), "2");
        let (renderer, context) = rendered.into_parts();
        drop(renderer);
        context.set("n", Value::from(3)).unwrap();
        assert_eq!(doc.text_content(p), "2");
    }
}
