#![forbid(unsafe_code)]

//! Tree walker.
//!
//! [`Renderer::parse`] collects every directive-bearing element under a root
//! in one static query and applies their directives in a fixed order:
//!
//! ```text
//! define -> (with | condition) -> repeat -> (content | replace)
//!        -> attributes -> omit-tag -> listen -> strip prefixed attributes
//! ```
//!
//! `condition`, `with` and `repeat` take over the element and re-parse
//! clones of it themselves; the walker records the element as a skipper and
//! ignores its descendants for the rest of the pass. `replace` removes the
//! element, so nothing after it applies.
//!
//! # Binding ownership
//!
//! Every directive that subscribes to data hands its [`BindingScope`] to the
//! renderer, keyed by the DOM node that owns it. [`Renderer::remove_node`]
//! and [`Renderer::release`] drop the scopes of a node and its descendants,
//! which unsubscribes them.
//!
//! # Failure Modes
//!
//! Only contract violations at the entry point ([`Renderer::render`]) are
//! returned. A directive that fails is logged at `error` and skipped; the
//! pass always covers the whole tree.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tal_dom::{Document, NodeId};

use crate::config::TalConfig;
use crate::error::{Result, TalError};
use crate::reactive::{BindingScope, Observable, ObservableKind};
use crate::statements::{
    Directives, Statement, attributes, condition, content, define, listen, omit_tag, repeat,
};
use crate::value::Value;

/// Pre-processing hook run on `(root, context)` before directives are
/// collected; used to translate other attribute syntaxes into directives.
pub type Converter = dyn Fn(&Renderer, NodeId, &Value);

thread_local! {
    static CONVERTERS: RefCell<Vec<Rc<Converter>>> = const { RefCell::new(Vec::new()) };
}

/// Append a converter to the current thread's registry.
pub fn register_converter(f: impl Fn(&Renderer, NodeId, &Value) + 'static) {
    CONVERTERS.with_borrow_mut(|converters| converters.push(Rc::new(f)));
}

#[must_use]
pub fn converter_count() -> usize {
    CONVERTERS.with_borrow(Vec::len)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

struct RendererInner {
    document: Document,
    config: TalConfig,
    attributes: Vec<String>,
    scopes: RefCell<AHashMap<NodeId, BindingScope>>,
}

/// Binds templates in one [`Document`] to observable data.
///
/// Cheap to clone. Bindings stay live while a handle exists; reactive
/// callbacks only hold a [`WeakRenderer`].
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

/// Weak counterpart of [`Renderer`].
#[derive(Clone)]
pub struct WeakRenderer {
    inner: Weak<RendererInner>,
}

impl WeakRenderer {
    #[must_use]
    pub fn upgrade(&self) -> Option<Renderer> {
        self.inner.upgrade().map(|inner| Renderer { inner })
    }
}

/// Result of processing one element.
enum Flow {
    Continue,
    /// The element's subtree is handled elsewhere.
    Skip,
}

impl Renderer {
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self::with_config(document, TalConfig::default())
    }

    #[must_use]
    pub fn with_config(document: Document, config: TalConfig) -> Self {
        let attributes = config.attributes();
        Self {
            inner: Rc::new(RendererInner {
                document,
                config,
                attributes,
                scopes: RefCell::new(AHashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    #[must_use]
    pub fn config(&self) -> &TalConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakRenderer {
        WeakRenderer {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Bind `root` to `context` and return the context.
    ///
    /// # Errors
    ///
    /// [`TalError::TemplateNotElement`] if `root` is not a live element,
    /// [`TalError::ContextNotObservable`] unless `context` is an object,
    /// array or callable observable.
    pub fn render(&self, root: NodeId, context: &Value) -> Result<Observable> {
        if !self.document().is_element(root) {
            return Err(TalError::TemplateNotElement);
        }
        let observable = match context {
            Value::Observable(obs) if obs.kind() != ObservableKind::Primitive => obs.clone(),
            other => {
                return Err(TalError::ContextNotObservable {
                    expression: other.type_name().to_owned(),
                });
            }
        };
        self.prune();
        tracing::debug!(message = "render.start", root = ?root);
        self.parse(root, context);
        tracing::debug!(
            message = "render.done",
            root = ?root,
            scopes = self.scope_count(),
            bindings = self.binding_count()
        );
        Ok(observable)
    }

    /// [`render`](Self::render) the element with the given `id` attribute.
    pub fn render_by_id(&self, id: &str, context: &Value) -> Result<Observable> {
        let root = self
            .document()
            .element_by_id(id)
            .ok_or(TalError::TemplateNotElement)?;
        self.render(root, context)
    }

    /// Apply the directives of `root` and its descendants (or of its
    /// content, for a `<template>`) against `context`.
    pub fn parse(&self, root: NodeId, context: &Value) {
        let converters = CONVERTERS.with_borrow(Vec::clone);
        for converter in &converters {
            converter(self, root, context);
        }

        let doc = self.document();
        let names: Vec<&str> = self.inner.attributes.iter().map(String::as_str).collect();
        let targets = match doc.template_content(root) {
            Some(content) => doc.query_attributes(content, &names),
            None => {
                // The root is always processed so its leftover prefixed
                // attributes are stripped even when it carries no directive.
                let mut targets = vec![root];
                targets.extend(doc.query_attributes(root, &names));
                targets
            }
        };
        tracing::trace!(message = "parse.targets", root = ?root, count = targets.len());

        let mut skippers: Vec<NodeId> = Vec::new();
        for node in targets {
            if !doc.is_alive(node) {
                tracing::trace!(message = "parse.skip.freed", node = ?node);
                continue;
            }
            if skippers.iter().any(|skipper| doc.contains(*skipper, node)) {
                continue;
            }
            if let Flow::Skip = self.process(node, context) {
                skippers.push(node);
            }
        }
    }

    fn statement(&self, node: NodeId, directive: Directives) -> Option<Statement> {
        let name = self.inner.config.attribute(directive.name());
        let text = self.document().attribute(node, &name)?;
        match Statement::parse(directive, &text) {
            Ok(statement) => Some(statement),
            Err(err) => {
                tracing::warn!(message = "directive.invalid", node = ?node, error = %err);
                None
            }
        }
    }

    fn present(&self, node: NodeId) -> Directives {
        Directives::ORDER
            .into_iter()
            .filter(|directive| {
                let name = self.inner.config.attribute(directive.name());
                self.document().has_attribute(node, &name)
            })
            .fold(Directives::empty(), |set, directive| set | directive)
    }

    fn failed(directive: Directives, node: NodeId, err: &TalError) {
        tracing::error!(
            message = "directive.failed",
            directive = directive.name(),
            node = ?node,
            error = %err
        );
    }

    fn process(&self, node: NodeId, context: &Value) -> Flow {
        let present = self.present(node);

        if let Some(Statement::Define(definitions)) = self.statement(node, Directives::DEFINE) {
            if let Err(err) = define::apply(node, &definitions, context) {
                Self::failed(Directives::DEFINE, node, &err);
            }
        }

        if present.contains(Directives::WITH | Directives::CONDITION) {
            tracing::warn!(message = "directive.conflict", node = ?node, kept = "with");
        }
        let scoping = if present.contains(Directives::WITH) {
            Some((Directives::WITH, condition::Scoping::With))
        } else if present.contains(Directives::CONDITION) {
            Some((Directives::CONDITION, condition::Scoping::Condition))
        } else {
            None
        };
        if let Some((directive, scoping)) = scoping {
            let statement = self.statement(node, directive);
            self.strip(node, Directives::DEFINE | Directives::WITH | Directives::CONDITION);
            if let Some(Statement::With(expression) | Statement::Condition(expression)) = statement {
                if let Err(err) = condition::apply(self, node, scoping, &expression, context) {
                    Self::failed(directive, node, &err);
                }
            }
            return Flow::Skip;
        }

        if present.contains(Directives::REPEAT) {
            let statement = self.statement(node, Directives::REPEAT);
            self.strip(node, Directives::DEFINE | Directives::REPEAT);
            if let Some(Statement::Repeat { name, expression }) = statement {
                if let Err(err) = repeat::apply(self, node, &name, &expression, context) {
                    Self::failed(Directives::REPEAT, node, &err);
                }
            }
            return Flow::Skip;
        }

        if present.contains(Directives::CONTENT) {
            if let Some(Statement::Content { mode, expression }) =
                self.statement(node, Directives::CONTENT)
            {
                if let Err(err) = content::apply_content(self, node, mode, &expression, context) {
                    Self::failed(Directives::CONTENT, node, &err);
                }
            }
        } else if present.contains(Directives::REPLACE) {
            if let Some(Statement::Replace { mode, expression }) =
                self.statement(node, Directives::REPLACE)
            {
                match content::apply_replace(self, node, mode, &expression, context) {
                    Ok(()) => return Flow::Skip,
                    Err(err) => Self::failed(Directives::REPLACE, node, &err),
                }
            }
        }

        if let Some(Statement::Attributes(pairs)) = self.statement(node, Directives::ATTRIBUTES) {
            if let Err(err) = attributes::apply(self, node, &pairs, context) {
                Self::failed(Directives::ATTRIBUTES, node, &err);
            }
        }

        if let Some(Statement::OmitTag(expression)) = self.statement(node, Directives::OMIT_TAG) {
            match omit_tag::apply(self, node, expression.as_deref(), context) {
                Ok(true) => return Flow::Continue,
                Ok(false) => {}
                Err(err) => Self::failed(Directives::OMIT_TAG, node, &err),
            }
        }

        if let Some(Statement::Listen(pairs)) = self.statement(node, Directives::LISTEN) {
            if let Err(err) = listen::apply(self, node, &pairs, context) {
                Self::failed(Directives::LISTEN, node, &err);
            }
        }

        self.strip_all(node);
        Flow::Continue
    }

    /// Remove the attributes of `directives` from `node`.
    fn strip(&self, node: NodeId, directives: Directives) {
        let doc = self.document();
        for directive in Directives::ORDER {
            if directives.contains(directive) {
                doc.remove_attribute(node, &self.inner.config.attribute(directive.name()));
            }
        }
    }

    /// Remove every directive attribute, or every prefixed one with
    /// `strip_unknown`.
    fn strip_all(&self, node: NodeId) {
        let doc = self.document();
        if !self.inner.config.strip_unknown {
            self.strip(node, Directives::all());
            return;
        }
        for name in doc.attribute_names(node) {
            if self.inner.config.is_prefixed(&name) {
                doc.remove_attribute(node, &name);
            }
        }
    }

    // -- binding scopes -----------------------------------------------------

    /// Hand `scope` to `node`; it is dropped when the node is released.
    pub fn attach(&self, node: NodeId, scope: BindingScope) {
        if scope.is_empty() {
            return;
        }
        let previous = {
            let mut scopes = self.inner.scopes.borrow_mut();
            match scopes.get_mut(&node) {
                Some(existing) => {
                    existing.absorb(scope);
                    None
                }
                None => scopes.insert(node, scope),
            }
        };
        drop(previous);
    }

    /// Drop the scopes owned by `node` and its descendants.
    pub fn release(&self, node: NodeId) {
        let nodes = self.document().descendants(node);
        self.release_nodes(&nodes);
    }

    /// Drop the scopes owned by the descendants of `node`, keeping its own.
    pub fn release_children(&self, node: NodeId) {
        let nodes: Vec<NodeId> = self
            .document()
            .descendants(node)
            .into_iter()
            .filter(|id| *id != node)
            .collect();
        self.release_nodes(&nodes);
    }

    fn release_nodes(&self, nodes: &[NodeId]) {
        let released: Vec<BindingScope> = {
            let mut scopes = self.inner.scopes.borrow_mut();
            if scopes.is_empty() {
                return;
            }
            nodes.iter().filter_map(|id| scopes.remove(id)).collect()
        };
        if !released.is_empty() {
            tracing::trace!(message = "scope.release", scopes = released.len());
        }
        // Inner scopes first.
        for scope in released.into_iter().rev() {
            drop(scope);
        }
    }

    /// Release `node`, detach it and free it with its subtree.
    pub fn remove_node(&self, node: NodeId) {
        self.release(node);
        self.document().dispose(node);
    }

    /// Drop scopes whose node no longer exists.
    pub fn prune(&self) {
        let dead: Vec<BindingScope> = {
            let mut scopes = self.inner.scopes.borrow_mut();
            let ids: Vec<NodeId> = scopes
                .keys()
                .copied()
                .filter(|id| !self.inner.document.is_alive(*id))
                .collect();
            ids.iter().filter_map(|id| scopes.remove(id)).collect()
        };
        if !dead.is_empty() {
            tracing::debug!(message = "scope.prune", scopes = dead.len());
        }
        drop(dead);
    }

    /// Number of nodes owning a scope.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.inner.scopes.borrow().len()
    }

    /// Subscriptions held across all scopes.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.inner
            .scopes
            .borrow()
            .values()
            .map(BindingScope::binding_count)
            .sum()
    }

    #[must_use]
    pub fn has_scope(&self, node: NodeId) -> bool {
        self.inner.scopes.borrow().contains_key(&node)
    }
}

impl Drop for RendererInner {
    // Scopes go before the document: mount state frees its templates there.
    fn drop(&mut self) {
        let scopes = std::mem::take(self.scopes.get_mut());
        drop(scopes);
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("prefix", &self.inner.config.prefix)
            .field("scopes", &self.scope_count())
            .finish()
    }
}

impl fmt::Debug for WeakRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRenderer")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{wrap, wrap_object};
    use crate::value::{Array, Object};
    use pretty_assertions::assert_eq;

    fn setup(html: &str, data: Object) -> (Renderer, Observable) {
        let renderer = Renderer::new(Document::from_html(html));
        let ctx = wrap_object(&Value::from(data), None).unwrap();
        (renderer, ctx)
    }

    fn body_html(renderer: &Renderer) -> String {
        let doc = renderer.document();
        doc.inner_html(doc.body())
    }

    #[test]
    fn render_rejects_bad_arguments() {
        let (renderer, ctx) = setup("<p id=a></p>", Object::new());
        let doc = renderer.document();
        let text = doc.create_text("x");
        assert_eq!(
            renderer.render(text, &Value::Observable(ctx.clone())),
            Err(TalError::TemplateNotElement)
        );
        assert_eq!(
            renderer.render_by_id("missing", &Value::Observable(ctx)),
            Err(TalError::TemplateNotElement)
        );
        let plain = Value::from(Object::new());
        assert!(matches!(
            renderer.render_by_id("a", &plain),
            Err(TalError::ContextNotObservable { .. })
        ));
        let primitive = wrap(Value::from(1), None);
        assert!(matches!(
            renderer.render_by_id("a", &primitive),
            Err(TalError::ContextNotObservable { .. })
        ));
    }

    #[test]
    fn content_binding_follows_data() {
        let (renderer, ctx) = setup(
            r#"<div id="app"><span tal:content="name">x</span></div>"#,
            Object::new().with("name", "Ann"),
        );
        renderer
            .render_by_id("app", &Value::Observable(ctx.clone()))
            .unwrap();
        assert_eq!(body_html(&renderer), r#"<div id="app"><span>Ann</span></div>"#);
        ctx.set("name", Value::from("Bob")).unwrap();
        assert_eq!(body_html(&renderer), r#"<div id="app"><span>Bob</span></div>"#);
        assert_eq!(renderer.binding_count(), 1);
    }

    #[test]
    fn root_directives_apply() {
        let (renderer, ctx) = setup(r#"<p id="a" tal:content="n"></p>"#, Object::new().with("n", 3));
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<p id="a">3</p>"#);
    }

    #[test]
    fn parsing_twice_is_a_no_op() {
        let (renderer, ctx) = setup(
            r#"<ul id="l"><li tal:repeat="i items" tal:content="i"></li></ul>"#,
            Object::new().with("items", Array::from(vec![Value::from(1), Value::from(2)])),
        );
        let ctx = Value::Observable(ctx);
        renderer.render_by_id("l", &ctx).unwrap();
        let first = body_html(&renderer);
        let bindings = renderer.binding_count();
        renderer.render_by_id("l", &ctx).unwrap();
        assert_eq!(body_html(&renderer), first);
        assert_eq!(renderer.binding_count(), bindings);
        assert_eq!(first, r#"<ul id="l"><li>1</li><li>2</li></ul>"#);
    }

    #[test]
    fn unknown_prefixed_attributes_are_stripped() {
        let (renderer, ctx) = setup(r#"<p id="a" tal:bogus="x" data-keep="1"></p>"#, Object::new());
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<p id="a" data-keep="1"></p>"#);
    }

    #[test]
    fn root_with_only_unknown_prefixed_attributes_is_stripped() {
        let (renderer, ctx) = setup(
            r#"<div id="a" tal:bogus="x"><b tal:content="n"></b></div>"#,
            Object::new().with("n", 1),
        );
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<div id="a"><b>1</b></div>"#);
    }

    #[test]
    fn unknown_prefixed_attributes_survive_without_strip_unknown() {
        let doc = Document::from_html(r#"<p id="a" tal:bogus="x" tal:content="'y'"></p>"#);
        let renderer = Renderer::with_config(doc, TalConfig::new().with_strip_unknown(false));
        let ctx = wrap_object(&Value::from(Object::new()), None).unwrap();
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<p id="a" tal:bogus="x">y</p>"#);
    }

    #[test]
    fn custom_prefix() {
        let doc = Document::from_html(r#"<p id="a" data-t-content="'hi'" tal:content="'no'"></p>"#);
        let renderer = Renderer::with_config(doc, TalConfig::new().with_prefix("data-t-"));
        let ctx = wrap_object(&Value::from(Object::new()), None).unwrap();
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<p id="a" tal:content="&#x27;no&#x27;">hi</p>"#);
    }

    #[test]
    fn template_content_is_parsed_in_place() {
        let (renderer, ctx) = setup(
            r#"<template id="t"><b tal:content="n"></b></template>"#,
            Object::new().with("n", "v"),
        );
        let doc = renderer.document();
        let template = doc.element_by_id("t").unwrap();
        renderer.render(template, &Value::Observable(ctx)).unwrap();
        assert_eq!(doc.inner_html(template), "<b>v</b>");
    }

    #[test]
    fn failing_directive_does_not_stop_the_pass() {
        let (renderer, ctx) = setup(
            r#"<div id="a"><i tal:content="nocall:x"></i><b tal:content="'ok'"></b></div>"#,
            Object::new(),
        );
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<div id="a"><i></i><b>ok</b></div>"#);
    }

    #[test]
    fn converters_run_before_collection() {
        register_converter(|renderer, root, _| {
            let doc = renderer.document();
            for node in doc.descendants(root) {
                if let Some(text) = doc.remove_attribute(node, "x-text") {
                    doc.set_attribute(node, "tal:content", &text);
                }
            }
        });
        assert_eq!(converter_count(), 1);
        let (renderer, ctx) = setup(r#"<p id="a"><b x-text="n"></b></p>"#, Object::new().with("n", 7));
        renderer.render_by_id("a", &Value::Observable(ctx)).unwrap();
        assert_eq!(body_html(&renderer), r#"<p id="a"><b>7</b></p>"#);
    }

    #[test]
    fn remove_node_releases_descendant_scopes() {
        let (renderer, ctx) = setup(
            r#"<div id="a"><p id="p"><b tal:content="n"></b><i tal:content="n"></i></p></div>"#,
            Object::new().with("n", 1),
        );
        renderer.render_by_id("a", &Value::Observable(ctx.clone())).unwrap();
        assert_eq!(ctx.observer_count("n"), 2);
        let p = renderer.document().element_by_id("p").unwrap();
        renderer.remove_node(p);
        assert_eq!(renderer.scope_count(), 0);
        assert_eq!(ctx.observer_count("n"), 0);
        assert!(!renderer.document().is_alive(p));
    }

    #[test]
    fn prune_drops_scopes_of_freed_nodes() {
        let (renderer, ctx) = setup(r#"<p id="a"><b tal:content="n"></b></p>"#, Object::new().with("n", 1));
        renderer.render_by_id("a", &Value::Observable(ctx.clone())).unwrap();
        let doc = renderer.document();
        let a = doc.element_by_id("a").unwrap();
        doc.dispose(a);
        assert_eq!(renderer.scope_count(), 1);
        renderer.prune();
        assert_eq!(renderer.scope_count(), 0);
        assert_eq!(ctx.observer_count("n"), 0);
    }

    #[test]
    fn dropping_the_renderer_unsubscribes() {
        let (renderer, ctx) = setup(r#"<p id="a" tal:content="n"></p>"#, Object::new().with("n", 1));
        renderer.render_by_id("a", &Value::Observable(ctx.clone())).unwrap();
        assert_eq!(ctx.observer_count("n"), 1);
        let weak = renderer.downgrade();
        drop(renderer);
        assert!(weak.upgrade().is_none());
        assert_eq!(ctx.observer_count("n"), 0);
    }
}
