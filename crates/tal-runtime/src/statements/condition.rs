#![forbid(unsafe_code)]

//! `condition` and `with`: mount a clone of the element while a value is
//! truthy.
//!
//! Applying either directive turns the element into a detached template and
//! puts two empty text anchors where it was. Each mount clones the template,
//! inserts the clone before the end anchor and parses it; each unmount
//! removes (and releases) everything between the anchors. `with` parses the
//! clone against the value itself, `condition` against the outer context.
//!
//! Every re-evaluation unmounts first, so a truthy-to-truthy change still
//! mounts a fresh clone.

use std::cell::Cell;
use std::rc::Rc;

use tal_dom::{NodeId, WeakDocument};

use crate::error::{Result, TalError};
use crate::parser::Renderer;
use crate::reactive::wrap;
use crate::statements::{self, Apply, Directives};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scoping {
    Condition,
    With,
}

impl Scoping {
    fn directive(self) -> Directives {
        match self {
            Self::Condition => Directives::CONDITION,
            Self::With => Directives::WITH,
        }
    }
}

/// Mount state, owned by the binding scope of the start anchor.
struct Mount {
    scoping: Scoping,
    template: NodeId,
    start: NodeId,
    end: NodeId,
    context: Value,
    mounted: Cell<bool>,
    document: WeakDocument,
}

impl Mount {
    fn unmount(&self, renderer: &Renderer) {
        let doc = renderer.document();
        if !doc.is_alive(self.start) {
            return;
        }
        let mut next = doc.next_sibling(self.start);
        while let Some(node) = next {
            if node == self.end {
                break;
            }
            next = doc.next_sibling(node);
            renderer.remove_node(node);
        }
        self.mounted.set(false);
    }

    fn update(&self, renderer: &Renderer, value: &Value) {
        let was_mounted = self.mounted.get();
        self.unmount(renderer);
        if !value.truthy() {
            if was_mounted {
                tracing::debug!(message = "condition.unmounted", anchor = ?self.start);
            }
            return;
        }
        let doc = renderer.document();
        if !doc.is_alive(self.end) {
            return;
        }
        let context = match self.scoping {
            Scoping::Condition => self.context.clone(),
            Scoping::With => wrap(value.clone(), self.context.as_observable()),
        };
        let Some(clone) = doc.clone_node(self.template, true) else {
            return;
        };
        doc.before(self.end, &[clone]);
        self.mounted.set(true);
        tracing::debug!(message = "condition.mounted", anchor = ?self.start, node = ?clone);
        renderer.parse(clone, &context);
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        if let Some(doc) = self.document.upgrade() {
            doc.dispose(self.template);
        }
    }
}

pub(crate) fn apply(
    renderer: &Renderer,
    el: NodeId,
    scoping: Scoping,
    expression: &str,
    context: &Value,
) -> Result<()> {
    let directive = scoping.directive();
    let resolved = statements::resolve(directive, expression, context)?;

    let doc = renderer.document();
    let start = doc.create_text("");
    let end = doc.create_text("");
    if !doc.replace_with(el, &[start, end]) {
        doc.dispose(start);
        doc.dispose(end);
        return Err(TalError::unsupported(format!(
            "{} on an element without a parent",
            directive.name()
        )));
    }

    let mount = Rc::new(Mount {
        scoping,
        template: el,
        start,
        end,
        context: context.clone(),
        mounted: Cell::new(false),
        document: doc.downgrade(),
    });
    let state = Rc::downgrade(&mount);
    let update: Apply = Rc::new(move |renderer, value| {
        if let Some(mount) = state.upgrade() {
            mount.update(renderer, value);
        }
    });
    let mut scope = statements::bind(renderer, &resolved, update)?;
    scope.retain(mount);
    renderer.attach(start, scope);
    Ok(())
}
