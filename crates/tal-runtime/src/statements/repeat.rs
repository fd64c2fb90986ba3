#![forbid(unsafe_code)]

//! `repeat`: render one clone of the element per array item and keep the
//! clones in step with array edits.
//!
//! # Layout
//!
//! ```text
//! start | item 0 nodes, marker 0 | item 1 nodes, marker 1 | ... | end
//! ```
//!
//! Every item is followed by an empty text marker, so an item whose root
//! was replaced or unwrapped by its own directives still occupies exactly
//! the nodes between the previous boundary and its marker.
//!
//! # Invariants
//!
//! 1. `markers.len()` equals the number of rendered items, and item `i` is
//!    rendered from the array element at `i` (out-of-range `set` excepted:
//!    it appends).
//! 2. The initial fill and every incremental edit go through the same
//!    [`List::insert_at`] / [`List::remove_at`] pair.
//! 3. Rendered items that an edit does not touch keep their nodes.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tal_dom::{NodeId, WeakDocument};

use crate::error::{Result, TalError};
use crate::parser::Renderer;
use crate::reactive::{BindingScope, Change, Observable, ObservableKind, callback, wrap_array, wrap_object};
use crate::statements::{self, Apply, Directives};
use crate::value::{Object, Value};

/// Array notifications a list mirrors.
const EDITS: [&str; 8] = ["push", "unshift", "splice", "shift", "pop", "clear", "set", "length"];

struct List {
    this: Weak<List>,
    template: NodeId,
    name: String,
    context: Value,
    start: NodeId,
    end: NodeId,
    markers: RefCell<Vec<NodeId>>,
    array: RefCell<Option<Observable>>,
    edits: RefCell<BindingScope>,
    document: WeakDocument,
}

impl List {
    fn len(&self) -> usize {
        self.markers.borrow().len()
    }

    /// Scope for one item: `{name: item}` chained to the outer context, or
    /// the item itself for `repeat="context items"`.
    fn item_context(&self, item: &Value) -> Value {
        if self.name == "context" {
            if let Value::Observable(obs) = item {
                if obs.kind() != ObservableKind::Primitive {
                    return item.clone();
                }
            }
        }
        let scope = Value::from(Object::new().with(&self.name, item.clone()));
        match wrap_object(&scope, self.context.as_observable()) {
            Ok(obs) => Value::Observable(obs),
            Err(err) => {
                tracing::error!(message = "repeat.scope.failed", error = %err);
                Value::Undefined
            }
        }
    }

    fn insert_at(&self, renderer: &Renderer, pos: usize, item: &Value) {
        let doc = renderer.document();
        let Some(clone) = doc.clone_node(self.template, true) else {
            return;
        };
        let marker = doc.create_text("");
        let (pos, boundary) = {
            let markers = self.markers.borrow();
            let pos = pos.min(markers.len());
            let boundary = if pos == 0 { self.start } else { markers[pos - 1] };
            (pos, boundary)
        };
        if !doc.after(boundary, &[clone, marker]) {
            doc.dispose(clone);
            doc.dispose(marker);
            return;
        }
        self.markers.borrow_mut().insert(pos, marker);
        tracing::trace!(message = "repeat.insert", pos, node = ?clone);
        let context = self.item_context(item);
        renderer.parse(clone, &context);
    }

    fn remove_at(&self, renderer: &Renderer, pos: usize) {
        let (boundary, marker) = {
            let mut markers = self.markers.borrow_mut();
            if pos >= markers.len() {
                return;
            }
            let boundary = if pos == 0 { self.start } else { markers[pos - 1] };
            (boundary, markers.remove(pos))
        };
        tracing::trace!(message = "repeat.remove", pos);
        self.remove_between(renderer, boundary, marker);
        renderer.remove_node(marker);
    }

    /// Remove the siblings strictly between `from` and `to`.
    fn remove_between(&self, renderer: &Renderer, from: NodeId, to: NodeId) {
        let doc = renderer.document();
        let mut next = doc.next_sibling(from);
        while let Some(node) = next {
            if node == to {
                break;
            }
            next = doc.next_sibling(node);
            renderer.remove_node(node);
        }
    }

    fn clear(&self, renderer: &Renderer) {
        let markers = std::mem::take(&mut *self.markers.borrow_mut());
        if !markers.is_empty() {
            tracing::trace!(message = "repeat.clear", items = markers.len());
        }
        self.remove_between(renderer, self.start, self.end);
    }

    /// Render `value` from scratch and start mirroring its edits.
    fn render(&self, renderer: &Renderer, value: &Value) {
        self.clear(renderer);
        let previous = std::mem::take(&mut *self.edits.borrow_mut());
        drop(previous);
        let old = self.array.borrow_mut().take();
        drop(old);

        let array = match value {
            Value::Undefined | Value::Null => {
                tracing::debug!(message = "repeat.empty", anchor = ?self.start);
                return;
            }
            other => match wrap_array(other, self.context.as_observable()) {
                Ok(array) => array,
                Err(err) => {
                    tracing::warn!(
                        message = "repeat.not_array",
                        value = other.type_name(),
                        error = %err
                    );
                    return;
                }
            },
        };

        let this = self.this.clone();
        let weak = renderer.downgrade();
        let handler = callback(move |change, _| {
            let (Some(list), Some(renderer)) = (this.upgrade(), weak.upgrade()) else {
                return;
            };
            list.mirror(&renderer, change);
        });
        let mut edits = BindingScope::new();
        for edit in EDITS {
            edits.subscribe_callback(&array, edit, &handler);
        }
        *self.edits.borrow_mut() = edits;
        *self.array.borrow_mut() = Some(array.clone());

        let items = array.array_items().unwrap_or_default();
        tracing::debug!(message = "repeat.render", items = items.len());
        for (pos, item) in items.iter().enumerate() {
            self.insert_at(renderer, pos, item);
        }
    }

    /// Translate one array notification into the matching DOM edit.
    fn mirror(&self, renderer: &Renderer, change: &Change) {
        match change {
            Change::Push(items) => {
                let len = self.len();
                for (offset, item) in items.iter().enumerate() {
                    self.insert_at(renderer, len + offset, item);
                }
            }
            Change::Unshift(items) => {
                for item in items.iter().rev() {
                    self.insert_at(renderer, 0, item);
                }
            }
            Change::Splice {
                start,
                delete_count,
                items,
            } => {
                for _ in 0..*delete_count {
                    self.remove_at(renderer, *start);
                }
                for (offset, item) in items.iter().enumerate() {
                    self.insert_at(renderer, start + offset, item);
                }
            }
            Change::Shift(_) => self.remove_at(renderer, 0),
            Change::Pop(_) => {
                if let Some(last) = self.len().checked_sub(1) {
                    self.remove_at(renderer, last);
                }
            }
            Change::Clear => self.clear(renderer),
            Change::Set { index, value } => {
                if *index < self.len() {
                    self.remove_at(renderer, *index);
                    self.insert_at(renderer, *index, value);
                } else {
                    let len = self.len();
                    self.insert_at(renderer, len, value);
                }
            }
            Change::Length(len) => {
                while self.len() > *len {
                    let last = self.len() - 1;
                    self.remove_at(renderer, last);
                }
            }
            Change::Value(_) => {}
        }
    }
}

impl Drop for List {
    fn drop(&mut self) {
        if let Some(doc) = self.document.upgrade() {
            doc.dispose(self.template);
        }
    }
}

pub(crate) fn apply(
    renderer: &Renderer,
    el: NodeId,
    name: &str,
    expression: &str,
    context: &Value,
) -> Result<()> {
    let resolved = statements::resolve(Directives::REPEAT, expression, context)?;
    if resolved.is_unresolved() {
        renderer.remove_node(el);
        return Ok(());
    }

    let doc = renderer.document();
    let start = doc.create_text("");
    let end = doc.create_text("");
    if !doc.replace_with(el, &[start, end]) {
        doc.dispose(start);
        doc.dispose(end);
        return Err(TalError::unsupported("repeat on an element without a parent"));
    }

    let list = Rc::new_cyclic(|this| List {
        this: this.clone(),
        template: el,
        name: name.to_owned(),
        context: context.clone(),
        start,
        end,
        markers: RefCell::new(Vec::new()),
        array: RefCell::new(None),
        edits: RefCell::new(BindingScope::new()),
        document: doc.downgrade(),
    });
    let state = Rc::downgrade(&list);
    let update: Apply = Rc::new(move |renderer, value| {
        if let Some(list) = state.upgrade() {
            list.render(renderer, value);
        }
    });
    let mut scope = statements::bind(renderer, &resolved, update)?;
    scope.retain(list);
    renderer.attach(start, scope);
    Ok(())
}
