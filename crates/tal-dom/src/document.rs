#![forbid(unsafe_code)]

//! Arena-backed document tree.
//!
//! [`Document`] is a cheap, clonable handle (`Rc<RefCell<..>>`) over a
//! generational node arena. Every operation borrows the arena only for its
//! own duration; listeners and freed node payloads are always released after
//! the borrow ends, so callbacks may freely re-enter the document.
//!
//! # Invariants
//!
//! 1. A node has at most one parent and appears exactly once in that
//!    parent's child list.
//! 2. Fragments are never inserted: inserting a fragment moves its children.
//! 3. Operations on a stale [`NodeId`] are no-ops (or return `None`/`false`).
//! 4. A node is never inserted into its own subtree.
//! 5. `<template>` children live in a separate inert content fragment that
//!    tree traversal does not enter.
//!
//! # Failure Modes
//!
//! - Inserting an ancestor into its descendant: rejected, logged at `warn`.
//! - Stale handles: silently ignored; use [`Document::is_alive`] to check.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::event::Event;
use crate::html;
use crate::node::{
    BOOLEAN_PROPERTIES, ElementData, Listener, NodeData, NodeEntry, NodeId, NodeKind, Property,
    PropertyObserver,
};

// ---------------------------------------------------------------------------
// Tree: the arena
// ---------------------------------------------------------------------------

struct Slot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// Generational arena of nodes with tree links.
pub(crate) struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Tree {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(NodeEntry::new(data));
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(NodeEntry::new(data)),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    pub(crate) fn alloc_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let content = (tag == "template").then(|| self.alloc(NodeData::Fragment));
        self.alloc(NodeData::Element(ElementData {
            tag,
            content,
            ..ElementData::default()
        }))
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&NodeEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn is_alive(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Node that receives children appended to `id` (template content or `id`).
    pub(crate) fn container(&self, id: NodeId) -> NodeId {
        self.get(id)
            .and_then(NodeEntry::element)
            .and_then(|el| el.content)
            .unwrap_or(id)
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.is_alive(ancestor) {
            return false;
        }
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).and_then(|entry| entry.parent);
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.get_mut(id).and_then(|entry| entry.parent.take()) else {
            return;
        };
        if let Some(entry) = self.get_mut(parent) {
            entry.children.retain(|child| *child != id);
        }
    }

    /// Insert `child` into `parent` at `index`; returns how many nodes were
    /// inserted (a fragment contributes all of its children).
    pub(crate) fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) -> usize {
        if !self.is_alive(parent) || !self.is_alive(child) {
            return 0;
        }
        if self.contains(child, parent) {
            tracing::warn!(
                message = "dom.insert.cycle",
                parent = ?parent,
                child = ?child
            );
            return 0;
        }
        let is_fragment = matches!(
            self.get(child).map(|entry| &entry.data),
            Some(NodeData::Fragment)
        );
        let moved: SmallVec<[NodeId; 4]> = if is_fragment {
            let Some(entry) = self.get_mut(child) else {
                return 0;
            };
            std::mem::take(&mut entry.children)
        } else {
            self.detach(child);
            SmallVec::from_slice(&[child])
        };
        let Some(entry) = self.get_mut(parent) else {
            return 0;
        };
        let at = index.min(entry.children.len());
        entry.children.insert_many(at, moved.iter().copied());
        for id in &moved {
            if let Some(entry) = self.get_mut(*id) {
                entry.parent = Some(parent);
            }
        }
        moved.len()
    }

    pub(crate) fn append(&mut self, parent: NodeId, child: NodeId) -> usize {
        let len = self.get(parent).map_or(0, |entry| entry.children.len());
        self.insert(parent, len, child)
    }

    /// Detach `id` and free its subtree (template content included).
    ///
    /// Returns the freed payloads so the caller can drop them once the arena
    /// borrow has ended.
    #[must_use]
    pub(crate) fn free(&mut self, id: NodeId) -> Vec<NodeEntry> {
        if !self.is_alive(id) {
            return Vec::new();
        }
        self.detach(id);
        let mut garbage = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(slot) = self.slots.get_mut(next.index as usize) else {
                continue;
            };
            if slot.generation != next.generation {
                continue;
            }
            let Some(entry) = slot.entry.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(next.index);
            self.live -= 1;
            stack.extend(entry.children.iter().copied());
            if let Some(content) = entry.element().and_then(|el| el.content) {
                stack.push(content);
            }
            garbage.push(entry);
        }
        garbage
    }

    /// Free every child of `id`, keeping `id` itself.
    #[must_use]
    pub(crate) fn free_children(&mut self, id: NodeId) -> Vec<NodeEntry> {
        let children = self
            .get(id)
            .map(|entry| entry.children.clone())
            .unwrap_or_default();
        children.into_iter().flat_map(|child| self.free(child)).collect()
    }

    fn clone_subtree(&mut self, id: NodeId, deep: bool) -> Option<NodeId> {
        let (data, children) = {
            let entry = self.get(id)?;
            (entry.data.clone(), entry.children.clone())
        };
        let copy = match data {
            NodeData::Element(mut el) => {
                el.props.clear();
                let content = el.content.take();
                let copy = self.alloc(NodeData::Element(el));
                let fresh = match content {
                    Some(content) if deep => self.clone_subtree(content, true),
                    Some(_) => Some(self.alloc(NodeData::Fragment)),
                    None => None,
                };
                if let Some(el) = self.get_mut(copy).and_then(NodeEntry::element_mut) {
                    el.content = fresh;
                }
                copy
            }
            other => self.alloc(other),
        };
        if deep {
            for child in children {
                if let Some(child_copy) = self.clone_subtree(child, true) {
                    self.append(copy, child_copy);
                }
            }
        }
        Some(copy)
    }

    /// Pre-order traversal of `root` and its descendants.
    pub(crate) fn walk(&self, root: NodeId, mut visit: impl FnMut(NodeId, &NodeEntry)) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(entry) = self.get(id) else {
                continue;
            };
            visit(id, entry);
            stack.extend(entry.children.iter().rev().copied());
        }
    }

    fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.walk(id, |_, entry| {
            if let NodeData::Text(text) = &entry.data {
                out.push_str(text);
            }
        });
        out
    }
}

// ---------------------------------------------------------------------------
// Document: public handle
// ---------------------------------------------------------------------------

/// Shared handle to an in-memory document.
///
/// Cloning a `Document` creates another handle to the **same** tree.
#[derive(Clone)]
pub struct Document {
    tree: Rc<RefCell<Tree>>,
    body: NodeId,
}

impl Document {
    /// Create an empty document with a `<body>` element.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Tree::new();
        let body = tree.alloc_element("body");
        Self {
            tree: Rc::new(RefCell::new(tree)),
            body,
        }
    }

    /// Create a document whose body holds the parsed `html`.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let doc = Self::new();
        doc.set_inner_html(doc.body, html);
        doc
    }

    /// Whether two handles refer to the same document.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }

    /// Non-owning handle, for listeners and state stored inside the tree.
    #[must_use]
    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument {
            tree: Rc::downgrade(&self.tree),
            body: self.body,
        }
    }

    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.tree.borrow().is_alive(id)
    }

    /// Number of live nodes in the arena, detached ones included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.borrow().live
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.tree.borrow().get(id).map(|entry| match entry.data {
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Fragment => NodeKind::Fragment,
        })
    }

    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.kind(id) == Some(NodeKind::Element)
    }

    /// Lowercase tag name of an element.
    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        self.tree
            .borrow()
            .get(id)
            .and_then(NodeEntry::element)
            .map(|el| el.tag.clone())
    }

    /// Inert content fragment of a `<template>` element.
    #[must_use]
    pub fn template_content(&self, id: NodeId) -> Option<NodeId> {
        self.tree
            .borrow()
            .get(id)
            .and_then(NodeEntry::element)
            .and_then(|el| el.content)
    }

    // -- creation -----------------------------------------------------------

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.borrow_mut().alloc_element(tag)
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree.borrow_mut().alloc(NodeData::Text(text.to_owned()))
    }

    pub fn create_fragment(&self) -> NodeId {
        self.tree.borrow_mut().alloc(NodeData::Fragment)
    }

    /// Parse `html` into a new detached fragment.
    pub fn parse_fragment(&self, html: &str) -> NodeId {
        html::parse_fragment(&mut self.tree.borrow_mut(), html)
    }

    /// Copy a node. Attributes are copied; live properties and listeners
    /// are not. `deep` also copies descendants and template content.
    pub fn clone_node(&self, id: NodeId, deep: bool) -> Option<NodeId> {
        self.tree.borrow_mut().clone_subtree(id, deep)
    }

    // -- navigation ---------------------------------------------------------

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().get(id).and_then(|entry| entry.parent)
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .get(id)
            .map(|entry| entry.children.to_vec())
            .unwrap_or_default()
    }

    /// Element children only.
    #[must_use]
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        let tree = self.tree.borrow();
        tree.get(id)
            .map(|entry| {
                entry
                    .children
                    .iter()
                    .copied()
                    .filter(|child| tree.get(*child).and_then(NodeEntry::element).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree
            .borrow()
            .get(id)
            .and_then(|entry| entry.children.first().copied())
    }

    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.sibling(id, 1)
    }

    #[must_use]
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.sibling(id, -1)
    }

    fn sibling(&self, id: NodeId, step: isize) -> Option<NodeId> {
        let tree = self.tree.borrow();
        let parent = tree.get(id)?.parent?;
        let siblings = &tree.get(parent)?.children;
        let pos = siblings.iter().position(|child| *child == id)?;
        let target = pos.checked_add_signed(step)?;
        siblings.get(target).copied()
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.borrow().contains(ancestor, node)
    }

    /// `root` and all of its descendants in document order.
    #[must_use]
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.tree.borrow().walk(root, |id, _| out.push(id));
        out
    }

    /// Descendant elements of `root` (excluding `root`) carrying at least
    /// one of `names`, in document order. The result is a static snapshot.
    #[must_use]
    pub fn query_attributes(&self, root: NodeId, names: &[&str]) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.tree.borrow().walk(root, |id, entry| {
            if id == root {
                return;
            }
            let matched = entry
                .element()
                .is_some_and(|el| el.attrs.iter().any(|(key, _)| names.contains(&key.as_str())));
            if matched {
                out.push(id);
            }
        });
        out
    }

    /// First element under `<body>` whose `id` attribute equals `id`.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let mut found = None;
        self.tree.borrow().walk(self.body, |node, entry| {
            if found.is_none() && entry.element().and_then(|el| el.attr("id")) == Some(id) {
                found = Some(node);
            }
        });
        found
    }

    // -- mutation -----------------------------------------------------------

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let mut tree = self.tree.borrow_mut();
        let parent = tree.container(parent);
        tree.append(parent, child) > 0
    }

    /// Insert `child` before `reference` (or append when `reference` is `None`).
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> bool {
        let mut tree = self.tree.borrow_mut();
        let parent = tree.container(parent);
        let index = match reference {
            Some(reference) => {
                let Some(pos) = tree
                    .get(parent)
                    .and_then(|entry| entry.children.iter().position(|c| *c == reference))
                else {
                    return false;
                };
                pos
            }
            None => tree.get(parent).map_or(0, |entry| entry.children.len()),
        };
        tree.insert(parent, index, child) > 0
    }

    /// Insert `nodes` immediately before `node` in its parent.
    pub fn before(&self, node: NodeId, nodes: &[NodeId]) -> bool {
        self.insert_relative(node, nodes, 0)
    }

    /// Insert `nodes` immediately after `node` in its parent.
    pub fn after(&self, node: NodeId, nodes: &[NodeId]) -> bool {
        self.insert_relative(node, nodes, 1)
    }

    fn insert_relative(&self, node: NodeId, nodes: &[NodeId], offset: usize) -> bool {
        let mut tree = self.tree.borrow_mut();
        let Some(parent) = tree.get(node).and_then(|entry| entry.parent) else {
            return false;
        };
        let Some(pos) = tree
            .get(parent)
            .and_then(|entry| entry.children.iter().position(|c| *c == node))
        else {
            return false;
        };
        let mut index = pos + offset;
        for child in nodes {
            index += tree.insert(parent, index, *child);
        }
        true
    }

    /// Replace `node` with `nodes`, detaching `node` (it is not freed).
    pub fn replace_with(&self, node: NodeId, nodes: &[NodeId]) -> bool {
        let mut tree = self.tree.borrow_mut();
        let Some(parent) = tree.get(node).and_then(|entry| entry.parent) else {
            return false;
        };
        let Some(pos) = tree
            .get(parent)
            .and_then(|entry| entry.children.iter().position(|c| *c == node))
        else {
            return false;
        };
        tree.detach(node);
        let mut index = pos;
        for child in nodes {
            index += tree.insert(parent, index, *child);
        }
        true
    }

    /// Detach `node` from its parent, keeping it alive.
    pub fn remove(&self, node: NodeId) {
        self.tree.borrow_mut().detach(node);
    }

    /// Detach `node` and free it with its whole subtree.
    pub fn dispose(&self, node: NodeId) {
        let garbage = self.tree.borrow_mut().free(node);
        drop(garbage);
    }

    // -- attributes & properties -------------------------------------------

    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.tree
            .borrow()
            .get(id)
            .and_then(NodeEntry::element)
            .and_then(|el| el.attr(name).map(str::to_owned))
    }

    #[must_use]
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.tree
            .borrow()
            .get(id)
            .and_then(NodeEntry::element)
            .is_some_and(|el| el.attr(name).is_some())
    }

    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.tree.borrow_mut().get_mut(id).and_then(NodeEntry::element_mut) {
            el.set_attr(name, value);
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.tree
            .borrow_mut()
            .get_mut(id)
            .and_then(NodeEntry::element_mut)
            .and_then(|el| el.remove_attr(name))
    }

    #[must_use]
    pub fn attribute_names(&self, id: NodeId) -> Vec<String> {
        self.tree
            .borrow()
            .get(id)
            .and_then(NodeEntry::element)
            .map(|el| el.attrs.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default()
    }

    /// Live property; falls back to the reflected attribute when the
    /// property was never written.
    #[must_use]
    pub fn property(&self, id: NodeId, name: &str) -> Option<Property> {
        let tree = self.tree.borrow();
        let el = tree.get(id).and_then(NodeEntry::element)?;
        if let Some(prop) = el.props.get(name) {
            return Some(prop.clone());
        }
        if BOOLEAN_PROPERTIES.contains(&name) {
            return Some(Property::Bool(el.attr(name).is_some()));
        }
        if name == "value" && matches!(el.tag.as_str(), "input" | "select" | "textarea") {
            return Some(Property::Text(el.attr(name).unwrap_or_default().to_owned()));
        }
        el.attr(name).map(|value| Property::Text(value.to_owned()))
    }

    /// Write a live property. Observers of `name` on `id` are called with
    /// the new value when it differs from the previous one.
    pub fn set_property(&self, id: NodeId, name: &str, value: Property) {
        let previous = self.property(id, name);
        let observers: SmallVec<[PropertyObserver; 1]> = {
            let mut tree = self.tree.borrow_mut();
            let Some(entry) = tree.get_mut(id) else {
                return;
            };
            let NodeData::Element(el) = &mut entry.data else {
                return;
            };
            el.props.insert(name.to_owned(), value.clone());
            if previous.as_ref() == Some(&value) {
                return;
            }
            entry
                .observers
                .iter()
                .filter(|(key, _)| &**key == name)
                .map(|(_, observer)| Rc::clone(observer))
                .collect()
        };
        if !observers.is_empty() {
            tracing::trace!(
                message = "dom.property.changed",
                node = ?id,
                property = name,
                observers = observers.len()
            );
        }
        for observer in &observers {
            observer(&value);
        }
    }

    /// Call `observer` after every value-changing
    /// [`set_property`](Self::set_property) of `name` on `id`. Observers live
    /// as long as the node and are not copied by [`clone_node`](Self::clone_node).
    pub fn observe_property(&self, id: NodeId, name: &str, observer: PropertyObserver) {
        if let Some(entry) = self.tree.borrow_mut().get_mut(id) {
            if entry.element().is_some() {
                entry.observers.push((name.into(), observer));
            }
        }
    }

    #[must_use]
    pub fn property_observer_count(&self, id: NodeId, name: &str) -> usize {
        self.tree.borrow().get(id).map_or(0, |entry| {
            entry
                .observers
                .iter()
                .filter(|(key, _)| &**key == name)
                .count()
        })
    }

    // -- text & markup ------------------------------------------------------

    /// Concatenated text of the node and its descendants.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        self.tree.borrow().text_content(id)
    }

    /// Set the data of a text node, or replace an element's children with a
    /// single text node (no node for empty text).
    pub fn set_text_content(&self, id: NodeId, text: &str) {
        let garbage = {
            let mut tree = self.tree.borrow_mut();
            match tree.get_mut(id).map(|entry| &mut entry.data) {
                Some(NodeData::Text(data)) => {
                    data.clear();
                    data.push_str(text);
                    Vec::new()
                }
                Some(_) => {
                    let garbage = tree.free_children(id);
                    if !text.is_empty() {
                        let node = tree.alloc(NodeData::Text(text.to_owned()));
                        tree.append(id, node);
                    }
                    garbage
                }
                None => Vec::new(),
            }
        };
        drop(garbage);
    }

    /// Replace the children (or template content) of `id` with parsed `html`.
    pub fn set_inner_html(&self, id: NodeId, html: &str) {
        let garbage = {
            let mut tree = self.tree.borrow_mut();
            if tree.get(id).and_then(NodeEntry::element).is_none() {
                return;
            }
            let target = tree.container(id);
            let mut garbage = tree.free_children(target);
            let fragment = html::parse_fragment(&mut tree, html);
            tree.append(target, fragment);
            garbage.extend(tree.free(fragment));
            garbage
        };
        drop(garbage);
    }

    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        html::write_children(&tree, tree.container(id), &mut out);
        out
    }

    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        html::write_node(&self.tree.borrow(), id, &mut out);
        out
    }

    // -- events -------------------------------------------------------------

    pub fn add_event_listener(&self, id: NodeId, kind: &str, listener: Listener) {
        if let Some(entry) = self.tree.borrow_mut().get_mut(id) {
            entry.listeners.push((kind.into(), listener));
        }
    }

    #[must_use]
    pub fn listener_count(&self, id: NodeId, kind: &str) -> usize {
        self.tree.borrow().get(id).map_or(0, |entry| {
            entry
                .listeners
                .iter()
                .filter(|(key, _)| &**key == kind)
                .count()
        })
    }

    /// Deliver `event` to the listeners `id` registered for its type, in
    /// registration order. Returns the number of listeners invoked.
    pub fn dispatch_event(&self, id: NodeId, mut event: Event) -> usize {
        let listeners: SmallVec<[Listener; 2]> = match self.tree.borrow().get(id) {
            Some(entry) => entry
                .listeners
                .iter()
                .filter(|(key, _)| &**key == event.kind())
                .map(|(_, listener)| Rc::clone(listener))
                .collect(),
            None => return 0,
        };
        event.retarget(id);
        tracing::trace!(
            message = "dom.event.dispatch",
            kind = event.kind(),
            node = ?id,
            listeners = listeners.len()
        );
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }
}

/// Weak counterpart of [`Document`].
#[derive(Clone)]
pub struct WeakDocument {
    tree: Weak<RefCell<Tree>>,
    body: NodeId,
}

impl WeakDocument {
    #[must_use]
    pub fn upgrade(&self) -> Option<Document> {
        self.tree.upgrade().map(|tree| Document {
            tree,
            body: self.body,
        })
    }
}

impl fmt::Debug for WeakDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDocument")
            .field("alive", &(self.tree.strong_count() > 0))
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("body", &self.body)
            .field("nodes", &self.node_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
