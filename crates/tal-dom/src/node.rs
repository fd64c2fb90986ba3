#![forbid(unsafe_code)]

//! Node handles and node payloads stored in the [`Document`](crate::Document) arena.
//!
//! A [`NodeId`] is a generational index: the slot index plus the generation
//! the slot had when the node was allocated. Freeing a node bumps the slot
//! generation, so every handle to the freed node goes stale and lookups
//! through it return `None` instead of aliasing whatever reuses the slot.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::event::Event;

/// Generational handle to a node in a [`Document`](crate::Document).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

/// Callback registered with [`Document::add_event_listener`](crate::Document::add_event_listener).
pub type Listener = Rc<dyn Fn(&Event)>;

/// Callback registered with [`Document::observe_property`](crate::Document::observe_property).
/// Receives the property's new value.
pub type PropertyObserver = Rc<dyn Fn(&Property)>;

/// Live element property, as opposed to its serialized attribute.
///
/// Form controls keep their current state in properties (`value`, `checked`)
/// that diverge from the markup once the user interacts with them.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Text(String),
    Bool(bool),
}

impl Property {
    /// Text form of the property (`"true"`/`"false"` for booleans).
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Bool(flag) => flag.to_string(),
        }
    }

    /// Boolean form of the property (non-empty text is `true`).
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Text(text) => !text.is_empty(),
            Self::Bool(flag) => *flag,
        }
    }
}

/// Attributes whose live property is boolean and reflects attribute presence.
pub(crate) const BOOLEAN_PROPERTIES: &[&str] = &[
    "checked", "disabled", "hidden", "multiple", "open", "readonly", "required", "selected",
];

/// Elements that never have children or a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose body is raw text up to the matching close tag.
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

#[must_use]
pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Element payload.
#[derive(Clone, Debug, Default)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    /// Attributes in source order.
    pub(crate) attrs: SmallVec<[(String, String); 4]>,
    pub(crate) props: AHashMap<String, Property>,
    /// Inert content fragment of a `<template>` element.
    pub(crate) content: Option<NodeId>,
}

impl ElementData {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attrs.iter_mut().find(|(key, _)| key == name) {
            slot.1.clear();
            slot.1.push_str(value);
        } else {
            self.attrs.push((name.to_owned(), value.to_owned()));
        }
    }

    pub(crate) fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }
}

/// Kind-specific node payload.
#[derive(Clone, Debug)]
pub(crate) enum NodeData {
    Element(ElementData),
    Text(String),
    Fragment,
}

/// One arena entry: payload plus tree links and listeners.
pub(crate) struct NodeEntry {
    pub(crate) data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) listeners: SmallVec<[(Box<str>, Listener); 1]>,
    pub(crate) observers: Vec<(Box<str>, PropertyObserver)>,
}

impl NodeEntry {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: SmallVec::new(),
            listeners: SmallVec::new(),
            observers: Vec::new(),
        }
    }

    pub(crate) fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// Public classification of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Fragment,
}
