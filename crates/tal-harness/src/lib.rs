#![forbid(unsafe_code)]

//! Test harness for TAL templates.
//!
//! [`Fixture`] renders an HTML body against a JSON context and offers the
//! inspection and event helpers the integration suites share.
//! [`ArrayEdit`] drives property tests of list rendering against a plain
//! `Vec` model.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tal_harness::Fixture;
//!
//! let fx = Fixture::new(r#"<p tal:content="name"></p>"#, json!({"name": "Ann"})).unwrap();
//! assert_eq!(fx.html(), "<p>Ann</p>");
//! fx.set("name", json!("Bob")).unwrap();
//! assert_eq!(fx.html(), "<p>Bob</p>");
//! ```

use proptest::prelude::*;
use tal::prelude::*;
use tal::runtime::Result;

/// A rendered document body and its context.
#[derive(Debug)]
pub struct Fixture {
    document: Document,
    renderer: Renderer,
    context: Observable,
}

impl Fixture {
    /// Render `body` (markup placed inside `<body>`) against `data`.
    pub fn new(body: &str, data: serde_json::Value) -> Result<Self> {
        Self::with_config(body, data, TalConfig::default())
    }

    pub fn with_config(body: &str, data: serde_json::Value, config: TalConfig) -> Result<Self> {
        let document = Document::from_html(body);
        let renderer = Renderer::with_config(document.clone(), config);
        let context = wrap_as_observable(Value::from(data), None);
        let context = renderer.render(document.body(), &context)?;
        tracing::debug!(message = "fixture.rendered", bindings = renderer.binding_count());
        Ok(Self {
            document,
            renderer,
            context,
        })
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    #[must_use]
    pub fn context(&self) -> &Observable {
        &self.context
    }

    /// Serialized body content.
    #[must_use]
    pub fn html(&self) -> String {
        self.document.inner_html(self.document.body())
    }

    /// The observable holding the last segment of `path` (`a/b/c` gives the
    /// wrapper of `a/b`) and that segment.
    fn locate<'p>(&self, path: &'p str) -> Option<(Observable, &'p str)> {
        let mut segments: Vec<&str> = path.split(['/', '.']).collect();
        let last = segments.pop()?;
        let mut current = self.context.clone();
        for segment in segments {
            current = current.get(segment).as_observable()?.clone();
        }
        Some((current, last))
    }

    /// Value at `path`, `undefined` when a segment is missing.
    #[must_use]
    pub fn get(&self, path: &str) -> Value {
        self.locate(path)
            .map_or(Value::Undefined, |(owner, property)| owner.get(property))
    }

    /// The observable at `path`, if the value there is one.
    #[must_use]
    pub fn observable(&self, path: &str) -> Option<Observable> {
        self.get(path).as_observable().cloned()
    }

    /// Assign `value` at `path`; returns whether a write happened.
    pub fn set(&self, path: &str, value: serde_json::Value) -> Result<bool> {
        match self.locate(path) {
            Some((owner, property)) => owner.set(property, Value::from(value)),
            None => Ok(false),
        }
    }

    /// Elements under the body with tag `tag`, in document order.
    #[must_use]
    pub fn elements(&self, tag: &str) -> Vec<NodeId> {
        self.document
            .descendants(self.document.body())
            .into_iter()
            .filter(|node| self.document.tag_name(*node).as_deref() == Some(tag))
            .collect()
    }

    /// Text content of every `tag` element.
    #[must_use]
    pub fn texts(&self, tag: &str) -> Vec<String> {
        self.elements(tag)
            .into_iter()
            .map(|node| self.document.text_content(node))
            .collect()
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.document.element_by_id(id)
    }

    /// Set the `value` property and fire `change`, like a committed edit.
    pub fn change_value(&self, node: NodeId, text: &str) -> usize {
        self.document
            .set_property(node, "value", Property::Text(text.to_owned()));
        self.document.dispatch_event(node, Event::new("change"))
    }

    /// Set the `checked` property and fire `change`.
    pub fn change_checked(&self, node: NodeId, checked: bool) -> usize {
        self.document
            .set_property(node, "checked", Property::Bool(checked));
        self.document.dispatch_event(node, Event::new("change"))
    }

    /// Set the `value` property and fire `input`, like a keystroke.
    pub fn input(&self, node: NodeId, text: &str) -> usize {
        self.document
            .set_property(node, "value", Property::Text(text.to_owned()));
        self.document.dispatch_event(node, Event::new("input"))
    }

    pub fn fire(&self, node: NodeId, event: Event) -> usize {
        self.document.dispatch_event(node, event)
    }
}

// ---------------------------------------------------------------------------
// Array edits
// ---------------------------------------------------------------------------

/// One structural edit of a number array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayEdit {
    Push(Vec<i32>),
    Unshift(Vec<i32>),
    Splice {
        start: usize,
        delete_count: usize,
        items: Vec<i32>,
    },
    Shift,
    Pop,
    Clear,
    Set { index: usize, value: i32 },
    Truncate(usize),
}

fn numbers(items: &[i32]) -> impl Iterator<Item = Value> + '_ {
    items.iter().map(|n| Value::from(f64::from(*n)))
}

impl ArrayEdit {
    /// Apply to an observable array.
    pub fn apply(&self, array: &Observable) -> Result<()> {
        match self {
            Self::Push(items) => array.push(numbers(items)).map(drop),
            Self::Unshift(items) => array.unshift(numbers(items)).map(drop),
            Self::Splice {
                start,
                delete_count,
                items,
            } => array
                .splice(
                    isize::try_from(*start).unwrap_or(isize::MAX),
                    *delete_count,
                    numbers(items),
                )
                .map(drop),
            Self::Shift => array.shift().map(drop),
            Self::Pop => array.pop().map(drop),
            Self::Clear => array.clear(),
            Self::Set { index, value } => array.set_index(*index, Value::from(f64::from(*value))),
            Self::Truncate(len) => {
                let current = array.array_len().unwrap_or(0);
                array.set_length((*len).min(current))
            }
        }
    }

    /// Apply to the model. In-range edits only, so the model stays dense
    /// like the rendered list.
    pub fn apply_model(&self, model: &mut Vec<i32>) {
        match self {
            Self::Push(items) => model.extend(items),
            Self::Unshift(items) => {
                model.splice(0..0, items.iter().copied());
            }
            Self::Splice {
                start,
                delete_count,
                items,
            } => {
                let start = (*start).min(model.len());
                let end = start + (*delete_count).min(model.len() - start);
                model.splice(start..end, items.iter().copied());
            }
            Self::Shift => {
                if !model.is_empty() {
                    model.remove(0);
                }
            }
            Self::Pop => {
                model.pop();
            }
            Self::Clear => model.clear(),
            Self::Set { index, value } => {
                if *index < model.len() {
                    model[*index] = *value;
                }
            }
            Self::Truncate(len) => model.truncate(*len),
        }
    }

    /// Clamp indices to `len` so the edit never extends the array.
    #[must_use]
    pub fn clamp(self, len: usize) -> Self {
        match self {
            Self::Set { index, value } if len > 0 => Self::Set {
                index: index % len,
                value,
            },
            Self::Set { .. } => Self::Push(Vec::new()),
            other => other,
        }
    }
}

fn small_items() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-50i32..50, 0..4)
}

/// Strategy over [`ArrayEdit`]s.
pub fn array_edit() -> impl Strategy<Value = ArrayEdit> {
    prop_oneof![
        small_items().prop_map(ArrayEdit::Push),
        small_items().prop_map(ArrayEdit::Unshift),
        (0usize..8, 0usize..4, small_items()).prop_map(|(start, delete_count, items)| {
            ArrayEdit::Splice {
                start,
                delete_count,
                items,
            }
        }),
        Just(ArrayEdit::Shift),
        Just(ArrayEdit::Pop),
        Just(ArrayEdit::Clear),
        (0usize..8, -50i32..50).prop_map(|(index, value)| ArrayEdit::Set { index, value }),
        (0usize..8).prop_map(ArrayEdit::Truncate),
    ]
}
