#![forbid(unsafe_code)]

//! Synthetic DOM events.

use crate::node::NodeId;

/// An event delivered to listeners by [`Document::dispatch_event`](crate::Document::dispatch_event).
///
/// Events are delivered to the target's own listeners only; there is no
/// capture or bubble phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    kind: String,
    target: Option<NodeId>,
    new_state: Option<String>,
}

impl Event {
    /// Create an event of the given type (`"change"`, `"input"`, `"click"`, ...).
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            new_state: None,
        }
    }

    /// Attach the `newState` payload carried by `toggle` events.
    #[must_use]
    pub fn with_new_state(mut self, state: impl Into<String>) -> Self {
        self.new_state = Some(state.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Node the event was dispatched to; `None` until dispatched.
    #[must_use]
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    #[must_use]
    pub fn new_state(&self) -> Option<&str> {
        self.new_state.as_deref()
    }

    pub(crate) fn retarget(&mut self, target: NodeId) {
        self.target = Some(target);
    }
}
