#![forbid(unsafe_code)]

//! `content` and `replace`.
//!
//! | Directive | `text` | `structure` |
//! |---|---|---|
//! | `content` | element text | element inner HTML |
//! | `replace` | anchor text node | parsed fragment after the anchor |
//!
//! `replace` swaps the element for an empty text anchor that owns the
//! binding; structure updates remove the nodes inserted by the previous
//! update before inserting the new fragment.

use std::cell::RefCell;
use std::rc::Rc;

use tal_dom::NodeId;

use crate::error::{Result, TalError};
use crate::parser::Renderer;
use crate::statements::{self, Apply, Directives, TextMode};
use crate::value::Value;

pub(crate) fn apply_content(
    renderer: &Renderer,
    el: NodeId,
    mode: TextMode,
    expression: &str,
    context: &Value,
) -> Result<()> {
    let resolved = statements::resolve(Directives::CONTENT, expression, context)?;
    let update: Apply = Rc::new(move |renderer, value| {
        let doc = renderer.document();
        if !doc.is_alive(el) {
            return;
        }
        renderer.release_children(el);
        let text = value.to_string();
        match mode {
            TextMode::Text => doc.set_text_content(el, &text),
            TextMode::Structure => doc.set_inner_html(el, &text),
        }
    });
    let scope = statements::bind(renderer, &resolved, update)?;
    renderer.attach(el, scope);
    Ok(())
}

pub(crate) fn apply_replace(
    renderer: &Renderer,
    el: NodeId,
    mode: TextMode,
    expression: &str,
    context: &Value,
) -> Result<()> {
    let resolved = statements::resolve(Directives::REPLACE, expression, context)?;
    let doc = renderer.document();
    let anchor = doc.create_text("");
    if !doc.replace_with(el, &[anchor]) {
        doc.dispose(anchor);
        return Err(TalError::unsupported("replace on an element without a parent"));
    }
    renderer.remove_node(el);

    let inserted: RefCell<Vec<NodeId>> = RefCell::new(Vec::new());
    let update: Apply = Rc::new(move |renderer, value| {
        let doc = renderer.document();
        if !doc.is_alive(anchor) {
            return;
        }
        let previous = inserted.take();
        for node in previous {
            renderer.remove_node(node);
        }
        let text = value.to_string();
        match mode {
            TextMode::Text => doc.set_text_content(anchor, &text),
            TextMode::Structure => {
                let fragment = doc.parse_fragment(&text);
                let nodes = doc.children(fragment);
                doc.after(anchor, &[fragment]);
                doc.dispose(fragment);
                *inserted.borrow_mut() = nodes;
            }
        }
    });
    let scope = statements::bind(renderer, &resolved, update)?;
    renderer.attach(anchor, scope);
    Ok(())
}
