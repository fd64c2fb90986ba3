#![forbid(unsafe_code)]

//! Lenient HTML fragment parser and serializer.
//!
//! The parser accepts the markup templates are written in, not the full
//! HTML5 tree-construction algorithm:
//!
//! | Construct | Handling |
//! |---|---|
//! | start/end tags | names lowercased; unmatched end tags ignored |
//! | attributes | quoted, unquoted, or bare; first occurrence wins |
//! | void elements, `/>` | never pushed as open containers |
//! | `<template>` | children go to the inert content fragment |
//! | raw text (`script`, `style`, `textarea`, `title`) | body kept verbatim |
//! | comments, doctype, processing instructions | skipped |
//! | character references | named basics plus decimal/hex numeric |
//!
//! Unclosed elements are closed at end of input. Parsing never fails.

use std::fmt::Write as _;

use crate::document::Tree;
use crate::node::{NodeData, NodeId, RAW_TEXT_ELEMENTS, is_void};

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    /// Advance past the next occurrence of `needle` (or to the end).
    fn skip_past(&mut self, needle: &str) {
        match self.rest().find(needle) {
            Some(at) => self.pos += at + needle.len(),
            None => self.pos = self.src.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, mut keep: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&mut keep) {
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

fn starts_tag(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || matches!(ch, '/' | '!' | '?'))
}

/// Parse `html` into a new detached fragment node.
pub(crate) fn parse_fragment(tree: &mut Tree, html: &str) -> NodeId {
    let fragment = tree.alloc(NodeData::Fragment);
    // Open elements: (node, tag). The fragment sits at the bottom.
    let mut open: Vec<(NodeId, String)> = vec![(fragment, String::new())];
    let mut cur = Cursor { src: html, pos: 0 };

    while !cur.at_end() {
        let container = open.last().map_or(fragment, |(id, _)| tree.container(*id));
        if !starts_tag(cur.rest()) {
            let mut text = String::new();
            loop {
                text.push_str(cur.take_while(|ch| ch != '<'));
                if cur.at_end() || starts_tag(cur.rest()) {
                    break;
                }
                cur.bump();
                text.push('<');
            }
            let node = tree.alloc(NodeData::Text(decode_entities(&text)));
            tree.append(container, node);
        } else if cur.eat("<!--") {
            cur.skip_past("-->");
        } else if cur.eat("</") {
            let name = cur.take_while(|ch| !ch.is_whitespace() && ch != '>');
            let name = name.to_ascii_lowercase();
            cur.skip_past(">");
            match open.iter().rposition(|(_, tag)| *tag == name) {
                Some(depth) if depth > 0 => open.truncate(depth),
                _ => {}
            }
        } else if cur.rest().starts_with("<!") || cur.rest().starts_with("<?") {
            cur.skip_past(">");
        } else {
            cur.bump();
            let tag = cur
                .take_while(|ch| !ch.is_whitespace() && ch != '>' && ch != '/')
                .to_ascii_lowercase();
            let element = tree.alloc_element(&tag);
            let self_closing = parse_attributes(&mut cur, tree, element);
            tree.append(container, element);
            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing {
                let close = format!("</{tag}");
                let rest = cur.rest();
                let end = find_ascii_case_insensitive(rest, &close).unwrap_or(rest.len());
                let body = &rest[..end];
                if !body.is_empty() {
                    let text = if tag == "textarea" || tag == "title" {
                        decode_entities(body)
                    } else {
                        body.to_owned()
                    };
                    let node = tree.alloc(NodeData::Text(text));
                    tree.append(element, node);
                }
                cur.pos += end;
                cur.skip_past(">");
            } else if !self_closing && !is_void(&tag) {
                open.push((element, tag));
            }
        }
    }
    fragment
}

/// Parse attributes up to and including the closing `>`; returns whether
/// the tag was self-closing.
fn parse_attributes(cur: &mut Cursor<'_>, tree: &mut Tree, element: NodeId) -> bool {
    loop {
        cur.skip_whitespace();
        if cur.at_end() || cur.eat(">") {
            return false;
        }
        if cur.eat("/>") {
            return true;
        }
        if cur.peek() == Some('/') {
            cur.bump();
            continue;
        }
        let name = cur
            .take_while(|ch| !ch.is_whitespace() && !matches!(ch, '=' | '>' | '/'))
            .to_ascii_lowercase();
        if name.is_empty() {
            cur.bump();
            continue;
        }
        cur.skip_whitespace();
        let value = if cur.eat("=") {
            cur.skip_whitespace();
            match cur.peek() {
                Some(quote @ ('"' | '\'')) => {
                    cur.bump();
                    let raw = cur.take_while(|ch| ch != quote);
                    cur.bump();
                    decode_entities(raw)
                }
                _ => decode_entities(cur.take_while(|ch| !ch.is_whitespace() && ch != '>')),
            }
        } else {
            String::new()
        };
        if let Some(el) = tree.get_mut(element).and_then(|entry| entry.element_mut()) {
            if el.attr(&name).is_none() {
                el.attrs.push((name, value));
            }
        }
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Decode character references; unknown references are kept verbatim.
#[must_use]
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let name = &rest[1..end];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => name.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Escape text and attribute values alike; no-break spaces stay visible
/// as `&nbsp;`.
fn escape_into(out: &mut String, text: &str) {
    for (index, segment) in text.split('\u{a0}').enumerate() {
        if index > 0 {
            out.push_str("&nbsp;");
        }
        let _ = write!(out, "{}", v_htmlescape::escape(segment));
    }
}

pub(crate) fn write_children(tree: &Tree, id: NodeId, out: &mut String) {
    let Some(entry) = tree.get(id) else {
        return;
    };
    let raw = entry
        .element()
        .is_some_and(|el| matches!(el.tag.as_str(), "script" | "style"));
    for child in &entry.children {
        match tree.get(*child).map(|entry| &entry.data) {
            Some(NodeData::Text(text)) if raw => out.push_str(text),
            _ => write_node(tree, *child, out),
        }
    }
}

pub(crate) fn write_node(tree: &Tree, id: NodeId, out: &mut String) {
    let Some(entry) = tree.get(id) else {
        return;
    };
    match &entry.data {
        NodeData::Text(text) => escape_into(out, text),
        NodeData::Fragment => write_children(tree, id, out),
        NodeData::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(out, value);
                out.push('"');
            }
            out.push('>');
            if is_void(&el.tag) {
                return;
            }
            write_children(tree, el.content.unwrap_or(id), out);
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Document;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn round_trip(html: &str) -> String {
        let doc = Document::from_html(html);
        doc.inner_html(doc.body())
    }

    #[test]
    fn serializes_nested_markup() {
        let doc = Document::from_html("<ul class='a b'><li>One</li><li>Two</li></ul>");
        assert_eq!(
            doc.inner_html(doc.body()),
            "<ul class=\"a b\"><li>One</li><li>Two</li></ul>"
        );
    }

    #[test]
    fn void_and_self_closing_elements() {
        assert_eq!(
            round_trip("<p>a<br>b<img src=\"x.png\"/><span/>c</p>"),
            "<p>a<br>b<img src=\"x.png\"><span></span>c</p>"
        );
    }

    #[test]
    fn attribute_names_keep_prefix_and_first_wins() {
        let doc = Document::from_html(r#"<div tal:content="name" TAL:Define="x 1" a=1 a=2 hidden></div>"#);
        let div = doc.first_child(doc.body()).unwrap();
        assert_eq!(
            doc.attribute_names(div),
            ["tal:content", "tal:define", "a", "hidden"]
        );
        assert_eq!(doc.attribute(div, "a").as_deref(), Some("1"));
        assert_eq!(doc.attribute(div, "hidden").as_deref(), Some(""));
    }

    #[test]
    fn entities_are_decoded_and_reescaped() {
        let doc = Document::from_html("<p title=\"a &quot;b&quot;\">1 &lt; 2 &amp;&amp; &#65;&#x42; &bogus;</p>");
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.text_content(p), "1 < 2 && AB &bogus;");
        assert_eq!(doc.attribute(p, "title").as_deref(), Some("a \"b\""));
        assert_eq!(
            doc.outer_html(p),
            "<p title=\"a &quot;b&quot;\">1 &lt; 2 &amp;&amp; AB &amp;bogus;</p>"
        );
    }

    #[test]
    fn quotes_slashes_and_nbsp_are_escaped() {
        let doc = Document::new();
        let a = doc.create_element("a");
        doc.append_child(doc.body(), a);
        doc.set_attribute(a, "href", "/x?a=1&b='2'");
        doc.set_text_content(a, "</a>\u{a0}\"q\"");
        assert_eq!(
            doc.inner_html(doc.body()),
            "<a href=\"&#x2f;x?a=1&amp;b=&#x27;2&#x27;\">&lt;&#x2f;a&gt;&nbsp;&quot;q&quot;</a>"
        );
        let reparsed = Document::from_html(&doc.inner_html(doc.body()));
        let a = reparsed.element_children(reparsed.body())[0];
        assert_eq!(reparsed.attribute(a, "href").as_deref(), Some("/x?a=1&b='2'"));
        assert_eq!(reparsed.text_content(a), "</a>\u{a0}\"q\"");
    }

    #[test]
    fn comments_and_doctype_are_skipped() {
        assert_eq!(round_trip("<!doctype html><!-- c --><b>x</b>"), "<b>x</b>");
    }

    #[test]
    fn unmatched_end_tags_are_ignored_and_open_tags_closed() {
        assert_eq!(round_trip("<div></span><p>x</div>y"), "<div><p>x</p></div>y");
        assert_eq!(round_trip("<div><p>open"), "<div><p>open</p></div>");
    }

    #[test]
    fn stray_angle_brackets_are_text() {
        assert_eq!(round_trip("a < b <3"), "a &lt; b &lt;3");
    }

    #[test]
    fn template_children_go_to_content() {
        let doc = Document::from_html("<template id=t><li>x</li></template>");
        let t = doc.element_by_id("t").unwrap();
        assert!(doc.children(t).is_empty());
        let content = doc.template_content(t).unwrap();
        assert_eq!(doc.inner_html(content), "<li>x</li>");
        assert_eq!(doc.outer_html(t), "<template id=\"t\"><li>x</li></template>");
    }

    #[test]
    fn raw_text_elements_keep_markup() {
        assert_eq!(
            round_trip("<script>if (a < b) { x = '</p>'; }</script>"),
            "<script>if (a < b) { x = '</p>'; }</script>"
        );
    }

    proptest! {
        #[test]
        fn text_survives_serialization(text in "\\PC{0,40}") {
            let doc = Document::new();
            let p = doc.create_element("p");
            doc.append_child(doc.body(), p);
            doc.set_text_content(p, &text);
            let reparsed = Document::from_html(&doc.inner_html(doc.body()));
            prop_assert_eq!(reparsed.text_content(reparsed.body()), text);
        }

        #[test]
        fn attribute_values_survive_serialization(value in "\\PC{0,24}") {
            let doc = Document::new();
            let a = doc.create_element("a");
            doc.append_child(doc.body(), a);
            doc.set_attribute(a, "title", &value);
            let reparsed = Document::from_html(&doc.inner_html(doc.body()));
            let a = reparsed.element_children(reparsed.body())[0];
            prop_assert_eq!(reparsed.attribute(a, "title"), Some(value));
        }
    }
}
