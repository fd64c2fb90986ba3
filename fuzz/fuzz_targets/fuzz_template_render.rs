#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tal::prelude::*;

const DIRECTIVES: [&str; 9] = [
    "define",
    "condition",
    "with",
    "repeat",
    "content",
    "replace",
    "attributes",
    "omit-tag",
    "listen",
];

const EXPRESSIONS: [&str; 10] = [
    "name",
    "flag",
    "items",
    "user",
    "user/name",
    "item items",
    "structure markup",
    "not:flag",
    "href name; title missing",
    "value name",
];

#[derive(Arbitrary, Debug)]
struct Element {
    directives: Vec<(u8, u8)>,
    children: u8,
}

#[derive(Arbitrary, Debug)]
struct Input {
    elements: Vec<Element>,
    writes: Vec<(u8, bool)>,
}

fn markup(elements: &[Element]) -> String {
    let mut out = String::new();
    let mut open = 0usize;
    for element in elements.iter().take(32) {
        out.push_str("<div");
        for (directive, expression) in element.directives.iter().take(4) {
            let directive = DIRECTIVES[usize::from(*directive) % DIRECTIVES.len()];
            let expression = EXPRESSIONS[usize::from(*expression) % EXPRESSIONS.len()];
            out.push_str(&format!(" tal:{directive}=\"{expression}\""));
        }
        out.push('>');
        open += 1;
        for _ in 0..(element.children % 3).min(u8::try_from(open).unwrap_or(u8::MAX)) {
            out.push_str("</div>");
            open -= 1;
        }
    }
    for _ in 0..open {
        out.push_str("</div>");
    }
    out
}

fuzz_target!(|input: Input| {
    let doc = Document::from_html(&markup(&input.elements));
    let data = Object::new()
        .with("name", "Ann")
        .with("flag", true)
        .with("markup", "<b>x</b>")
        .with("user", Object::new().with("name", "Bo"))
        .with("items", Array::from(vec![Value::from(1), Value::from(2)]));
    let context = wrap_as_observable(Value::from(data), None);
    let Ok(rendered) = render(&doc, doc.body(), &context) else {
        return;
    };
    let ctx = rendered.context();
    for (target, value) in input.writes.iter().take(16) {
        let _ = match target % 4 {
            0 => ctx.set("flag", Value::from(*value)),
            1 => ctx.set("name", Value::from(if *value { "x" } else { "" })),
            2 => ctx.set("items", Value::from(Array::from(vec![Value::from(3)]))),
            _ => ctx.set("user", if *value { Value::Null } else { Value::from(Object::new()) }),
        };
    }
    let _ = doc.inner_html(doc.body());
});
