#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tal_runtime::tales::resolve;
use tal_runtime::{Directives, Object, Statement, Value, wrap};

#[derive(Arbitrary, Debug)]
struct Input {
    directive: u8,
    text: String,
    writer: bool,
}

fuzz_target!(|input: Input| {
    let directive = Directives::ORDER[usize::from(input.directive) % Directives::ORDER.len()];
    if let Ok(statement) = Statement::parse(directive, &input.text) {
        assert_eq!(statement.directive(), directive);
    }

    let data = Object::new()
        .with("name", "Ann")
        .with("flag", true)
        .with("user", Object::new().with("name", "Bo"));
    let context = wrap(Value::from(data), None);
    if let Ok(expression) = resolve(&input.text, &context, input.writer) {
        let _ = expression.evaluate();
    }
});
