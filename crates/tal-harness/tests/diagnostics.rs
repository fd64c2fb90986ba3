#![forbid(unsafe_code)]

//! Diagnostics for malformed templates: bad directives are logged and
//! skipped, the rest of the template still renders.

use serde_json::json;
use std::sync::{Arc, Mutex};
use tal::prelude::*;
use tal::runtime::HostError;
use tal_harness::Fixture;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_test::traced_test;

// ============================================================================
// Logged and skipped
// ============================================================================

#[traced_test]
#[test]
fn malformed_statement_is_reported() {
    let fx = Fixture::new(
        r#"<p tal:repeat="nope">x</p><b tal:content="n"></b>"#,
        json!({"n": 1}),
    )
    .unwrap();
    assert!(logs_contain("directive.invalid"));
    assert_eq!(fx.html(), "<p>x</p><b>1</b>");
}

#[traced_test]
#[test]
fn unresolvable_expression_renders_empty() {
    let fx = Fixture::new(r#"<p tal:content="two words">old</p>"#, json!({})).unwrap();
    assert!(logs_contain("directive.unresolved"));
    assert_eq!(fx.html(), "<p></p>");
}

#[traced_test]
#[test]
fn unknown_host_expression_is_reported() {
    let fx = Fixture::new(r#"<p tal:content="js:never_registered()"></p>"#, json!({})).unwrap();
    assert!(logs_contain("tales.js.unknown"));
    assert_eq!(fx.html(), "<p></p>");
}

#[traced_test]
#[test]
fn condition_and_with_conflict_keeps_with() {
    let fx = Fixture::new(
        r#"<section tal:condition="flag" tal:with="account"><b tal:content="owner"></b></section>"#,
        json!({"flag": false, "account": {"owner": "Ann"}}),
    )
    .unwrap();
    assert!(logs_contain("directive.conflict"));
    assert_eq!(fx.texts("b"), ["Ann"]);
}

#[traced_test]
#[test]
fn repeat_over_a_non_array_renders_nothing() {
    let fx = Fixture::new(
        r#"<ul><li tal:repeat="n count" tal:content="n"></li></ul>"#,
        json!({"count": 5}),
    )
    .unwrap();
    assert!(logs_contain("repeat.not_array"));
    assert!(fx.texts("li").is_empty());

    fx.set("count", json!([1, 2])).unwrap();
    assert_eq!(fx.texts("li"), ["1", "2"]);
}

#[traced_test]
#[test]
fn null_repeat_source_is_quiet() {
    let fx = Fixture::new(
        r#"<ul><li tal:repeat="n items"></li></ul>"#,
        json!({"items": null}),
    )
    .unwrap();
    assert!(logs_contain("repeat.empty"));
    assert!(!logs_contain("repeat.not_array"));
    assert!(fx.texts("li").is_empty());
}

// ============================================================================
// Error-level events
// ============================================================================

#[derive(Default)]
struct Captured {
    errors: Vec<String>,
}

struct ErrorCapture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for ErrorCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::ERROR {
            return;
        }
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state.lock().expect("capture lock").errors.push(message);
        }
    }
}

#[test]
fn failing_host_expression_logs_one_error_per_evaluation() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(ErrorCapture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    host::register("explode", |ctx| {
        let _ = ctx.get("n");
        Err(HostError::new("boom"))
    });
    let fx = Fixture::new(r#"<p tal:content="js:explode()"></p>"#, json!({"n": 1})).unwrap();
    fx.set("n", json!(2)).unwrap();

    let captured = state.lock().expect("capture lock");
    assert_eq!(captured.errors, ["tales.js.failed", "tales.js.failed"]);
    assert_eq!(fx.html(), "<p></p>");
}
