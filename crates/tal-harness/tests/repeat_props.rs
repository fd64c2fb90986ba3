#![forbid(unsafe_code)]

//! Property tests for list rendering: any sequence of in-range array edits
//! leaves the DOM exactly where a fresh render of the final array would.

use proptest::prelude::*;
use serde_json::json;
use tal::prelude::*;
use tal_harness::{ArrayEdit, Fixture, array_edit};

const LIST: &str = r#"<ul><li tal:repeat="n items" tal:content="n"></li></ul>"#;

fn rendered(model: &[i32]) -> Vec<String> {
    model.iter().map(ToString::to_string).collect()
}

fn fixture(initial: &[i32]) -> Fixture {
    Fixture::new(LIST, json!({ "items": initial })).unwrap()
}

// ============================================================================
// Incremental edits match a fresh render
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn incremental_edits_match_fresh_render(
        initial in prop::collection::vec(-50i32..50, 0..6),
        edits in prop::collection::vec(array_edit(), 0..12),
    ) {
        let fx = fixture(&initial);
        let items = fx.observable("items").unwrap();
        let mut model = initial.clone();

        for edit in edits {
            let edit = edit.clamp(model.len());
            edit.apply(&items).unwrap();
            edit.apply_model(&mut model);
            prop_assert_eq!(fx.texts("li"), rendered(&model), "after {:?}", edit);
        }

        let fresh = fixture(&model);
        prop_assert_eq!(fx.html(), fresh.html());
    }

    #[test]
    fn edits_keep_one_scope_per_item(
        edits in prop::collection::vec(array_edit(), 0..12),
    ) {
        let fx = fixture(&[1, 2, 3]);
        let items = fx.observable("items").unwrap();
        let mut model = vec![1, 2, 3];
        for edit in edits {
            let edit = edit.clamp(model.len());
            edit.apply(&items).unwrap();
            edit.apply_model(&mut model);
        }
        // One scope for the list anchor, one per rendered item.
        prop_assert_eq!(fx.renderer().scope_count(), model.len() + 1);
    }
}

// ============================================================================
// Node stability
// ============================================================================

#[test]
fn splice_leaves_untouched_items_in_place() {
    let fx = fixture(&[1, 2, 3, 4, 5]);
    let before = fx.elements("li");
    fx.observable("items")
        .unwrap()
        .splice(1, 2, [Value::from(9)])
        .unwrap();
    let after = fx.elements("li");
    assert_eq!(fx.texts("li"), ["1", "9", "4", "5"]);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[3]);
    assert_eq!(after[3], before[4]);
    assert!(!fx.document().is_alive(before[1]));
}

#[test]
fn push_and_unshift_do_not_rebuild_existing_items() {
    let fx = fixture(&[1, 2]);
    let before = fx.elements("li");
    let items = fx.observable("items").unwrap();
    items.push([Value::from(3)]).unwrap();
    items.unshift([Value::from(-1), Value::from(0)]).unwrap();
    let after = fx.elements("li");
    assert_eq!(fx.texts("li"), ["-1", "0", "1", "2", "3"]);
    assert_eq!(&after[2..4], &before[..]);
}

#[test]
fn truncate_then_clear() {
    let fx = fixture(&[1, 2, 3, 4]);
    let items = fx.observable("items").unwrap();
    ArrayEdit::Truncate(2).apply(&items).unwrap();
    assert_eq!(fx.texts("li"), ["1", "2"]);
    ArrayEdit::Clear.apply(&items).unwrap();
    assert!(fx.texts("li").is_empty());
    assert_eq!(fx.renderer().scope_count(), 1);
}
