#![no_main]

use libfuzzer_sys::fuzz_target;
use tal_dom::Document;

fuzz_target!(|data: &[u8]| {
    let Ok(markup) = std::str::from_utf8(data) else {
        return;
    };
    let doc = Document::from_html(markup);
    let body = doc.body();
    let first = doc.inner_html(body);

    // Serialized output parses back to itself.
    let again = Document::from_html(&first);
    assert_eq!(again.inner_html(again.body()), first);

    let fragment = doc.parse_fragment(markup);
    doc.dispose(fragment);
    doc.set_inner_html(body, "");
    assert_eq!(doc.inner_html(body), "");
});
