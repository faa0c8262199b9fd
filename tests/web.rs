//! Browser tests for the live DOM adapter. Run with `wasm-pack test --headless --chrome`.
#![cfg(target_arch = "wasm32")]

use transcript_lens::dom::{PageDocument, PageNode, WebDocument};
use transcript_lens::error::DomError;
use transcript_lens::extractor::{is_page_ready, video_title};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> web_sys::Document {
    web_sys::window().unwrap().document().unwrap()
}

fn mount(html: &str) -> web_sys::HtmlElement {
    let doc = document();
    let root: web_sys::HtmlElement = doc.create_element("div").unwrap().dyn_into().unwrap();
    root.set_inner_html(html);
    doc.body().unwrap().append_child(&root).unwrap();
    root
}

#[wasm_bindgen_test]
fn query_reads_text_and_attributes() {
    let root = mount(
        r#"<ytd-transcript-segment-renderer>
             <div class="segment-timestamp">0:00</div>
             <span class="segment-text" data-kind="cue">hello there</span>
           </ytd-transcript-segment-renderer>"#,
    );
    let doc = WebDocument::current().unwrap();

    let segments = doc.query_all("ytd-transcript-segment-renderer").unwrap();
    assert_eq!(segments.len(), 1);
    let text = segments[0].query_all(".segment-text").unwrap();
    assert_eq!(text[0].text().unwrap().trim(), "hello there");
    assert_eq!(text[0].attribute("data-kind").as_deref(), Some("cue"));

    root.remove();
}

#[wasm_bindgen_test]
fn invalid_selector_is_an_error() {
    let doc = WebDocument::current().unwrap();
    assert!(matches!(doc.query_all("[["), Err(DomError::InvalidSelector(_))));
    assert!(!doc.matches_any(&["[["]));
}

#[wasm_bindgen_test]
fn detached_node_is_reported() {
    let root = mount(r#"<p class="gone">bye</p>"#);
    let doc = WebDocument::current().unwrap();
    let node = doc.query_first(".gone").unwrap().unwrap();

    root.remove();

    assert_eq!(node.text(), Err(DomError::Detached));
    assert_eq!(node.click(), Err(DomError::Detached));
}

#[wasm_bindgen_test]
fn readiness_and_title_from_live_page() {
    let root = mount(r#"<div id="movie_player"></div><h1 class="title">Live Title</h1>"#);
    let doc = WebDocument::current().unwrap();

    assert!(is_page_ready(&doc));
    assert_eq!(video_title(&doc), "Live Title");

    root.remove();
}
