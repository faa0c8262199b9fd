/// Transcript Lens - Chrome Extension for YouTube Transcripts
/// Built with Rust + WASM + Yew

pub mod api;
pub mod background;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod dom;
pub mod error;
pub mod export;
pub mod extractor;
pub mod messages;
pub mod prompts;
pub mod storage;
pub mod store;
pub mod tab_state;
pub mod transcript;
pub mod ui;
pub mod video_id;
pub mod wait;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Canonical watch URL for JavaScript callers, or null for non-video URLs
#[wasm_bindgen]
pub fn canonical_video_url(url: &str) -> Option<String> {
    video_id::extract_video_id(url).map(|id| video_id::watch_url(&id))
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}
