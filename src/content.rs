/// Content script side: answers popup requests against the live page
use wasm_bindgen::prelude::*;

use crate::bridge::{from_js, load_config, to_js};
use crate::clock::{BrowserClock, Clock};
use crate::config::ExtractionConfig;
use crate::dom::{PageDocument, WebDocument};
use crate::extractor::{is_page_ready, video_title, TranscriptExtractor};
use crate::messages::{ContentRequest, ContentResponse};
use crate::video_id::{canonicalize_url, is_video_page};
use crate::wait::{wait_until, WaitOutcome};

pub struct ContentScript<D, C> {
    document: D,
    clock: C,
    config: ExtractionConfig,
}

impl<D: PageDocument, C: Clock + Clone> ContentScript<D, C> {
    pub fn new(document: D, clock: C, config: ExtractionConfig) -> Self {
        ContentScript {
            document,
            clock,
            config,
        }
    }

    pub async fn handle(&self, request: ContentRequest) -> ContentResponse {
        match request {
            ContentRequest::Ping => ContentResponse::Pong {
                ready: is_page_ready(&self.document),
            },
            ContentRequest::GetVideoInfo => ContentResponse::VideoInfo {
                url: canonicalize_url(&self.document.url()),
                title: video_title(&self.document),
            },
            ContentRequest::ExtractTranscript => self.extract().await,
        }
    }

    async fn extract(&self) -> ContentResponse {
        let url = self.document.url();
        if !is_video_page(&url) {
            return ContentResponse::error("This tab is not showing a YouTube video");
        }

        self.wait_for_page().await;

        let extractor = TranscriptExtractor::new(self.clock.clone(), self.config.clone());
        let transcript = extractor.extract_transcript(&self.document).await;
        log::info!(
            "Extracted {} segments ({:?}) from {}",
            transcript.segments.len(),
            transcript.source,
            url
        );
        ContentResponse::Transcript { transcript }
    }

    /// Bounded wait for the player and title; a timeout still lets extraction run
    async fn wait_for_page(&self) {
        let outcome = wait_until(
            &self.clock,
            self.config.ready_timeout_ms,
            self.config.poll_interval_ms,
            None,
            || is_page_ready(&self.document),
        )
        .await;

        if outcome == WaitOutcome::TimedOut {
            log::warn!(
                "Page not ready after {}ms, extracting anyway",
                self.config.ready_timeout_ms
            );
        }
    }
}

/// Entry point for `chrome.runtime.onMessage` in the content script
#[wasm_bindgen]
pub fn handle_content_message(message: JsValue) -> js_sys::Promise {
    wasm_bindgen_futures::future_to_promise(async move {
        let response = match from_js::<ContentRequest>(message) {
            Ok(request) => match WebDocument::current() {
                Some(document) => {
                    let config = load_config().await;
                    ContentScript::new(document, BrowserClock, config.extraction)
                        .handle(request)
                        .await
                }
                None => ContentResponse::error("No document available"),
            },
            Err(e) => {
                log::warn!("Ignoring unknown message: {}", e);
                ContentResponse::error(format!("Unknown request: {}", e))
            }
        };
        to_js(&response)
    })
}
