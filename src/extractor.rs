/// Multi-strategy transcript extraction from a video page
///
/// Strategies run in priority order and the first non-empty result wins:
/// 1. the structured transcript panel (opening it first if needed),
/// 2. the live caption overlay,
/// 3. any container whose class or id mentions "transcript".
///
/// Nothing here fails for a page without a transcript; the result is simply empty.
use std::collections::HashSet;

use crate::clock::Clock;
use crate::config::ExtractionConfig;
use crate::dom::{PageDocument, PageNode};
use crate::error::DomError;
use crate::transcript::{ExtractionSource, Transcript, TranscriptSegment};
use crate::wait::{wait_until, CancelToken};

pub const SEGMENT_SELECTORS: [&str; 3] = [
    "ytd-transcript-segment-renderer",
    "ytd-transcript-body-renderer .cue-group",
    "#segments-container .segment",
];
pub const SEGMENT_TIMESTAMP_SELECTORS: [&str; 2] = [".segment-timestamp", ".cue-group-start-offset"];
pub const SEGMENT_TEXT_SELECTORS: [&str; 2] = [".segment-text", ".cue"];

pub const TRANSCRIPT_BUTTON_SELECTORS: [&str; 2] = [
    "ytd-video-description-transcript-section-renderer button",
    "button[aria-label*='transcript' i]",
];
/// Buttons scanned by accessible label when the selectors above find nothing
pub const LABELLED_BUTTON_SELECTOR: &str = "button";
pub const MORE_ACTIONS_SELECTORS: [&str; 2] = [
    "#actions button[aria-label='More actions']",
    "ytd-menu-renderer yt-button-shape button",
];
pub const MENU_ITEM_SELECTOR: &str = "ytd-menu-service-item-renderer";
pub const PLAYER_TRANSCRIPT_TOGGLE_SELECTORS: [&str; 1] = [".ytp-transcript-button"];

pub const CAPTION_SELECTORS: [&str; 2] = [".ytp-caption-segment", ".caption-visual-line"];
pub const GENERIC_SELECTORS: [&str; 2] = ["[class*='transcript']", "[id*='transcript']"];

pub const PLAYER_SELECTORS: [&str; 2] = ["#movie_player", "video"];
pub const TITLE_SELECTORS: [&str; 3] = ["h1.ytd-watch-metadata", "h1.title", "#title h1"];

/// Segments plus the strategy that produced them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub source: ExtractionSource,
    pub segments: Vec<TranscriptSegment>,
}

impl Extraction {
    fn from(source: ExtractionSource, segments: Vec<TranscriptSegment>) -> Extraction {
        Extraction { source, segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// The page shows a player and a title, so transcript affordances are worth looking for
pub fn is_page_ready<D: PageDocument>(doc: &D) -> bool {
    doc.matches_any(&PLAYER_SELECTORS) && doc.matches_any(&TITLE_SELECTORS)
}

/// Title from the heading, or the document title without the site suffix
pub fn video_title<D: PageDocument>(doc: &D) -> String {
    for selector in TITLE_SELECTORS {
        if let Ok(Some(node)) = doc.query_first(selector) {
            if let Ok(text) = node.text() {
                let text = text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }

    let title = doc.title();
    title
        .trim()
        .strip_suffix("- YouTube")
        .map(str::trim)
        .unwrap_or(title.trim())
        .to_string()
}

fn accept(text: &str, min_chars: usize) -> Option<String> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty() && text.chars().count() >= min_chars).then_some(text)
}

fn first_child_text<N: PageNode>(node: &N, selectors: &[&str]) -> Result<Option<String>, DomError> {
    for selector in selectors {
        if let Some(child) = node.query_all(selector)?.into_iter().next() {
            let text = child.text()?;
            if !text.trim().is_empty() {
                return Ok(Some(text.trim().to_string()));
            }
        }
    }
    Ok(None)
}

pub struct TranscriptExtractor<C> {
    clock: C,
    config: ExtractionConfig,
    cancel: Option<CancelToken>,
}

impl<C: Clock> TranscriptExtractor<C> {
    pub fn new(clock: C, config: ExtractionConfig) -> Self {
        TranscriptExtractor {
            clock,
            config,
            cancel: None,
        }
    }

    /// Stop panel waits early when `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the strategies in order; an erroring strategy counts as producing nothing
    pub async fn extract<D: PageDocument>(&self, doc: &D) -> Extraction {
        match self.from_transcript_panel(doc).await {
            Ok(segments) if !segments.is_empty() => {
                return Extraction::from(ExtractionSource::TranscriptPanel, segments);
            }
            Ok(_) => log::debug!("Transcript panel produced nothing"),
            Err(e) => log::debug!("Transcript panel strategy failed: {}", e),
        }

        match self.from_captions(doc) {
            Ok(segments) if !segments.is_empty() => {
                return Extraction::from(ExtractionSource::Captions, segments);
            }
            Ok(_) => log::debug!("Caption overlay produced nothing"),
            Err(e) => log::debug!("Caption strategy failed: {}", e),
        }

        match self.from_generic_containers(doc) {
            Ok(segments) if !segments.is_empty() => {
                return Extraction::from(ExtractionSource::Generic, segments);
            }
            Ok(_) => log::debug!("Generic containers produced nothing"),
            Err(e) => log::debug!("Generic strategy failed: {}", e),
        }

        log::info!("No transcript found on {}", doc.url());
        Extraction::default()
    }

    /// Extract and wrap the result with the page's url, title and time
    pub async fn extract_transcript<D: PageDocument>(&self, doc: &D) -> Transcript {
        let extraction = self.extract(doc).await;
        Transcript::new(
            doc.url(),
            video_title(doc),
            self.clock.now_ms(),
            extraction.source,
            extraction.segments,
        )
    }

    async fn from_transcript_panel<D: PageDocument>(&self, doc: &D) -> Result<Vec<TranscriptSegment>, DomError> {
        if doc.matches_any(&SEGMENT_SELECTORS) {
            return self.read_panel(doc);
        }

        if !self.open_panel(doc).await {
            log::debug!("No transcript panel trigger found");
            return Ok(Vec::new());
        }

        let outcome = wait_until(
            &self.clock,
            self.config.panel_timeout_ms,
            self.config.poll_interval_ms,
            self.cancel.as_ref(),
            || doc.matches_any(&SEGMENT_SELECTORS),
        )
        .await;

        if !outcome.is_ready() {
            log::debug!("Transcript panel did not load: {:?}", outcome);
            return Ok(Vec::new());
        }
        self.read_panel(doc)
    }

    fn read_panel<D: PageDocument>(&self, doc: &D) -> Result<Vec<TranscriptSegment>, DomError> {
        for selector in SEGMENT_SELECTORS {
            let nodes = doc.query_all(selector)?;
            let mut segments = Vec::with_capacity(nodes.len());

            for node in &nodes {
                let timestamp = first_child_text(node, &SEGMENT_TIMESTAMP_SELECTORS)?.unwrap_or_default();
                let raw = match first_child_text(node, &SEGMENT_TEXT_SELECTORS)? {
                    Some(text) => text,
                    None => {
                        let whole = node.text()?;
                        let whole = whole.trim();
                        whole.strip_prefix(timestamp.as_str()).unwrap_or(whole).to_string()
                    }
                };

                if let Some(text) = accept(&raw, self.config.min_segment_chars) {
                    segments.push(TranscriptSegment::new(timestamp, text));
                }
            }

            if !segments.is_empty() {
                return Ok(segments);
            }
        }
        Ok(Vec::new())
    }

    /// Try each known trigger in turn; true once one of them was clicked
    async fn open_panel<D: PageDocument>(&self, doc: &D) -> bool {
        if click_first(doc, &TRANSCRIPT_BUTTON_SELECTORS) {
            log::debug!("Clicked transcript button");
            return true;
        }

        // Older engines reject the case-insensitive attribute selector
        if let Some(button) = find_labelled_transcript_button(doc) {
            if button.click().is_ok() {
                log::debug!("Clicked transcript button found by aria-label");
                return true;
            }
        }

        if click_first(doc, &MORE_ACTIONS_SELECTORS) {
            let mut item = None;
            let outcome = wait_until(
                &self.clock,
                self.config.poll_interval_ms.saturating_mul(5),
                self.config.poll_interval_ms,
                self.cancel.as_ref(),
                || {
                    item = find_transcript_menu_item(doc);
                    item.is_some()
                },
            )
            .await;

            if outcome.is_ready() {
                if let Some(item) = item {
                    if item.click().is_ok() {
                        log::debug!("Opened transcript from the actions menu");
                        return true;
                    }
                }
            }
        }

        if click_first(doc, &PLAYER_TRANSCRIPT_TOGGLE_SELECTORS) {
            log::debug!("Clicked player transcript toggle");
            return true;
        }

        false
    }

    fn from_captions<D: PageDocument>(&self, doc: &D) -> Result<Vec<TranscriptSegment>, DomError> {
        for selector in CAPTION_SELECTORS {
            let mut segments = Vec::new();
            for node in doc.query_all(selector)? {
                if let Some(text) = accept(&node.text()?, self.config.min_segment_chars) {
                    segments.push(TranscriptSegment::indexed(segments.len(), text));
                }
            }
            if !segments.is_empty() {
                return Ok(segments);
            }
        }
        Ok(Vec::new())
    }

    fn from_generic_containers<D: PageDocument>(&self, doc: &D) -> Result<Vec<TranscriptSegment>, DomError> {
        let mut seen = HashSet::new();
        let mut segments = Vec::new();

        for selector in GENERIC_SELECTORS {
            for node in doc.query_all(selector)? {
                if let Some(text) = accept(&node.text()?, self.config.min_generic_chars) {
                    if seen.insert(text.clone()) {
                        segments.push(TranscriptSegment::indexed(segments.len(), text));
                    }
                }
            }
        }
        Ok(segments)
    }
}

fn click_first<D: PageDocument>(doc: &D, selectors: &[&str]) -> bool {
    selectors.iter().any(|selector| match doc.query_first(selector) {
        Ok(Some(node)) => match node.click() {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Click on {} failed: {}", selector, e);
                false
            }
        },
        _ => false,
    })
}

fn find_labelled_transcript_button<D: PageDocument>(doc: &D) -> Option<D::Node> {
    doc.query_all(LABELLED_BUTTON_SELECTOR)
        .ok()?
        .into_iter()
        .find(|button| {
            button
                .attribute("aria-label")
                .is_some_and(|label| label.to_lowercase().contains("transcript"))
        })
}

fn find_transcript_menu_item<D: PageDocument>(doc: &D) -> Option<D::Node> {
    doc.query_all(MENU_ITEM_SELECTOR)
        .ok()?
        .into_iter()
        .find(|item| {
            item.text()
                .is_ok_and(|t| t.to_lowercase().contains("transcript"))
        })
}
