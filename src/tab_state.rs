/// Per-tab state and partial updates
use serde::{Deserialize, Serialize};

use crate::transcript::Transcript;
use crate::video_id::is_video_page;

/// Shown when an operation was abandoned before it could record its outcome
pub const INTERRUPTED_MESSAGE: &str = "The previous operation did not finish. Please try again.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    pub tab_id: i32,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_points: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(default)]
    pub is_processing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_step: Option<String>,
    /// When the current operation started; a flag older than the lease is abandoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_since: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: f64,
    pub last_updated: f64,
}

impl TabState {
    pub fn new(tab_id: i32, url: String, title: String, now: f64) -> TabState {
        TabState {
            tab_id,
            url,
            title,
            transcript: None,
            key_points: None,
            article: None,
            is_processing: false,
            processing_step: None,
            processing_since: None,
            error: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// What a reader gets for a tab that was never stored (or was evicted)
    pub fn empty(tab_id: i32, now: f64) -> TabState {
        TabState::new(tab_id, String::new(), String::new(), now)
    }

    /// Shallow-merge `patch`, then restore the derived-artifact invariants
    pub fn apply(&mut self, patch: TabStatePatch) {
        let step_given = patch.processing_step.is_some();

        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(transcript) = patch.transcript {
            self.transcript = transcript;
        }
        if let Some(key_points) = patch.key_points {
            self.key_points = key_points;
        }
        if let Some(article) = patch.article {
            self.article = article;
        }
        if let Some(step) = patch.processing_step {
            self.processing_step = step;
        }
        if let Some(is_processing) = patch.is_processing {
            self.is_processing = is_processing;
            if is_processing {
                self.error = None;
            } else if !step_given {
                self.processing_step = None;
            }
        }
        if let Some(error) = patch.error {
            if error.is_some() {
                self.is_processing = false;
                self.processing_step = None;
            }
            self.error = error;
        }

        self.enforce_invariants();
    }

    fn enforce_invariants(&mut self) {
        if !self.is_processing {
            self.processing_since = None;
        }
        if self.transcript.is_none() && self.key_points.is_some() {
            log::warn!("Tab {}: dropping key points without a transcript", self.tab_id);
            self.key_points = None;
        }
        if self.key_points.is_none() && self.article.is_some() {
            log::warn!("Tab {}: dropping article without key points", self.tab_id);
            self.article = None;
        }
    }

    /// Drop a processing flag whose owner never finished it.
    ///
    /// The popup that set the flag may have been closed mid-call, and nothing else would
    /// ever clear it. Returns true when the flag was released.
    pub fn release_expired_processing(&mut self, now: f64, lease_ms: f64) -> bool {
        if !self.is_processing {
            return false;
        }
        let started = self.processing_since.unwrap_or(self.last_updated);
        if now - started < lease_ms {
            return false;
        }

        self.is_processing = false;
        self.processing_step = None;
        self.processing_since = None;
        self.error = Some(INTERRUPTED_MESSAGE.to_string());
        true
    }

    /// Status for the UI, derived only from positive signals
    pub fn status(&self) -> PanelStatus {
        if self.is_processing {
            return PanelStatus::Processing {
                step: self.processing_step.clone().unwrap_or_default(),
            };
        }
        if let Some(message) = &self.error {
            return PanelStatus::Failed {
                message: message.clone(),
            };
        }
        if !is_video_page(&self.url) {
            return PanelStatus::NotVideoPage;
        }
        match (&self.transcript, &self.key_points, &self.article) {
            (Some(t), Some(_), Some(_)) if !t.is_empty() => PanelStatus::ArticleReady,
            (Some(t), Some(_), None) if !t.is_empty() => PanelStatus::KeyPointsReady,
            (Some(t), _, _) if !t.is_empty() => PanelStatus::TranscriptReady {
                segments: t.segments.len(),
            },
            _ => PanelStatus::NotExtracted,
        }
    }
}

/// Fields to merge into a `TabState`; `None` leaves a field untouched, `Some(None)` clears it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabStatePatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub transcript: Option<Option<Transcript>>,
    pub key_points: Option<Option<String>>,
    pub article: Option<Option<String>>,
    pub is_processing: Option<bool>,
    pub processing_step: Option<Option<String>>,
    pub error: Option<Option<String>>,
}

impl TabStatePatch {
    /// A fresh transcript invalidates everything derived from the old one
    pub fn transcript(transcript: Transcript) -> TabStatePatch {
        TabStatePatch {
            transcript: Some(Some(transcript)),
            key_points: Some(None),
            article: Some(None),
            is_processing: Some(false),
            processing_step: Some(None),
            error: Some(None),
            ..Default::default()
        }
    }

    /// New key points make any earlier article stale
    pub fn key_points(key_points: String) -> TabStatePatch {
        TabStatePatch {
            key_points: Some(Some(key_points)),
            article: Some(None),
            is_processing: Some(false),
            processing_step: Some(None),
            error: Some(None),
            ..Default::default()
        }
    }

    pub fn article(article: String) -> TabStatePatch {
        TabStatePatch {
            article: Some(Some(article)),
            is_processing: Some(false),
            processing_step: Some(None),
            error: Some(None),
            ..Default::default()
        }
    }

    pub fn metadata(url: String, title: String) -> TabStatePatch {
        TabStatePatch {
            url: Some(url),
            title: Some(title),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelStatus {
    NotVideoPage,
    NotExtracted,
    Processing { step: String },
    Failed { message: String },
    TranscriptReady { segments: usize },
    KeyPointsReady,
    ArticleReady,
}

impl PanelStatus {
    pub fn can_extract_key_points(&self) -> bool {
        matches!(
            self,
            PanelStatus::TranscriptReady { .. } | PanelStatus::KeyPointsReady | PanelStatus::ArticleReady
        )
    }

    pub fn can_generate_article(&self) -> bool {
        matches!(self, PanelStatus::KeyPointsReady | PanelStatus::ArticleReady)
    }
}
