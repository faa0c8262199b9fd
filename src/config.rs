/// Tunables for the store, the extraction engine and the API client
use serde::{Deserialize, Serialize};

/// Storage key for the tab state record
pub const TAB_STATES_KEY: &str = "transcriptLens.tabStates";

/// Storage key for the API credential
pub const API_KEY_KEY: &str = "transcriptLens.apiKey";

/// Storage key for optional config overrides
pub const CONFIG_KEY: &str = "transcriptLens.config";

const HOUR_MS: f64 = 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionConfig {
    pub store: StoreConfig,
    pub extraction: ExtractionConfig,
    pub api: ApiConfig,
}

impl ExtensionConfig {
    /// Parse a stored override record, falling back to defaults when it is malformed
    pub fn from_stored(value: Option<serde_json::Value>) -> ExtensionConfig {
        match value {
            None => ExtensionConfig::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed config record: {}", e);
                ExtensionConfig::default()
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Serialized size budget for the whole tab state record
    pub capacity_bytes: usize,
    /// Closed tabs older than this are dropped
    pub stale_after_ms: f64,
    /// Any entry older than this is dropped
    pub max_age_ms: f64,
    pub persist_attempts: u32,
    pub persist_backoff_ms: u32,
    /// A processing flag older than this belongs to a popup that went away
    pub processing_lease_ms: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            capacity_bytes: 8 * 1024 * 1024,
            stale_after_ms: 24.0 * HOUR_MS,
            max_age_ms: 7.0 * 24.0 * HOUR_MS,
            persist_attempts: 3,
            persist_backoff_ms: 100,
            processing_lease_ms: 10.0 * 60.0 * 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionConfig {
    pub ready_timeout_ms: u32,
    pub panel_timeout_ms: u32,
    pub poll_interval_ms: u32,
    pub min_segment_chars: usize,
    pub min_generic_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            ready_timeout_ms: 10_000,
            panel_timeout_ms: 5_000,
            poll_interval_ms: 200,
            min_segment_chars: 3,
            min_generic_chars: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiConfig {
    pub endpoint: String,
    pub api_version: String,
    pub model: String,
    pub key_points_max_tokens: u32,
    pub article_max_tokens: u32,
    pub max_retries: u32,
    pub overload_base_delay_ms: u32,
    pub rate_limit_base_delay_ms: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_version: "2023-06-01".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            key_points_max_tokens: 2048,
            article_max_tokens: 4096,
            max_retries: 3,
            overload_base_delay_ms: 2_000,
            rate_limit_base_delay_ms: 5_000,
        }
    }
}
