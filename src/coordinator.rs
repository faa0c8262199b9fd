/// Orchestrates extraction, API calls and store writes for one browser profile
use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::api::{is_valid_credential_format, AnthropicClient, HttpTransport, RetryAttempt, RetryReason};
use crate::clock::Clock;
use crate::config::{ApiConfig, API_KEY_KEY};
use crate::error::{ApiError, ChannelError, CredentialError};
use crate::messages::{ContentRequest, ContentResponse};
use crate::storage::StorageBackend;
use crate::store::TabStateStore;
use crate::tab_state::{PanelStatus, TabState, TabStatePatch};
use crate::video_id::is_video_page;

pub const STEP_EXTRACTING: &str = "Extracting transcript";
pub const STEP_KEY_POINTS: &str = "Extracting key points";
pub const STEP_ARTICLE: &str = "Generating article";

/// Delivers a request to the content script of a tab
#[allow(async_fn_in_trait)]
pub trait PageChannel {
    async fn send(&self, tab_id: i32, request: &ContentRequest) -> Result<ContentResponse, ChannelError>;
}

/// Text for the user, with a wait suggestion for transient provider errors
pub fn user_message(error: &ApiError, config: &ApiConfig) -> String {
    // Total backoff the client already spent, as a rough "wait this long" hint
    let backoff_secs = |base: u32| base.saturating_mul((1 << config.max_retries.min(16)) - 1) / 1000;

    match error {
        ApiError::Configuration => "Add your Anthropic API key in settings first.".to_string(),
        ApiError::Input(message) => format!("Nothing to send: {}.", message),
        ApiError::Auth(_) => "The API key was rejected. Check it in settings.".to_string(),
        ApiError::Permission(_) => "This API key is not allowed to use this model.".to_string(),
        ApiError::RateLimit { .. } => format!(
            "Rate limited by the API. Wait at least {} seconds and try again.",
            backoff_secs(config.rate_limit_base_delay_ms).max(60)
        ),
        ApiError::Overload { .. } => format!(
            "The API is overloaded. Try again in about {} seconds.",
            backoff_secs(config.overload_base_delay_ms).max(30)
        ),
        ApiError::Server { status, .. } => {
            format!("The API had a server error ({}). Try again shortly.", status)
        }
        ApiError::Rejected { status, message } => format!("Request rejected ({}): {}", status, message),
        ApiError::Network(message) => format!("Network error: {}. Check your connection.", message),
        ApiError::InvalidResponse(_) => "The API returned an unexpected response. Try again.".to_string(),
    }
}

fn retry_notice(attempt: &RetryAttempt) -> String {
    let what = match attempt.reason {
        RetryReason::Overloaded => "API overloaded",
        RetryReason::RateLimited => "Rate limited",
    };
    format!(
        "{}, retrying in {}s ({}/{})",
        what,
        attempt.delay_ms.div_ceil(1000),
        attempt.attempt,
        attempt.max_retries
    )
}

pub struct Coordinator<B, C, T, P> {
    store: TabStateStore<B, C>,
    client: AnthropicClient<T, C>,
    channel: P,
    api_config: ApiConfig,
    notice: Rc<RefCell<Option<String>>>,
}

impl<B, C, T, P> Coordinator<B, C, T, P>
where
    B: StorageBackend,
    C: Clock,
    T: HttpTransport,
    P: PageChannel,
{
    pub fn new(
        store: TabStateStore<B, C>,
        mut client: AnthropicClient<T, C>,
        channel: P,
        api_config: ApiConfig,
    ) -> Self {
        let notice = Rc::new(RefCell::new(None));
        let sink = notice.clone();
        client.set_retry_observer(move |attempt| {
            *sink.borrow_mut() = Some(retry_notice(attempt));
        });

        Coordinator {
            store,
            client,
            channel,
            api_config,
            notice,
        }
    }

    pub fn store(&self) -> &TabStateStore<B, C> {
        &self.store
    }

    /// Latest retry notice from an in-flight API call
    pub fn retry_notice(&self) -> Option<String> {
        self.notice.borrow().clone()
    }

    pub async fn status(&self, tab_id: i32) -> PanelStatus {
        self.store.get(tab_id).await.status()
    }

    /// Record what a tab shows; only video pages get an entry
    pub async fn observe_tab(&self, tab_id: i32, url: &str, title: &str) -> TabState {
        if is_video_page(url) {
            self.store.initialize(tab_id, url, title).await
        } else {
            let mut state = self.store.get(tab_id).await;
            state.url = url.to_string();
            state.title = title.to_string();
            state
        }
    }

    pub async fn extract_for_tab(&self, tab_id: i32) -> TabState {
        self.store.set_processing(tab_id, true, Some(STEP_EXTRACTING)).await;

        match self.channel.send(tab_id, &ContentRequest::ExtractTranscript).await {
            Ok(ContentResponse::Transcript { transcript }) if !transcript.is_empty() => {
                log::info!("Tab {}: stored {} segments", tab_id, transcript.segments.len());
                self.store.update(tab_id, TabStatePatch::transcript(transcript)).await
            }
            Ok(ContentResponse::Transcript { .. }) => {
                self.store
                    .set_error(
                        tab_id,
                        "No transcript found. Open the video's transcript panel and try again.",
                    )
                    .await
            }
            Ok(ContentResponse::Error { message }) => self.store.set_error(tab_id, &message).await,
            Ok(other) => {
                log::warn!("Tab {}: unexpected reply to extraction: {:?}", tab_id, other);
                self.store.set_error(tab_id, "Unexpected reply from the page").await
            }
            Err(e) => {
                log::warn!("Tab {}: {}", tab_id, e);
                self.store
                    .set_error(tab_id, "Could not reach the page. Reload the video tab and try again.")
                    .await
            }
        }
    }

    pub async fn generate_key_points(&self, tab_id: i32) -> TabState {
        let state = self.store.get(tab_id).await;
        let Some(transcript) = state.transcript.filter(|t| !t.is_empty()) else {
            return self.store.set_error(tab_id, "Extract a transcript first").await;
        };

        self.load_credential().await;
        self.store.set_processing(tab_id, true, Some(STEP_KEY_POINTS)).await;
        self.notice.borrow_mut().take();

        let result = self.client.extract_key_points(&transcript).await;
        self.notice.borrow_mut().take();
        match result {
            Ok(key_points) => {
                self.store.update(tab_id, TabStatePatch::key_points(key_points)).await
            }
            Err(e) => self.fail(tab_id, &e).await,
        }
    }

    pub async fn generate_article(&self, tab_id: i32) -> TabState {
        let state = self.store.get(tab_id).await;
        let Some(transcript) = state.transcript.filter(|t| !t.is_empty()) else {
            return self.store.set_error(tab_id, "Extract a transcript first").await;
        };
        let Some(key_points) = state.key_points else {
            return self.store.set_error(tab_id, "Extract key points first").await;
        };

        self.load_credential().await;
        self.store.set_processing(tab_id, true, Some(STEP_ARTICLE)).await;
        self.notice.borrow_mut().take();

        let result = self.client.generate_article(&key_points, &transcript).await;
        self.notice.borrow_mut().take();
        match result {
            Ok(article) => {
                self.store.update(tab_id, TabStatePatch::article(article)).await
            }
            Err(e) => self.fail(tab_id, &e).await,
        }
    }

    async fn fail(&self, tab_id: i32, error: &ApiError) -> TabState {
        if error.is_transient() {
            log::warn!("Tab {}: {}", tab_id, error);
        } else {
            log::error!("Tab {}: {}", tab_id, error);
        }
        self.store
            .set_error(tab_id, &user_message(error, &self.api_config))
            .await
    }

    /// Persist a syntactically valid credential and start using it
    pub async fn save_credential(&self, candidate: &str) -> Result<(), CredentialError> {
        let candidate = candidate.trim();
        if !is_valid_credential_format(candidate) {
            return Err(CredentialError::Format);
        }

        self.store
            .backend()
            .set(API_KEY_KEY, Value::String(candidate.to_string()))
            .await?;
        self.client.set_credential(Some(candidate.to_string()));
        log::info!("API key saved");
        Ok(())
    }

    /// Load the stored credential into the client; true only for a well-formed key
    pub async fn load_credential(&self) -> bool {
        let stored = match self.store.backend().get(API_KEY_KEY).await {
            Ok(Some(Value::String(key))) => Some(key),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to read API key: {}", e);
                None
            }
        };

        let valid = stored.as_deref().is_some_and(is_valid_credential_format);
        self.client.set_credential(stored);
        valid
    }

    pub async fn forget_credential(&self) -> Result<(), CredentialError> {
        self.store.backend().remove(API_KEY_KEY).await?;
        self.client.set_credential(None);
        Ok(())
    }

    /// Live check; malformed keys are rejected before any request
    pub async fn test_credential(&self, candidate: &str) -> Result<bool, ApiError> {
        if !is_valid_credential_format(candidate) {
            return Err(ApiError::Input("API key format is invalid".to_string()));
        }
        self.client.test_credential(candidate).await
    }

    pub async fn clear_tab(&self, tab_id: i32) {
        self.store.remove(tab_id).await;
    }

    pub async fn clear_all(&self) {
        self.store.clear().await;
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeChannel;
    use super::*;
    use crate::api::fake::ScriptedTransport;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::storage::MemoryStorage;
    use crate::transcript::{ExtractionSource, Transcript, TranscriptSegment};
    use futures::executor::block_on;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    const KEY: &str = "sk-ant-REDACTED";

    type TestCoordinator = Coordinator<MemoryStorage, ManualClock, ScriptedTransport, FakeChannel>;

    struct Harness {
        coordinator: TestCoordinator,
        storage: MemoryStorage,
        transport: ScriptedTransport,
        channel: FakeChannel,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        harness_on(MemoryStorage::new(), ManualClock::new(1_000.0))
    }

    fn harness_on(storage: MemoryStorage, clock: ManualClock) -> Harness {
        let transport = ScriptedTransport::new();
        let channel = FakeChannel::new();
        let store = TabStateStore::new(storage.clone(), clock.clone(), StoreConfig::default());
        let client = AnthropicClient::new(transport.clone(), clock.clone(), ApiConfig::default());
        let coordinator = Coordinator::new(store, client, channel.clone(), ApiConfig::default());

        Harness {
            coordinator,
            storage,
            transport,
            channel,
            clock,
        }
    }

    fn transcript(segments: Vec<TranscriptSegment>) -> Transcript {
        Transcript::new(URL.to_string(), "Clip".to_string(), 0.0, ExtractionSource::TranscriptPanel, segments)
    }

    fn extracted(h: &Harness) -> TabState {
        block_on(h.coordinator.observe_tab(7, URL, "Clip"));
        h.channel.reply(Ok(ContentResponse::Transcript {
            transcript: transcript(vec![TranscriptSegment::new("0:00", "hello world")]),
        }));
        block_on(h.coordinator.extract_for_tab(7))
    }

    #[test]
    fn test_observe_only_creates_entries_for_video_pages() {
        let h = harness();

        let state = block_on(h.coordinator.observe_tab(3, "https://example.com/", "Example"));
        assert_eq!(state.status(), PanelStatus::NotVideoPage);
        assert!(block_on(h.coordinator.store().tab_ids()).is_empty());

        block_on(h.coordinator.observe_tab(7, "https://youtu.be/dQw4w9WgXcQ", "Clip"));
        assert_eq!(block_on(h.coordinator.store().tab_ids()), vec![7]);
        assert_eq!(block_on(h.coordinator.status(7)), PanelStatus::NotExtracted);
    }

    #[test]
    fn test_extraction_stores_transcript() {
        let h = harness();

        let state = extracted(&h);

        assert_eq!(h.channel.sent(), vec![(7, ContentRequest::ExtractTranscript)]);
        assert!(!state.is_processing);
        assert_eq!(state.status(), PanelStatus::TranscriptReady { segments: 1 });
    }

    #[test]
    fn test_empty_extraction_is_not_ready() {
        let h = harness();
        block_on(h.coordinator.observe_tab(7, URL, "Clip"));
        h.channel.reply(Ok(ContentResponse::Transcript { transcript: transcript(vec![]) }));

        let state = block_on(h.coordinator.extract_for_tab(7));

        assert!(matches!(state.status(), PanelStatus::Failed { .. }));
        assert!(state.transcript.is_none());
    }

    #[test]
    fn test_unreachable_page_sets_error() {
        let h = harness();
        block_on(h.coordinator.observe_tab(7, URL, "Clip"));
        h.channel.reply(Err(ChannelError::Unreachable("no receiver".to_string())));

        let state = block_on(h.coordinator.extract_for_tab(7));

        assert!(!state.is_processing);
        assert!(state.error.unwrap().contains("Reload"));
    }

    #[test]
    fn test_key_points_without_credential() {
        let h = harness();
        extracted(&h);

        let state = block_on(h.coordinator.generate_key_points(7));

        assert_eq!(state.error.as_deref(), Some("Add your Anthropic API key in settings first."));
        assert!(h.transport.requests().is_empty());
        assert!(state.transcript.is_some());
    }

    #[test]
    fn test_key_points_and_article_flow() {
        let h = harness();
        extracted(&h);
        block_on(h.coordinator.save_credential(KEY)).unwrap();
        h.transport.respond_text("- one").respond_text("# Article");

        let state = block_on(h.coordinator.generate_key_points(7));
        assert_eq!(state.key_points.as_deref(), Some("- one"));
        assert_eq!(state.status(), PanelStatus::KeyPointsReady);

        let state = block_on(h.coordinator.generate_article(7));
        assert_eq!(state.article.as_deref(), Some("# Article"));
        assert_eq!(state.status(), PanelStatus::ArticleReady);
    }

    #[test]
    fn test_article_requires_key_points() {
        let h = harness();
        extracted(&h);
        block_on(h.coordinator.save_credential(KEY)).unwrap();

        let state = block_on(h.coordinator.generate_article(7));

        assert_eq!(state.error.as_deref(), Some("Extract key points first"));
        assert!(h.transport.requests().is_empty());
    }

    #[test]
    fn test_overload_is_reported_with_wait_hint() {
        let h = harness();
        extracted(&h);
        block_on(h.coordinator.save_credential(KEY)).unwrap();
        for _ in 0..4 {
            h.transport.respond(529, r#"{"error":{"message":"Overloaded"}}"#);
        }

        let state = block_on(h.coordinator.generate_key_points(7));

        assert_eq!(state.error.as_deref(), Some("The API is overloaded. Try again in about 30 seconds."));
        assert_eq!(h.clock.sleeps(), vec![2_000, 4_000, 8_000]);
        assert_eq!(h.coordinator.retry_notice(), None);
        assert!(state.transcript.is_some());
    }

    #[test]
    fn test_credential_storage() {
        let h = harness();

        assert_eq!(block_on(h.coordinator.save_credential("sk-wrong")), Err(CredentialError::Format));
        assert!(!block_on(h.coordinator.load_credential()));

        block_on(h.coordinator.save_credential(&format!(" {} ", KEY))).unwrap();
        assert_eq!(h.storage.snapshot(API_KEY_KEY), Some(Value::String(KEY.to_string())));
        assert!(block_on(h.coordinator.load_credential()));

        block_on(h.coordinator.forget_credential()).unwrap();
        assert!(!block_on(h.coordinator.load_credential()));
    }

    #[test]
    fn test_credential_check_rejects_malformed_key_offline() {
        let h = harness();

        let result = block_on(h.coordinator.test_credential("not-a-key"));

        assert!(matches!(result, Err(ApiError::Input(_))));
        assert!(h.transport.requests().is_empty());

        h.transport.respond_text("Hi");
        assert_eq!(block_on(h.coordinator.test_credential(KEY)), Ok(true));
    }

    #[test]
    fn test_user_messages() {
        let config = ApiConfig::default();
        let rate = ApiError::RateLimit { attempts: 4, message: String::new() };
        assert_eq!(
            user_message(&rate, &config),
            "Rate limited by the API. Wait at least 60 seconds and try again."
        );
        assert!(user_message(&ApiError::Auth("x".to_string()), &config).contains("rejected"));
        assert!(user_message(&ApiError::Server { status: 503, message: String::new() }, &config).contains("503"));
    }

    #[test]
    fn test_retry_notice_text() {
        let notice = retry_notice(&RetryAttempt {
            attempt: 2,
            max_retries: 3,
            delay_ms: 4_000,
            reason: RetryReason::Overloaded,
        });
        assert_eq!(notice, "API overloaded, retrying in 4s (2/3)");
    }

    #[test]
    fn test_closed_popup_does_not_lock_the_tab() {
        let first = harness();
        block_on(first.coordinator.observe_tab(7, URL, "Clip"));
        block_on(first.coordinator.store().set_processing(7, true, Some(STEP_EXTRACTING)));
        let (storage, clock) = (first.storage.clone(), first.clock.clone());
        drop(first);

        clock.advance(3.0 * 3_600_000.0);
        let reopened = harness_on(storage, clock);
        let state = block_on(reopened.coordinator.observe_tab(7, URL, "Clip"));

        assert!(!matches!(state.status(), PanelStatus::Processing { .. }));
        assert!(matches!(state.status(), PanelStatus::Failed { .. }));

        reopened.channel.reply(Ok(ContentResponse::Transcript {
            transcript: transcript(vec![TranscriptSegment::new("0:00", "hello again")]),
        }));
        let state = block_on(reopened.coordinator.extract_for_tab(7));
        assert_eq!(state.status(), PanelStatus::TranscriptReady { segments: 1 });
    }

    #[test]
    fn test_clear() {
        let h = harness();
        extracted(&h);
        block_on(h.coordinator.observe_tab(8, "https://youtu.be/aaaaaaaaaaa", "Other"));

        block_on(h.coordinator.clear_tab(7));
        assert_eq!(block_on(h.coordinator.store().tab_ids()), vec![8]);

        block_on(h.coordinator.clear_all());
        assert!(block_on(h.coordinator.store().tab_ids()).is_empty());
    }
}
