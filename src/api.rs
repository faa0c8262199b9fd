/// Anthropic Messages API client for key points and articles
use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::prompts::{article_prompt, key_points_prompt};
use crate::transcript::Transcript;

const CREDENTIAL_PREFIX: &str = "sk-ant-";
const CREDENTIAL_MIN_LEN: usize = 20;

/// Syntactic check only; `test_credential` is the live check
pub fn is_valid_credential_format(candidate: &str) -> bool {
    let candidate = candidate.trim();
    candidate.starts_with(CREDENTIAL_PREFIX) && candidate.len() >= CREDENTIAL_MIN_LEN
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// POST a JSON body; connection-level failures come back as `ApiError::Network`
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &Value,
    ) -> Result<HttpResponse, ApiError>;
}

/// reqwest transport; uses `fetch` when built for wasm32
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ReqwestTransport {
        ReqwestTransport::default()
    }
}

impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &Value,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Overloaded,
    RateLimited,
}

/// Emitted before each backoff sleep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based retry number
    pub attempt: u32,
    pub max_retries: u32,
    pub delay_ms: u32,
    pub reason: RetryReason,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn error_message(response: &HttpResponse) -> String {
    serde_json::from_str::<ErrorEnvelope>(&response.body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", response.status))
}

fn response_text(body: &str) -> Result<String, ApiError> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    parsed
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidResponse("response has no text content".to_string()))
}

type RetryObserver = Box<dyn Fn(&RetryAttempt)>;

/// Stateless apart from the cached credential
pub struct AnthropicClient<T, C> {
    transport: T,
    clock: C,
    config: ApiConfig,
    credential: RefCell<Option<String>>,
    on_retry: Option<RetryObserver>,
}

impl<T: HttpTransport, C: Clock> AnthropicClient<T, C> {
    pub fn new(transport: T, clock: C, config: ApiConfig) -> Self {
        AnthropicClient {
            transport,
            clock,
            config,
            credential: RefCell::new(None),
            on_retry: None,
        }
    }

    /// Observe retries, e.g. to tell the user the API is busy
    pub fn set_retry_observer(&mut self, observer: impl Fn(&RetryAttempt) + 'static) {
        self.on_retry = Some(Box::new(observer));
    }

    pub fn set_credential(&self, credential: Option<String>) {
        let credential = credential
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        *self.credential.borrow_mut() = credential;
    }

    pub fn has_credential(&self) -> bool {
        self.credential.borrow().is_some()
    }

    fn credential(&self) -> Result<String, ApiError> {
        self.credential.borrow().clone().ok_or(ApiError::Configuration)
    }

    pub async fn extract_key_points(&self, transcript: &Transcript) -> Result<String, ApiError> {
        let credential = self.credential()?;
        if transcript.is_empty() {
            return Err(ApiError::Input("transcript has no segments".to_string()));
        }

        log::info!("Requesting key points for \"{}\"", transcript.video_title);
        let prompt = key_points_prompt(transcript);
        self.complete(&credential, &prompt, self.config.key_points_max_tokens)
            .await
    }

    pub async fn generate_article(&self, key_points: &str, transcript: &Transcript) -> Result<String, ApiError> {
        let credential = self.credential()?;
        if key_points.trim().is_empty() {
            return Err(ApiError::Input("key points are missing".to_string()));
        }
        if transcript.is_empty() {
            return Err(ApiError::Input("transcript has no segments".to_string()));
        }

        log::info!("Requesting article for \"{}\"", transcript.video_title);
        let prompt = article_prompt(key_points, transcript);
        self.complete(&credential, &prompt, self.config.article_max_tokens)
            .await
    }

    /// Live check of `candidate` with a minimal request, no retries
    pub async fn test_credential(&self, candidate: &str) -> Result<bool, ApiError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(ApiError::Configuration);
        }

        let body = self.request_body("Hi", 10);
        let response = self
            .transport
            .post_json(&self.config.endpoint, &self.headers(candidate), &body)
            .await?;

        if !response.is_success() {
            return Err(ApiError::from_status(response.status, error_message(&response), 1));
        }
        Ok(serde_json::from_str::<MessagesResponse>(&response.body).is_ok())
    }

    fn headers(&self, credential: &str) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", credential.to_string()),
            ("anthropic-version", self.config.api_version.clone()),
            ("content-type", "application/json".to_string()),
            ("anthropic-dangerous-direct-browser-access", "true".to_string()),
        ]
    }

    fn request_body(&self, prompt: &str, max_tokens: u32) -> Value {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        serde_json::to_value(request).unwrap_or(Value::Null)
    }

    /// One request with exponential backoff on 529 and 429; everything else is terminal
    async fn complete(&self, credential: &str, prompt: &str, max_tokens: u32) -> Result<String, ApiError> {
        let body = self.request_body(prompt, max_tokens);
        let headers = self.headers(credential);
        let mut retries = 0;

        loop {
            let response = self
                .transport
                .post_json(&self.config.endpoint, &headers, &body)
                .await?;

            if response.is_success() {
                return response_text(&response.body);
            }

            let reason = match response.status {
                529 => Some(RetryReason::Overloaded),
                429 => Some(RetryReason::RateLimited),
                _ => None,
            };

            match reason {
                Some(reason) if retries < self.config.max_retries => {
                    let base = match reason {
                        RetryReason::Overloaded => self.config.overload_base_delay_ms,
                        RetryReason::RateLimited => self.config.rate_limit_base_delay_ms,
                    };
                    let delay_ms = base.saturating_mul(1 << retries.min(16));
                    retries += 1;

                    let attempt = RetryAttempt {
                        attempt: retries,
                        max_retries: self.config.max_retries,
                        delay_ms,
                        reason,
                    };
                    log::warn!(
                        "API returned {}, retry {}/{} in {}ms",
                        response.status, attempt.attempt, attempt.max_retries, delay_ms
                    );
                    if let Some(observer) = &self.on_retry {
                        observer(&attempt);
                    }
                    self.clock.sleep(delay_ms).await;
                }
                _ => {
                    let message = error_message(&response);
                    log::error!("API request failed with {}: {}", response.status, message);
                    return Err(ApiError::from_status(response.status, message, retries + 1));
                }
            }
        }
    }
}

/// Transport that replays canned responses and records requests
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub url: String,
        pub headers: Vec<(&'static str, String)>,
        pub body: Value,
    }

    #[derive(Clone, Default)]
    pub struct ScriptedTransport {
        responses: Rc<RefCell<VecDeque<Result<HttpResponse, ApiError>>>>,
        requests: Rc<RefCell<Vec<RecordedRequest>>>,
    }

    impl ScriptedTransport {
        pub fn new() -> ScriptedTransport {
            ScriptedTransport::default()
        }

        pub fn respond(&self, status: u16, body: &str) -> &Self {
            self.responses.borrow_mut().push_back(Ok(HttpResponse {
                status,
                body: body.to_string(),
            }));
            self
        }

        pub fn respond_text(&self, text: &str) -> &Self {
            let body = serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "text", "text": text }],
            });
            self.respond(200, &body.to_string())
        }

        pub fn fail(&self, error: ApiError) -> &Self {
            self.responses.borrow_mut().push_back(Err(error));
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.borrow().clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        async fn post_json(
            &self,
            url: &str,
            headers: &[(&'static str, String)],
            body: &Value,
        ) -> Result<HttpResponse, ApiError> {
            self.requests.borrow_mut().push(RecordedRequest {
                url: url.to_string(),
                headers: headers.to_vec(),
                body: body.clone(),
            });
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("no scripted response".to_string())))
        }
    }
}
