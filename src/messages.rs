/// Messages between the popup and the content script
use serde::{Deserialize, Serialize};

use crate::transcript::Transcript;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentRequest {
    Ping,
    ExtractTranscript,
    GetVideoInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentResponse {
    /// `ready` is the page readiness predicate, not just "script loaded"
    Pong { ready: bool },
    Transcript { transcript: Transcript },
    VideoInfo { url: String, title: String },
    Error { message: String },
}

impl ContentResponse {
    pub fn error(message: impl Into<String>) -> ContentResponse {
        ContentResponse::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{ExtractionSource, TranscriptSegment};
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        assert_eq!(serde_json::to_value(ContentRequest::Ping).unwrap(), json!({ "type": "ping" }));
        assert_eq!(
            serde_json::from_value::<ContentRequest>(json!({ "type": "extractTranscript" })).unwrap(),
            ContentRequest::ExtractTranscript
        );
    }

    #[test]
    fn test_unknown_request_is_rejected() {
        assert!(serde_json::from_value::<ContentRequest>(json!({ "type": "summarize" })).is_err());
        assert!(serde_json::from_value::<ContentRequest>(json!({ "action": "ping" })).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let transcript = Transcript::new(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            "Title".to_string(),
            5.0,
            ExtractionSource::Captions,
            vec![TranscriptSegment::indexed(0, "hello")],
        );
        let value = serde_json::to_value(ContentResponse::Transcript { transcript }).unwrap();

        assert_eq!(value["type"], "transcript");
        assert_eq!(value["transcript"]["videoTitle"], "Title");
        assert_eq!(value["transcript"]["source"], "captions");
        assert_eq!(value["transcript"]["segments"][0]["timestamp"], "#0");

        let pong = serde_json::to_value(ContentResponse::Pong { ready: true }).unwrap();
        assert_eq!(pong, json!({ "type": "pong", "ready": true }));
        let error = serde_json::to_value(ContentResponse::error("boom")).unwrap();
        assert_eq!(error, json!({ "type": "error", "message": "boom" }));
    }
}
