/// Error taxonomy for the extension core
use thiserror::Error;

/// Failures from the Anthropic API client
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("No API key configured")]
    Configuration,

    #[error("Missing input: {0}")]
    Input(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Rate limited after {attempts} attempts: {message}")]
    RateLimit { attempts: u32, message: String },

    #[error("API overloaded after {attempts} attempts: {message}")]
    Overload { attempts: u32, message: String },

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Map a terminal HTTP status to a domain error.
    ///
    /// 429 and 529 land here only once retries are exhausted.
    pub fn from_status(status: u16, message: String, attempts: u32) -> ApiError {
        match status {
            401 => ApiError::Auth(message),
            403 => ApiError::Permission(message),
            429 => ApiError::RateLimit { attempts, message },
            529 => ApiError::Overload { attempts, message },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Rejected { status, message },
        }
    }

    /// Transient provider errors worth a later retry by the user
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimit { .. }
                | ApiError::Overload { .. }
                | ApiError::Server { .. }
                | ApiError::Network(_)
        )
    }
}

/// Failures from the persistence backend
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Failures from DOM queries and simulated interaction
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Node detached from document")]
    Detached,

    #[error("Interaction failed: {0}")]
    Interaction(String),
}

/// Failures delivering a message to a tab's content script
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Page not reachable: {0}")]
    Unreachable(String),

    #[error("Malformed page response: {0}")]
    Malformed(String),
}

/// Failures saving the API credential
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    #[error("API key should start with sk-ant- and be at least 20 characters")]
    Format,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_terminal_codes() {
        assert_eq!(
            ApiError::from_status(401, "bad key".to_string(), 1),
            ApiError::Auth("bad key".to_string())
        );
        assert_eq!(
            ApiError::from_status(403, "nope".to_string(), 1),
            ApiError::Permission("nope".to_string())
        );
        assert_eq!(
            ApiError::from_status(400, "bad".to_string(), 1),
            ApiError::Rejected { status: 400, message: "bad".to_string() }
        );
        assert_eq!(
            ApiError::from_status(502, "gateway".to_string(), 1),
            ApiError::Server { status: 502, message: "gateway".to_string() }
        );
    }

    #[test]
    fn test_from_status_exhausted_retries() {
        let err = ApiError::from_status(529, "Overloaded".to_string(), 4);
        assert_eq!(err, ApiError::Overload { attempts: 4, message: "Overloaded".to_string() });
        assert!(err.to_string().contains("4 attempts"));

        let err = ApiError::from_status(429, "slow down".to_string(), 4);
        assert!(matches!(err, ApiError::RateLimit { attempts: 4, .. }));
    }

    #[test]
    fn test_is_transient() {
        assert!(ApiError::Network("dns".to_string()).is_transient());
        assert!(ApiError::Overload { attempts: 4, message: String::new() }.is_transient());
        assert!(!ApiError::Auth("x".to_string()).is_transient());
        assert!(!ApiError::Configuration.is_transient());
        assert!(!ApiError::Input("empty".to_string()).is_transient());
    }

    #[test]
    fn test_storage_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
