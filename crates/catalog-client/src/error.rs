//! Error types for catalog-client

use std::time::Duration;

use thiserror::Error;

/// Errors returned by catalog operations.
///
/// The variants partition failures by what the caller should do next:
/// stop the run, retry the request, or record the item as failed and move on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The access token was rejected
    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },

    /// Timeout, connection failure, 5xx or rate limiting
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The catalog refused this particular item (validation, deleted product)
    #[error("item rejected: {reason}")]
    Item { reason: String },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// HTTP client could not be constructed
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl ClientError {
    pub fn transient(message: impl Into<String>) -> Self {
        ClientError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn item(reason: impl Into<String>) -> Self {
        ClientError::Item {
            reason: reason.into(),
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient { .. })
    }

    /// Server-provided hint for how long to wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if err.is_builder() {
            ClientError::Setup(err.to_string())
        } else {
            // timeouts, refused connections, resets and truncated bodies
            ClientError::transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ClientError::transient("timed out").is_retryable());
        assert!(!ClientError::Auth { status: 401 }.is_retryable());
        assert!(!ClientError::item("product deleted").is_retryable());
        assert!(!ClientError::Decode("missing data".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_on_transient() {
        let err = ClientError::Transient {
            message: "HTTP 429".into(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(ClientError::item("x").retry_after(), None);
    }

    #[test]
    fn display_includes_reason() {
        let err = ClientError::item("insufficient_images");
        assert!(err.to_string().contains("insufficient_images"));
    }
}
