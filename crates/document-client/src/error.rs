//! Error types for the document store client.

use thiserror::Error;
use tripsync_core::StoreError;

/// Result type alias for document store operations.
pub type Result<T> = std::result::Result<T, DocumentStoreError>;

/// Retry policy class for API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
}

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the document server
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DocumentStoreError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server could not be reached or is not serving.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => matches!(self.status_code(), Some(502..=504)),
        }
    }

    /// Classify error for retry policy. A long-poll that times out on the
    /// server side comes back as 408 or 504 and is simply retried.
    pub fn retry_class(&self) -> ApiRetryClass {
        match (self, self.status_code()) {
            (Self::Http(_), _) => ApiRetryClass::Retryable,
            (_, Some(408 | 409 | 423 | 425 | 429 | 500..=599)) => ApiRetryClass::Retryable,
            _ => ApiRetryClass::Permanent,
        }
    }
}

impl From<DocumentStoreError> for StoreError {
    fn from(err: DocumentStoreError) -> Self {
        if err.is_unavailable() {
            return match err {
                DocumentStoreError::Api { message, .. } => StoreError::Unavailable(message),
                other => StoreError::Unavailable(other.to_string()),
            };
        }
        match err {
            DocumentStoreError::Json(e) => StoreError::Malformed(e.to_string()),
            other => StoreError::Request(other.to_string()),
        }
    }
}
