//! Error types for the card rendering services.

use thiserror::Error;

/// Result type alias using CardError.
pub type CardResult<T> = Result<T, CardError>;

/// Primary error type for locking, caching and rendering operations.
#[derive(Debug, Clone, Error)]
pub enum CardError {
    // === Lock / Cache Errors ===
    #[error("Timed out after {timeout_ms}ms waiting for lock '{key}'")]
    LockTimeout { key: String, timeout_ms: u64 },

    #[error("Cancelled while waiting for '{0}'")]
    Cancelled(String),

    /// Release of a key that has no live entry. Always a programming error.
    #[error("Lock state error for '{key}': {message}")]
    LockState { key: String, message: String },

    #[error("Failed to load '{key}': {message}")]
    LoadFailed { key: String, message: String },

    // === Request Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Asset Errors ===
    #[error("Failed to fetch '{url}': {message}")]
    FetchFailed { url: String, message: String },

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl CardError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            CardError::InvalidRequest(_) => 400,
            CardError::NotFound(_) => 404,
            CardError::FetchFailed { .. } => 502,
            CardError::LockTimeout { .. } => 503,
            // Client went away or the request deadline passed
            CardError::Cancelled(_) => 499,
            _ => 500,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CardError::LockTimeout { .. } | CardError::FetchFailed { .. } | CardError::Cancelled(_)
        )
    }
}

impl From<std::io::Error> for CardError {
    fn from(err: std::io::Error) -> Self {
        CardError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CardError {
    fn from(err: serde_json::Error) -> Self {
        CardError::InvalidRequest(format!("JSON error: {}", err))
    }
}
