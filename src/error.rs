//! Concierge error types

use std::time::Duration;

/// Concierge error types
///
/// The enum is `Clone` so a single failed cache fill can be handed, unchanged,
/// to every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConciergeError {
    // Control-layer errors
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The caller's own deadline passed while waiting on an in-flight
    /// computation. The computation itself keeps running.
    #[error("timed out after {0:?} waiting for an in-flight computation")]
    Timeout(Duration),

    /// The task driving an in-flight computation ended without a result
    /// (it panicked or the runtime shut down).
    #[error("in-flight computation was abandoned")]
    ComputeAbandoned,

    // Collaborator errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("search error: {0}")]
    Search(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ConciergeError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http(_) | Self::Timeout(_) => true,
            Self::ComputeAbandoned => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Server- or limiter-provided hint for when to retry.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConciergeError {
    fn from(err: serde_json::Error) -> Self {
        ConciergeError::Json(err.to_string())
    }
}

/// Result type alias for Concierge operations
pub type Result<T> = std::result::Result<T, ConciergeError>;
