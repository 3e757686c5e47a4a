//! Error types for the gatherline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only [`Error::Config`] is ever meant to reach an end user: cache and
//! source errors are recovered locally (treated as a miss, or turned into a
//! [`crate::SourceOutcome::Failed`] result) at the crate that produced them.

use thiserror::Error;

/// The top-level error type for all gatherline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Source errors ---
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // --- Configuration / contract errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache backend unreachable: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Cache value could not be (de)serialized: {0}")]
    Serialization(String),

    #[error("Cache liveness probe failed: {0}")]
    ProbeFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed upstream response: {0}")]
    InvalidResponse(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),
}
