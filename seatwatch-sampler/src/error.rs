//! Error types for seatwatch-sampler
//!
//! Per-item failures (one showing, one probe, one measurement) are caught at
//! the smallest scope and turned into report counters. These types describe
//! what went wrong; they only escape a stage when the stage itself failed.

use thiserror::Error;

/// Failure reported by a provider collaborator
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the vendor
    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    /// Response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider lacks the requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ProviderError::Http(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Sampler error type
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Store query or commit failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// seatwatch-common error
    #[error("Common error: {0}")]
    Common(#[from] seatwatch_common::Error),

    /// Provider probe failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A showing could not be mapped to a provider
    #[error("Classification failed: {0}")]
    Classification(String),

    /// Credential fetch for a venue failed
    #[error("Credential fetch for venue {venue_id} failed: {source}")]
    Credential {
        venue_id: i64,
        #[source]
        source: ProviderError,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for sampler operations
pub type SamplerResult<T> = Result<T, SamplerError>;
