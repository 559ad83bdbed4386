//! Error types for guide operations.
//!
//! This module defines [`EpgError`] which covers all error cases that can occur
//! when fetching, parsing, caching or rendering guide data.

use thiserror::Error;

/// Errors that can occur during guide operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EpgError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with a non-success status code.
    #[error("HTTP {status} for {url}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The requested URL.
        url: String,
    },

    /// Rate limit exceeded by the provider.
    #[error("Rate limited by {provider}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
    },

    /// The requested resource does not exist on the remote service.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A fetched payload does not have the expected shape.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Error interacting with the cache. Always fatal for a run.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The run was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Failure talking to the TV backend (channel source or XMLTV sink).
    #[error("Backend error: {0}")]
    Backend(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl EpgError {
    /// Returns true if retrying the failed operation may succeed.
    ///
    /// Transport failures, malformed payloads, rate limiting and server side
    /// (5xx) errors are transient. Cache failures, missing resources and client
    /// errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::MalformedData(_) | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::Cancelled)
    }
}

/// Result type alias using [`EpgError`].
pub type Result<T> = std::result::Result<T, EpgError>;
