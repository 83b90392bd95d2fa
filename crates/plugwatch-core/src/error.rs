//! Error types for plugwatch-core.
//!
//! # Recovery strategies
//!
//! Different errors call for different handling in the control loops:
//!
//! | Error | Strategy | Rationale |
//! |-------|----------|-----------|
//! | [`Error::Transport`] | Retry on the next poll tick | Transient network failure |
//! | [`Error::AccessDenied`] | Notify once, suppress until cleared | Persists until the caller address is whitelisted |
//! | [`Error::Api`] | Retry on the next poll tick | Backend-side rejection, often transient |
//! | [`Error::InvalidResponse`] | Retry on the next poll tick | Treat like any other failed poll |
//! | [`Error::Unsupported`] | Do not retry | The backend mode cannot perform this operation |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! No failure is retried within a tick; the loops rely on the next poll
//! coming around (retry-by-recurrence).

use thiserror::Error;

/// Errors that can occur when talking to a plug backend.
///
/// Marked `#[non_exhaustive]` to allow adding new variants without breaking
/// downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// HTTP transport failure (connect, timeout, decode).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend rejected the caller's network address.
    ///
    /// `detail` carries the raw backend message, which usually embeds the
    /// rejected address, e.g. `your ip(203.0.113.9) don't be allowed to
    /// access this API`.
    #[error("API access denied: {message}")]
    AccessDenied { message: String, detail: String },

    /// The backend returned an application-level error.
    #[error("backend error {code}: {message}")]
    Api { code: i64, message: String },

    /// The response body did not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The backend mode cannot perform this operation.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Invalid backend configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an access-denied error from the backend's raw message.
    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: "caller address not authorized".to_string(),
            detail: detail.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this is an access-denied rejection.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

/// Result type alias using plugwatch-core's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
