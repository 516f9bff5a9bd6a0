//! Error types for completion clients.

use thiserror::Error;

/// Why a completion request produced no reply.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider answered with a non-success status.
    #[error("completion API returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The response did not contain reply text where expected.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    /// No API credential is configured for a provider that needs one.
    #[error("no API key configured")]
    MissingCredential,
    /// The client could not be built from its configuration.
    #[error("invalid completion configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result alias for completion requests.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Longest error body kept in [`CompletionError::HttpStatus`].
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 300;

/// Shorten a provider error body for display.
pub(crate) fn truncate_body(body: &str) -> String {
    body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect()
}
