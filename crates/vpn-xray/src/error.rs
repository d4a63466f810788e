//! Error types for talking to the Xray admin API.

use thiserror::Error;

/// Result type alias for Xray admin operations.
pub type Result<T> = std::result::Result<T, XrayError>;

/// Errors that can occur while driving the remote Xray admin panel.
#[derive(Debug, Error)]
pub enum XrayError {
    /// Login failed at construction time — fatal, since nothing downstream
    /// can function without an authenticated session.
    #[error("login to xray admin API failed: {0}")]
    LoginFailed(String),

    /// The session expired and re-login also failed.
    #[error("session expired and re-login failed: {0}")]
    ReauthFailed(String),

    /// The admin API returned a non-success status.
    #[error("xray admin API returned {status} for {operation}: {body}")]
    ApiError {
        /// The HTTP status code.
        status: u16,
        /// The operation being attempted (e.g. "add_peers").
        operation: &'static str,
        /// The response body, for diagnostics.
        body: String,
    },

    /// A response body didn't match the expected shape.
    #[error("malformed response from xray admin API during {0}")]
    MalformedResponse(&'static str),

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
