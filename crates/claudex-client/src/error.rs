//! Error types
//!
//! Typed errors for the stream, storage, and backend API boundaries.
//! Event-log parsing deliberately has no error type: malformed persisted
//! content is recovered locally by the codec and never surfaced.

use thiserror::Error;

/// Errors surfaced through a stream's error callback.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The backend reported a failure while producing the completion.
    #[error("error processing completion stream: {message}")]
    Processing { message: String },

    /// The underlying connection dropped without a structured error.
    #[error("stream connection error")]
    Connection,

    /// A backend API call made on behalf of the stream failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors from the backend HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(reqwest::StatusCode),
}
