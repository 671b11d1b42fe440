//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. The enum doubles as the dispatch
//! taxonomy: the orchestrator pattern-matches on kinds instead of catching
//! exceptions, and single-target operations serialize kinds into the
//! structured error body.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the gateway engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed inbound payloads and bad arguments (HTTP 400).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Capability not provided by the integration (HTTP 501).
    /// A routing outcome, not a fault: fan-out records it and moves on.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Plugin wiring defect during resolution (HTTP 500).
    /// Logged with the offending namespace and treated as absence.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Expired or unrefreshable credentials (HTTP 401).
    #[error("token error: {0}")]
    Token(String),

    /// The remote integration rejected or failed the operation (HTTP 502).
    #[error("integration error: {0}")]
    Integration(String),

    /// Per-integration dispatch budget exceeded (HTTP 504).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Registry/persistence failure; the integration counts as unavailable
    /// (HTTP 503).
    #[error("repository error: {0}")]
    Repository(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport errors (boxed to reduce Result size).
    #[error("http error: {0}")]
    Http(#[from] Box<reqwest::Error>),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Everything else. Classified as UNKNOWN_ERROR and never shown raw.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code for the structured error body.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::NotImplemented(_) => 501,
            Error::Resolution(_) => 500,
            Error::Token(_) => 401,
            Error::Integration(_) => 502,
            Error::Timeout(_) => 504,
            Error::Repository(_) => 503,
            Error::Serialization(_) => 400,
            Error::Http(_) => 502,
            Error::Io(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable kind label used as `error.type` on the wire.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::NotImplemented(_) => "NOT_IMPLEMENTED",
            Error::Resolution(_) => "RESOLUTION_ERROR",
            Error::Token(_) => "TOKEN_ERROR",
            Error::Integration(_) => "INTEGRATION_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::Repository(_) => "REPOSITORY_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "UNKNOWN_ERROR",
        }
    }

    /// Convert to the single-target response body.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            http_status_code: self.http_status(),
            error: ErrorDetail {
                kind: self.kind_label().to_string(),
                description: self.to_string(),
            },
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    pub fn token(msg: impl Into<String>) -> Self {
        Self::Token(msg.into())
    }

    pub fn integration(msg: impl Into<String>) -> Self {
        Self::Integration(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Structured error payload returned by single-target operations.
///
/// Fan-out endpoints never produce this: they acknowledge success whenever
/// the event itself parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub http_status_code: u16,
    pub error: ErrorDetail,
}

/// Kind and human-readable description inside [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        err.to_error_body()
    }
}
