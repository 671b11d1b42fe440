//! Status classification — raw probe results to reportable health.
//!
//! Probes return `Result<bool>`; callers get a [`StatusReport`]. The
//! classification is deliberately coarse:
//!   - `TOKEN_ERROR` keeps the probe's own message, since the operator
//!     fix (re-authorize) depends on it
//!   - `INTEGRATION_ERROR` keeps the message too; the remote side is at
//!     fault
//!   - everything else collapses to `UNKNOWN_ERROR` with a fixed generic
//!     message, so internal details never leak to the caller

use crate::types::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message attached to unclassifiable failures. The real error stays in
/// the logs.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unknown error occurred";

/// Reported health of one integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationHealth {
    Ok,
    TokenError,
    IntegrationError,
    UnknownError,
}

impl IntegrationHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationHealth::Ok => "OK",
            IntegrationHealth::TokenError => "TOKEN_ERROR",
            IntegrationHealth::IntegrationError => "INTEGRATION_ERROR",
            IntegrationHealth::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for IntegrationHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a status check reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: IntegrationHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn ok() -> Self {
        Self {
            status: IntegrationHealth::Ok,
            message: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == IntegrationHealth::Ok
    }
}

/// Classify a probe result into a report.
pub fn classify(result: Result<bool, Error>) -> StatusReport {
    match result {
        Ok(true) => StatusReport::ok(),
        Ok(false) => StatusReport {
            status: IntegrationHealth::IntegrationError,
            message: Some("integration reported itself unreachable".to_string()),
        },
        Err(err) => classify_error(&err),
    }
}

/// Classify a probe error without consuming it.
pub fn classify_error(err: &Error) -> StatusReport {
    match err {
        Error::Token(msg) => StatusReport {
            status: IntegrationHealth::TokenError,
            message: Some(msg.clone()),
        },
        Error::Integration(msg) => StatusReport {
            status: IntegrationHealth::IntegrationError,
            message: Some(msg.clone()),
        },
        Error::Timeout(msg) => StatusReport {
            status: IntegrationHealth::IntegrationError,
            message: Some(msg.clone()),
        },
        Error::Http(e) => StatusReport {
            status: IntegrationHealth::IntegrationError,
            message: Some(e.to_string()),
        },
        _ => StatusReport {
            status: IntegrationHealth::UnknownError,
            message: Some(GENERIC_FAILURE_MESSAGE.to_string()),
        },
    }
}
