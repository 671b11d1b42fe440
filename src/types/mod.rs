//! Core types for the gateway engine.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (TeamId, CallId, etc.)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for dispatch, HTTP, and history

mod config;
mod errors;
mod ids;

pub use config::{Config, DispatchConfig, HistoryConfig, HttpClientConfig, ObservabilityConfig};
pub use errors::{Error, ErrorBody, ErrorDetail, Result};
pub use ids::{AgentId, CallId, ConversationId, MessageId, RequestId, TeamId};
