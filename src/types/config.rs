//! Configuration structures.
//!
//! Configuration is loaded from a JSON file (or built in code) with every
//! section defaulting to production-safe values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Global gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Dispatch orchestrator configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Outbound HTTP client configuration.
    #[serde(default)]
    pub http: HttpClientConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Object history retention.
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::types::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Dispatch orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Wall-clock budget per integration invocation. A slow remote API
    /// counts as that integration's failure only.
    #[serde(with = "humantime_serde")]
    pub integration_timeout: Duration,

    /// Upper bound on integrations visited per event.
    pub max_integrations_per_event: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            integration_timeout: Duration::from_secs(5),
            max_integrations_per_event: 50,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// End-to-end request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent to integration APIs.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "switchboard-gateway/0.3".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Object history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum retained history rows (oldest evicted first).
    pub max_entries: usize,

    /// Rows older than this are removed by the retention sweep.
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}
