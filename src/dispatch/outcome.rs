//! Per-integration dispatch outcomes and fan-out reports.
//!
//! One fan-out produces one [`IntegrationOutcome`] per target; the
//! [`DispatchReport`] bundles them with the request id and timing. The
//! report is what callers ack on, so it carries everything an operator
//! needs to see which integration did what.

use crate::types::{RequestId, TeamId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Outcome Types
// =============================================================================

/// How one integration's invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Handler ran and produced an artifact
    Processed,
    /// Handler ran and declined the event
    Skipped,
    /// Integration does not provide this capability
    NotImplemented,
    /// Capability declared but the locator could not bind it
    ResolutionFailed,
    /// Handler returned an error
    Failed,
    /// Handler panicked inside its task
    Panicked,
    /// Handler exceeded the per-integration deadline
    TimedOut,
}

impl OutcomeKind {
    /// Whether the integration actually did useful work.
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeKind::Processed | OutcomeKind::Skipped)
    }
}

/// Result of one integration invocation within a fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationOutcome {
    /// Canonical integration name.
    pub integration: String,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl IntegrationOutcome {
    pub fn new(integration: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            integration: integration.into(),
            kind,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

// =============================================================================
// Fan-out Report
// =============================================================================

/// Everything that happened while fanning one event out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub request_id: RequestId,
    pub event_kind: String,
    pub team: TeamId,
    pub object_key: String,
    pub outcomes: Vec<IntegrationOutcome>,
    pub duration_ms: i64,
}

impl DispatchReport {
    pub fn processed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind == OutcomeKind::Processed)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.kind.is_success()).count()
    }

    pub fn outcome_for(&self, integration: &str) -> Option<&IntegrationOutcome> {
        self.outcomes.iter().find(|o| o.integration == integration)
    }
}

// =============================================================================
// Cumulative Statistics
// =============================================================================

/// Engine-lifetime dispatch counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub events_dispatched: u64,
    pub integrations_invoked: u64,
    pub processed: u64,
    pub skipped: u64,
    pub not_implemented: u64,
    pub resolution_failed: u64,
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
}

impl DispatchStats {
    /// Fold one fan-out report into the counters.
    pub fn record(&mut self, report: &DispatchReport) {
        self.events_dispatched += 1;
        for outcome in &report.outcomes {
            self.integrations_invoked += 1;
            match outcome.kind {
                OutcomeKind::Processed => self.processed += 1,
                OutcomeKind::Skipped => self.skipped += 1,
                OutcomeKind::NotImplemented => self.not_implemented += 1,
                OutcomeKind::ResolutionFailed => self.resolution_failed += 1,
                OutcomeKind::Failed => self.failed += 1,
                OutcomeKind::Panicked => self.panicked += 1,
                OutcomeKind::TimedOut => self.timed_out += 1,
            }
        }
    }
}
