//! Event fan-out — resolve targets, invoke handlers, isolate failures.
//!
//! The Dispatcher:
//!   - Resolves an event's targets through the registry (empty target
//!     list means all enabled integrations of the team)
//!   - Invokes each integration's handler in its own task under its own
//!     deadline
//!   - Contains errors, panics, and timeouts per integration; siblings
//!     always run
//!   - Records produced artifacts in object history, keyed by
//!     (object, team, integration)
//!
//! Fan-out acks the event regardless of per-integration results. The
//! only hard failure before fan-out is the registry being unreachable;
//! that surfaces as a repository error so the caller can retry.

pub mod outcome;

pub use outcome::{DispatchReport, DispatchStats, IntegrationOutcome, OutcomeKind};

use crate::capability::{CapabilityKind, ContactOwner, ContactQuery, EventArtifact};
use crate::event::enums::MessageChannel;
use crate::event::Event;
use crate::integration::configuration::{KEY_OMNICHANNEL_CHANNELS, KEY_SMART_ROUTING};
use crate::locator::{panic_message, PluginCatalog};
use crate::registry::history::{HistoryKey, ObjectHistory};
use crate::registry::{IntegrationRecord, IntegrationRegistry};
use crate::types::{DispatchConfig, Error, RequestId, Result, TeamId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::timeout;

// =============================================================================
// Dispatcher
// =============================================================================

/// Fans events out to the integrations they target.
pub struct Dispatcher {
    catalog: Arc<PluginCatalog>,
    registry: Arc<dyn IntegrationRegistry>,
    history: Arc<dyn ObjectHistory>,
    config: DispatchConfig,
    stats: Arc<RwLock<DispatchStats>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish()
    }
}

/// How a single spawned handler invocation ended.
enum Invocation {
    Done(Option<EventArtifact>),
    Failed(Error),
    Panicked(String),
    TimedOut,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<PluginCatalog>,
        registry: Arc<dyn IntegrationRegistry>,
        history: Arc<dyn ObjectHistory>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            history,
            config,
            stats: Arc::new(RwLock::new(DispatchStats::default())),
        }
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Snapshot of the cumulative counters.
    pub async fn stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }

    // =============================================================================
    // Fan-out
    // =============================================================================

    /// Dispatch one event to every integration it targets.
    ///
    /// Returns a report with one outcome per integration. Per-integration
    /// failures are recorded in the report, not raised; the only error
    /// path is the registry being unavailable.
    pub async fn dispatch_event(&self, event: &Event) -> Result<DispatchReport> {
        let started = Instant::now();
        let request_id = RequestId::new();
        let team = event.team().clone();
        let targets = event.target_names();

        let mut records = self
            .registry
            .get_team_integrations(&team, &targets)
            .await
            .map_err(|err| {
                tracing::error!(
                    code = "registry_unavailable",
                    team = %team,
                    error = %err,
                    "cannot resolve fan-out targets"
                );
                Error::repository(format!("integration lookup failed: {err}"))
            })?;

        if records.len() > self.config.max_integrations_per_event {
            tracing::warn!(
                code = "fanout_truncated",
                team = %team,
                targets = records.len(),
                limit = self.config.max_integrations_per_event,
                "fan-out larger than per-event bound"
            );
            records.truncate(self.config.max_integrations_per_event);
        }

        // Channel pre-filter before any handler is resolved
        if let Event::Omnichannel(message) = event {
            records.retain(|record| accepts_channel(record, message.channel));
        }

        tracing::info!(
            code = "dispatch_started",
            request_id = %request_id,
            event = event.kind().as_str(),
            team = %team,
            object = %event.object_key(),
            integrations = records.len(),
            "fanning out"
        );

        let mut outcomes = Vec::with_capacity(records.len());
        for record in &records {
            let (outcome, artifact) = self.invoke_one(record, event).await;
            if let Some(artifact) = artifact {
                self.record_artifact(record, &team, artifact).await;
            }
            outcomes.push(outcome);
        }

        let report = DispatchReport {
            request_id,
            event_kind: event.kind().as_str().to_string(),
            team,
            object_key: event.object_key(),
            outcomes,
            duration_ms: started.elapsed().as_millis() as i64,
        };

        self.stats.write().await.record(&report);

        tracing::info!(
            code = "dispatch_completed",
            request_id = %report.request_id,
            processed = report.processed_count(),
            failed = report.failure_count(),
            duration_ms = report.duration_ms,
            "fan-out done"
        );

        Ok(report)
    }

    /// Invoke one integration's handler for the event. Never errors; the
    /// outcome says how it went.
    async fn invoke_one(
        &self,
        record: &IntegrationRecord,
        event: &Event,
    ) -> (IntegrationOutcome, Option<EventArtifact>) {
        let started = Instant::now();
        let namespace = record.identity().namespace();

        let (capability, invocation) = match event {
            Event::Call(call) => match self.catalog.resolve_process_call(record, None) {
                Some(binding) => {
                    let handler = binding.handler;
                    let ctx = binding.ctx;
                    let call = call.clone();
                    let ran = self
                        .run_isolated(async move { handler.process_call(&ctx, &call).await })
                        .await;
                    (CapabilityKind::ProcessCallEvent, Some(ran))
                }
                None => (CapabilityKind::ProcessCallEvent, None),
            },
            Event::Sms(sms) => match self.catalog.resolve_process_sms(record, None) {
                Some(binding) => {
                    let handler = binding.handler;
                    let ctx = binding.ctx;
                    let sms = sms.clone();
                    let ran = self
                        .run_isolated(async move { handler.process_sms(&ctx, &sms).await })
                        .await;
                    (CapabilityKind::ProcessSmsEvent, Some(ran))
                }
                None => (CapabilityKind::ProcessSmsEvent, None),
            },
            Event::Presence(presence) => {
                match self.catalog.resolve_process_presence(record, None) {
                    Some(binding) => {
                        let handler = binding.handler;
                        let ctx = binding.ctx;
                        let presence = presence.clone();
                        let ran = self
                            .run_isolated(
                                async move { handler.process_presence(&ctx, &presence).await },
                            )
                            .await;
                        (CapabilityKind::ProcessPresenceEvent, Some(ran))
                    }
                    None => (CapabilityKind::ProcessPresenceEvent, None),
                }
            }
            Event::Omnichannel(message) => {
                match self.catalog.resolve_process_omnichannel(record, None) {
                    Some(binding) => {
                        let handler = binding.handler;
                        let ctx = binding.ctx;
                        let message = message.clone();
                        let ran = self
                            .run_isolated(
                                async move { handler.process_omnichannel(&ctx, &message).await },
                            )
                            .await;
                        (CapabilityKind::ProcessOmnichannelEvent, Some(ran))
                    }
                    None => (CapabilityKind::ProcessOmnichannelEvent, None),
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let name = record.canonical_name.clone();

        let (outcome, artifact) = match invocation {
            None => {
                let declared = self
                    .catalog
                    .get(&name)
                    .map(|m| m.capabilities().contains(&capability))
                    .unwrap_or(false);
                if declared {
                    (
                        IntegrationOutcome::new(name, OutcomeKind::ResolutionFailed)
                            .with_error(format!("could not bind {capability}")),
                        None,
                    )
                } else {
                    (IntegrationOutcome::new(name, OutcomeKind::NotImplemented), None)
                }
            }
            Some(Invocation::Done(Some(artifact))) => (
                IntegrationOutcome::new(name, OutcomeKind::Processed),
                Some(artifact),
            ),
            Some(Invocation::Done(None)) => {
                (IntegrationOutcome::new(name, OutcomeKind::Skipped), None)
            }
            Some(Invocation::Failed(err)) => {
                tracing::warn!(
                    code = "dispatch_failure",
                    integration = %namespace,
                    capability = %capability,
                    error = %err,
                    "handler failed; continuing with remaining integrations"
                );
                (
                    IntegrationOutcome::new(name, OutcomeKind::Failed)
                        .with_error(err.to_string()),
                    None,
                )
            }
            Some(Invocation::Panicked(msg)) => {
                tracing::error!(
                    code = "dispatch_panic",
                    integration = %namespace,
                    capability = %capability,
                    panic = %msg,
                    "handler panicked; continuing with remaining integrations"
                );
                (
                    IntegrationOutcome::new(name, OutcomeKind::Panicked).with_error(msg),
                    None,
                )
            }
            Some(Invocation::TimedOut) => {
                tracing::warn!(
                    code = "dispatch_timeout",
                    integration = %namespace,
                    capability = %capability,
                    deadline = ?self.config.integration_timeout,
                    "handler exceeded deadline; continuing with remaining integrations"
                );
                (
                    IntegrationOutcome::new(name, OutcomeKind::TimedOut).with_error(format!(
                        "exceeded {:?} deadline",
                        self.config.integration_timeout
                    )),
                    None,
                )
            }
        };

        (outcome.with_duration_ms(elapsed_ms), artifact)
    }

    /// Run a handler future in its own task under the per-integration
    /// deadline. The task boundary is what turns a panic into a JoinError
    /// instead of unwinding through the fan-out loop.
    async fn run_isolated<F>(&self, fut: F) -> Invocation
    where
        F: Future<Output = Result<Option<EventArtifact>>> + Send + 'static,
    {
        let mut task = tokio::spawn(fut);
        match timeout(self.config.integration_timeout, &mut task).await {
            Ok(Ok(Ok(artifact))) => Invocation::Done(artifact),
            Ok(Ok(Err(err))) => Invocation::Failed(err),
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    Invocation::Panicked(panic_message(join_err.into_panic().as_ref()))
                } else {
                    Invocation::Failed(Error::internal("handler task cancelled"))
                }
            }
            Err(_elapsed) => {
                task.abort();
                Invocation::TimedOut
            }
        }
    }

    async fn record_artifact(
        &self,
        record: &IntegrationRecord,
        team: &TeamId,
        artifact: EventArtifact,
    ) {
        let key = HistoryKey::new(
            artifact.object_key.clone(),
            team.clone(),
            record.canonical_name.clone(),
        );
        // History is best-effort; a failed write never fails the outcome
        if let Err(err) = self.history.upsert(key, artifact.data).await {
            tracing::warn!(
                code = "history_write_failed",
                integration = %record.canonical_name,
                error = %err,
                "artifact not recorded"
            );
        }
    }

    // =============================================================================
    // Contact-owner scan
    // =============================================================================

    /// Ask the team's integrations who owns a contact; first answer wins.
    ///
    /// Integrations are scanned in registry order. One that declines
    /// (`Ok(None)`), fails, panics, or times out is skipped and the scan
    /// moves on. `Ok(None)` from the scan means nobody claimed the contact.
    pub async fn find_contact_owner(
        &self,
        team: &TeamId,
        query: &ContactQuery,
    ) -> Result<Option<ContactOwner>> {
        let records = self
            .registry
            .get_team_integrations(team, &[])
            .await
            .map_err(|err| Error::repository(format!("integration lookup failed: {err}")))?;

        for record in &records {
            if !record.config.bool_or(KEY_SMART_ROUTING, true) {
                continue;
            }
            let binding = match self.catalog.resolve_contact_owner(record, None) {
                Some(binding) => binding,
                None => continue,
            };

            let handler = binding.handler;
            let ctx = binding.ctx;
            let query = query.clone();
            let mut task = tokio::spawn(async move { handler.contact_owner(&ctx, &query).await });

            match timeout(self.config.integration_timeout, &mut task).await {
                Ok(Ok(Ok(Some(mut owner)))) => {
                    owner.integration = record.canonical_name.clone();
                    tracing::info!(
                        code = "contact_owner_found",
                        integration = %record.canonical_name,
                        team = %team,
                        "owner resolved"
                    );
                    return Ok(Some(owner));
                }
                Ok(Ok(Ok(None))) => {}
                Ok(Ok(Err(err))) => {
                    tracing::warn!(
                        code = "contact_owner_failure",
                        integration = %record.canonical_name,
                        error = %err,
                        "lookup failed; trying next integration"
                    );
                }
                Ok(Err(join_err)) => {
                    if join_err.is_panic() {
                        tracing::error!(
                            code = "contact_owner_panic",
                            integration = %record.canonical_name,
                            panic = %panic_message(join_err.into_panic().as_ref()),
                            "lookup panicked; trying next integration"
                        );
                    }
                }
                Err(_elapsed) => {
                    task.abort();
                    tracing::warn!(
                        code = "contact_owner_timeout",
                        integration = %record.canonical_name,
                        "lookup exceeded deadline; trying next integration"
                    );
                }
            }
        }

        Ok(None)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// A record with a configured channel list only receives messages on those
/// channels; no list (or an empty one) means all channels.
fn accepts_channel(record: &IntegrationRecord, channel: MessageChannel) -> bool {
    match record.config.get_str_list(KEY_OMNICHANNEL_CHANNELS) {
        Some(channels) if !channels.is_empty() => channels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(channel.as_str())),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        CapabilityContext, GetContactOwner, ProcessCallEvent, ProcessOmnichannelEvent,
    };
    use crate::event::enums::{CallState, Direction, TargetRole};
    use crate::event::{CallEvent, EventTarget, OmnichannelEvent};
    use crate::integration::client::{HttpIntegrationClient, IntegrationClient};
    use crate::integration::configuration::ConfigDocument;
    use crate::locator::{ClientFactory, PluginManifest};
    use crate::registry::history::InMemoryHistory;
    use crate::registry::InMemoryRegistry;
    use crate::types::{CallId, HttpClientConfig, TeamId};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingCallHandler;

    #[async_trait]
    impl ProcessCallEvent for RecordingCallHandler {
        async fn process_call(
            &self,
            _ctx: &CapabilityContext,
            event: &CallEvent,
        ) -> Result<Option<EventArtifact>> {
            Ok(Some(EventArtifact::new(
                event.call_id.to_string(),
                json!({"state": event.state}),
            )))
        }
    }

    struct FailingCallHandler;

    #[async_trait]
    impl ProcessCallEvent for FailingCallHandler {
        async fn process_call(
            &self,
            _ctx: &CapabilityContext,
            _event: &CallEvent,
        ) -> Result<Option<EventArtifact>> {
            Err(Error::integration("remote API rejected the call log"))
        }
    }

    struct PanickingCallHandler;

    #[async_trait]
    impl ProcessCallEvent for PanickingCallHandler {
        async fn process_call(
            &self,
            _ctx: &CapabilityContext,
            _event: &CallEvent,
        ) -> Result<Option<EventArtifact>> {
            panic!("handler bug");
        }
    }

    struct SleepyCallHandler;

    #[async_trait]
    impl ProcessCallEvent for SleepyCallHandler {
        async fn process_call(
            &self,
            _ctx: &CapabilityContext,
            _event: &CallEvent,
        ) -> Result<Option<EventArtifact>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
    }

    struct ChannelLogger;

    #[async_trait]
    impl ProcessOmnichannelEvent for ChannelLogger {
        async fn process_omnichannel(
            &self,
            _ctx: &CapabilityContext,
            event: &OmnichannelEvent,
        ) -> Result<Option<EventArtifact>> {
            Ok(Some(EventArtifact::new(
                event.conversation_id.to_string(),
                json!({"channel": event.channel.as_str()}),
            )))
        }
    }

    /// Declines every query and counts how often it was asked.
    struct DecliningOwner(Arc<AtomicUsize>);

    #[async_trait]
    impl GetContactOwner for DecliningOwner {
        async fn contact_owner(
            &self,
            _ctx: &CapabilityContext,
            _query: &ContactQuery,
        ) -> Result<Option<ContactOwner>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    struct AnsweringOwner;

    #[async_trait]
    impl GetContactOwner for AnsweringOwner {
        async fn contact_owner(
            &self,
            _ctx: &CapabilityContext,
            query: &ContactQuery,
        ) -> Result<Option<ContactOwner>> {
            Ok(Some(ContactOwner {
                owner_id: format!("owner-of-{}", query.phone),
                owner_name: Some("Ada".to_string()),
                integration: String::new(),
            }))
        }
    }

    struct FailingRegistry;

    #[async_trait]
    impl IntegrationRegistry for FailingRegistry {
        async fn get_team_integrations(
            &self,
            _team: &TeamId,
            _filter: &[String],
        ) -> Result<Vec<IntegrationRecord>> {
            Err(Error::repository("connection pool exhausted"))
        }

        async fn get_by_id(&self, _id: i64) -> Result<Option<IntegrationRecord>> {
            Err(Error::repository("connection pool exhausted"))
        }

        async fn create(&self, _record: IntegrationRecord) -> Result<i64> {
            Err(Error::repository("connection pool exhausted"))
        }

        async fn update(&self, _record: &IntegrationRecord) -> Result<()> {
            Err(Error::repository("connection pool exhausted"))
        }

        async fn delete(&self, _id: i64) -> Result<bool> {
            Err(Error::repository("connection pool exhausted"))
        }

        async fn save_configuration(
            &self,
            _id: i64,
            _config: &ConfigDocument,
        ) -> Result<u64> {
            Err(Error::repository("connection pool exhausted"))
        }

        async fn save_configuration_field(
            &self,
            _id: i64,
            _key: &str,
            _value: &serde_json::Value,
        ) -> Result<u64> {
            Err(Error::repository("connection pool exhausted"))
        }
    }

    fn team(name: &str) -> TeamId {
        TeamId::from_string(name.into()).unwrap()
    }

    fn http_factory() -> ClientFactory {
        Arc::new(|identity| {
            HttpIntegrationClient::new(identity, &HttpClientConfig::default())
                .map(|c| Arc::new(c) as Arc<dyn IntegrationClient>)
        })
    }

    fn call_event(team_name: &str, targets: &[&str]) -> Event {
        Event::Call(CallEvent {
            call_id: CallId::from_string("call-1".into()).unwrap(),
            team: team(team_name),
            direction: Direction::Inbound,
            state: CallState::Completed,
            from: "+15550100".to_string(),
            to: "+15550199".to_string(),
            agent: None,
            started_at: Utc::now(),
            targets: targets
                .iter()
                .map(|t| EventTarget::new(*t, TargetRole::Agent))
                .collect(),
        })
    }

    async fn seed(registry: &InMemoryRegistry, team_name: &str, name: &str) -> i64 {
        registry
            .create(IntegrationRecord::new(name, team(team_name)))
            .await
            .unwrap()
    }

    fn dispatcher_with(
        catalog: PluginCatalog,
        registry: Arc<InMemoryRegistry>,
        history: Arc<InMemoryHistory>,
        integration_timeout: Duration,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::new(catalog),
            registry,
            history,
            DispatchConfig {
                integration_timeout,
                ..DispatchConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_fanout_isolates_failing_and_panicking_siblings() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("goodcrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(RecordingCallHandler))),
            )
            .unwrap();
        catalog
            .register(
                PluginManifest::new("flakycrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(FailingCallHandler))),
            )
            .unwrap();
        catalog
            .register(
                PluginManifest::new("buggycrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(PanickingCallHandler))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "flakycrm").await;
        seed(&registry, "t1", "buggycrm").await;
        seed(&registry, "t1", "goodcrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let report = dispatcher
            .dispatch_event(&call_event("t1", &[]))
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(
            report.outcome_for("FLAKYCRM").unwrap().kind,
            OutcomeKind::Failed
        );
        assert_eq!(
            report.outcome_for("BUGGYCRM").unwrap().kind,
            OutcomeKind::Panicked
        );
        // The healthy sibling still processed
        assert_eq!(
            report.outcome_for("GOODCRM").unwrap().kind,
            OutcomeKind::Processed
        );
        assert_eq!(report.processed_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_without_blocking_fanout() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("slowcrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(SleepyCallHandler))),
            )
            .unwrap();
        catalog
            .register(
                PluginManifest::new("goodcrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(RecordingCallHandler))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "slowcrm").await;
        seed(&registry, "t1", "goodcrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_millis(50),
        );

        let report = dispatcher
            .dispatch_event(&call_event("t1", &[]))
            .await
            .unwrap();

        assert_eq!(
            report.outcome_for("SLOWCRM").unwrap().kind,
            OutcomeKind::TimedOut
        );
        assert_eq!(
            report.outcome_for("GOODCRM").unwrap().kind,
            OutcomeKind::Processed
        );
    }

    #[tokio::test]
    async fn test_missing_capability_is_not_implemented() {
        let catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "minimalcrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let report = dispatcher
            .dispatch_event(&call_event("t1", &[]))
            .await
            .unwrap();

        assert_eq!(
            report.outcome_for("MINIMALCRM").unwrap().kind,
            OutcomeKind::NotImplemented
        );
    }

    #[tokio::test]
    async fn test_declared_capability_with_broken_factory_is_resolution_failed() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("brokencrm", http_factory())
                    .with_process_call(Arc::new(|| panic!("factory wired wrong"))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "brokencrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let report = dispatcher
            .dispatch_event(&call_event("t1", &[]))
            .await
            .unwrap();

        assert_eq!(
            report.outcome_for("BROKENCRM").unwrap().kind,
            OutcomeKind::ResolutionFailed
        );
    }

    #[tokio::test]
    async fn test_artifact_upsert_is_idempotent_per_integration() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("goodcrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(RecordingCallHandler))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "goodcrm").await;

        let history = Arc::new(InMemoryHistory::default());
        let dispatcher = dispatcher_with(
            catalog,
            registry,
            history.clone(),
            Duration::from_secs(5),
        );

        let event = call_event("t1", &[]);
        dispatcher.dispatch_event(&event).await.unwrap();
        dispatcher.dispatch_event(&event).await.unwrap();

        // Same (object, team, integration) key both times: one row
        assert_eq!(history.count().await.unwrap(), 1);
        let record = history
            .find(&HistoryKey::new("call-1", team("t1"), "GOODCRM"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.data, json!({"state": "COMPLETED"}));
    }

    #[tokio::test]
    async fn test_omnichannel_channel_filter_excludes_before_resolution() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("chatcrm", http_factory())
                    .with_process_omnichannel(Arc::new(|| Arc::new(ChannelLogger))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        let mut record = IntegrationRecord::new("chatcrm", team("t1"));
        record
            .config
            .set(KEY_OMNICHANNEL_CHANNELS, json!(["whatsapp", "facebook"]));
        registry.create(record).await.unwrap();

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let webchat = Event::Omnichannel(OmnichannelEvent {
            conversation_id: crate::types::ConversationId::from_string("conv-1".into()).unwrap(),
            team: team("t1"),
            channel: MessageChannel::Webchat,
            direction: Direction::Inbound,
            from: "visitor".to_string(),
            to: "support".to_string(),
            text: "hi".to_string(),
            received_at: Utc::now(),
            targets: vec![],
        });
        let report = dispatcher.dispatch_event(&webchat).await.unwrap();
        assert!(report.outcomes.is_empty());

        let whatsapp = Event::Omnichannel(OmnichannelEvent {
            conversation_id: crate::types::ConversationId::from_string("conv-2".into()).unwrap(),
            team: team("t1"),
            channel: MessageChannel::Whatsapp,
            direction: Direction::Inbound,
            from: "visitor".to_string(),
            to: "support".to_string(),
            text: "hi".to_string(),
            received_at: Utc::now(),
            targets: vec![],
        });
        let report = dispatcher.dispatch_event(&whatsapp).await.unwrap();
        assert_eq!(
            report.outcome_for("CHATCRM").unwrap().kind,
            OutcomeKind::Processed
        );
    }

    #[tokio::test]
    async fn test_contact_owner_first_match_wins_in_registry_order() {
        let decline_scans = Arc::new(AtomicUsize::new(0));
        let late_scans = Arc::new(AtomicUsize::new(0));

        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        let scans = decline_scans.clone();
        catalog
            .register(
                PluginManifest::new("declinecrm", http_factory()).with_contact_owner(Arc::new(
                    move || Arc::new(DecliningOwner(scans.clone())),
                )),
            )
            .unwrap();
        catalog
            .register(
                PluginManifest::new("answercrm", http_factory())
                    .with_contact_owner(Arc::new(|| Arc::new(AnsweringOwner))),
            )
            .unwrap();
        let scans = late_scans.clone();
        catalog
            .register(
                PluginManifest::new("latecrm", http_factory()).with_contact_owner(Arc::new(
                    move || Arc::new(DecliningOwner(scans.clone())),
                )),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "declinecrm").await;
        seed(&registry, "t1", "answercrm").await;
        seed(&registry, "t1", "latecrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let owner = dispatcher
            .find_contact_owner(
                &team("t1"),
                &ContactQuery {
                    phone: "+15550100".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        // declinecrm said None, so the first answer comes from answercrm
        assert_eq!(owner.integration, "ANSWERCRM");
        assert_eq!(owner.owner_id, "owner-of-+15550100");
        // The scan stops at the first match: latecrm is never asked
        assert_eq!(decline_scans.load(Ordering::SeqCst), 1);
        assert_eq!(late_scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_contact_owner_respects_smart_routing_flag() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("mutedcrm", http_factory())
                    .with_contact_owner(Arc::new(|| Arc::new(AnsweringOwner))),
            )
            .unwrap();
        catalog
            .register(
                PluginManifest::new("activecrm", http_factory())
                    .with_contact_owner(Arc::new(|| Arc::new(AnsweringOwner))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        let mut muted = IntegrationRecord::new("mutedcrm", team("t1"));
        muted.config.set(KEY_SMART_ROUTING, json!(false));
        registry.create(muted).await.unwrap();
        seed(&registry, "t1", "activecrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let owner = dispatcher
            .find_contact_owner(
                &team("t1"),
                &ContactQuery {
                    phone: "+15550100".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(owner.integration, "ACTIVECRM");
    }

    #[tokio::test]
    async fn test_registry_failure_surfaces_as_repository_error() {
        let catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        let dispatcher = Dispatcher::new(
            Arc::new(catalog),
            Arc::new(FailingRegistry),
            Arc::new(InMemoryHistory::default()),
            DispatchConfig::default(),
        );

        let err = dispatcher
            .dispatch_event(&call_event("t1", &[]))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 503);
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_dispatches() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        catalog
            .register(
                PluginManifest::new("goodcrm", http_factory())
                    .with_process_call(Arc::new(|| Arc::new(RecordingCallHandler))),
            )
            .unwrap();

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "goodcrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let event = call_event("t1", &[]);
        dispatcher.dispatch_event(&event).await.unwrap();
        dispatcher.dispatch_event(&event).await.unwrap();

        let stats = dispatcher.stats().await;
        assert_eq!(stats.events_dispatched, 2);
        assert_eq!(stats.processed, 2);
    }

    #[tokio::test]
    async fn test_targeted_event_only_reaches_named_integrations() {
        let mut catalog = PluginCatalog::with_http_clients(HttpClientConfig::default());
        for name in ["acrm", "bcrm"] {
            catalog
                .register(
                    PluginManifest::new(name, http_factory())
                        .with_process_call(Arc::new(|| Arc::new(RecordingCallHandler))),
                )
                .unwrap();
        }

        let registry = Arc::new(InMemoryRegistry::new());
        seed(&registry, "t1", "acrm").await;
        seed(&registry, "t1", "bcrm").await;

        let dispatcher = dispatcher_with(
            catalog,
            registry,
            Arc::new(InMemoryHistory::default()),
            Duration::from_secs(5),
        );

        let report = dispatcher
            .dispatch_event(&call_event("t1", &["bcrm"]))
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].integration, "BCRM");
    }
}
