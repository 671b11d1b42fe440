//! Switchboard gateway CLI - event fan-out harness.
//!
//! Reads one JSON event per line from stdin, fans each out through the
//! dispatch engine, and prints one JSON report per line on stdout.
//! Integration rows come from a JSON seed file so the engine can be
//! exercised without a database; a built-in loopback integration named
//! LOGBOOK acknowledges every event it receives.

use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use async_trait::async_trait;
use switchboard_core::capability::{
    CapabilityContext, EventArtifact, ProcessCallEvent, ProcessOmnichannelEvent,
    ProcessPresenceEvent, ProcessSmsEvent, StatusProbe,
};
use switchboard_core::event::{CallEvent, OmnichannelEvent, PresenceEvent, SmsEvent};
use switchboard_core::gateway::Gateway;
use switchboard_core::integration::client::{HttpIntegrationClient, IntegrationClient};
use switchboard_core::integration::configuration::ConfigDocument;
use switchboard_core::locator::{PluginCatalog, PluginManifest};
use switchboard_core::registry::history::InMemoryHistory;
use switchboard_core::registry::{InMemoryRegistry, IntegrationRecord, IntegrationRegistry};
use switchboard_core::types::{HttpClientConfig, TeamId};
use switchboard_core::{Config, Result};

#[derive(Parser, Debug)]
#[command(
    name = "switchboard-gateway",
    about = "Event fan-out harness for the switchboard engine"
)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a JSON seed file: an array of {"name", "team", "config"}
    /// integration rows
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Print cumulative dispatch statistics on exit
    #[arg(long)]
    stats: bool,
}

/// One row of the seed file.
#[derive(Debug, Deserialize)]
struct SeedRow {
    name: String,
    team: String,
    #[serde(default)]
    config: Map<String, Value>,
}

// =============================================================================
// Loopback integration
// =============================================================================

/// Acknowledges every event it sees, so the harness produces real
/// outcomes and history rows without talking to any remote system.
#[derive(Debug, Default)]
struct Logbook;

#[async_trait]
impl ProcessCallEvent for Logbook {
    async fn process_call(
        &self,
        ctx: &CapabilityContext,
        event: &CallEvent,
    ) -> Result<Option<EventArtifact>> {
        switchboard_core::observability::log_integration(
            "logbook_call",
            &ctx.namespace(),
            &format!("recorded call {}", event.call_id),
        );
        Ok(Some(EventArtifact::new(
            event.call_id.to_string(),
            json!({
                "kind": "call",
                "state": event.state,
                "direction": event.direction,
                "from": event.from,
                "to": event.to,
            }),
        )))
    }
}

#[async_trait]
impl ProcessSmsEvent for Logbook {
    async fn process_sms(
        &self,
        _ctx: &CapabilityContext,
        event: &SmsEvent,
    ) -> Result<Option<EventArtifact>> {
        Ok(Some(EventArtifact::new(
            event.message_id.to_string(),
            json!({
                "kind": "sms",
                "state": event.state,
                "direction": event.direction,
                "text": event.text,
            }),
        )))
    }
}

#[async_trait]
impl ProcessPresenceEvent for Logbook {
    async fn process_presence(
        &self,
        _ctx: &CapabilityContext,
        event: &PresenceEvent,
    ) -> Result<Option<EventArtifact>> {
        Ok(Some(EventArtifact::new(
            format!("presence-{}", event.agent),
            json!({
                "kind": "presence",
                "agent": event.agent,
                "state": event.state,
            }),
        )))
    }
}

#[async_trait]
impl ProcessOmnichannelEvent for Logbook {
    async fn process_omnichannel(
        &self,
        _ctx: &CapabilityContext,
        event: &OmnichannelEvent,
    ) -> Result<Option<EventArtifact>> {
        Ok(Some(EventArtifact::new(
            event.conversation_id.to_string(),
            json!({
                "kind": "omnichannel",
                "channel": event.channel.as_str(),
                "text": event.text,
            }),
        )))
    }
}

#[async_trait]
impl StatusProbe for Logbook {
    async fn is_alive(&self, _ctx: &CapabilityContext) -> Result<bool> {
        Ok(true)
    }
}

fn logbook_manifest(http: &HttpClientConfig) -> PluginManifest {
    let http = Arc::new(http.clone());
    PluginManifest::new(
        "logbook",
        Arc::new(move |identity| {
            HttpIntegrationClient::new(identity, &http)
                .map(|client| Arc::new(client) as Arc<dyn IntegrationClient>)
        }),
    )
    .with_process_call(Arc::new(|| Arc::new(Logbook)))
    .with_process_sms(Arc::new(|| Arc::new(Logbook)))
    .with_process_presence(Arc::new(|| Arc::new(Logbook)))
    .with_process_omnichannel(Arc::new(|| Arc::new(Logbook)))
    .with_status(Arc::new(|| Arc::new(Logbook)))
}

// =============================================================================
// Entry point
// =============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Initialize observability
    switchboard_core::observability::init_tracing();

    // Catalog with the loopback manifest registered
    let mut catalog = PluginCatalog::with_http_clients(config.http.clone());
    catalog.register(logbook_manifest(&config.http))?;

    // Seed the registry: rows from the seed file, or a single LOGBOOK row
    // for team "default" when no file is given
    let registry = Arc::new(InMemoryRegistry::new());
    match &args.seed {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let rows: Vec<SeedRow> = serde_json::from_str(&raw)?;
            for row in rows {
                let team = TeamId::from_string(row.team)?;
                let record = IntegrationRecord::new(&row.name, team)
                    .with_config(ConfigDocument::from_value(Value::Object(row.config))?);
                registry.create(record).await?;
            }
        }
        None => {
            let team = TeamId::from_string("default".into())?;
            registry
                .create(IntegrationRecord::new("logbook", team))
                .await?;
        }
    }

    tracing::info!(
        "🚀 Switchboard gateway ready with {} integration row(s); reading events from stdin",
        registry.len().await
    );

    let gateway = Gateway::new(
        catalog,
        registry,
        Arc::new(InMemoryHistory::new(config.history.max_entries)),
        config,
    );

    // One JSON event per line in, one JSON report (or error body) per
    // line out
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let payload: Value = match serde_json::from_str(line) {
            Ok(payload) => payload,
            Err(err) => {
                let body = switchboard_core::Error::from(err).to_error_body();
                println!("{}", serde_json::to_string(&body)?);
                continue;
            }
        };

        match gateway.ingest(&payload).await {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(err) => println!("{}", serde_json::to_string(&err.to_error_body())?),
        }
    }

    if args.stats {
        let stats = gateway.stats().await;
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}
