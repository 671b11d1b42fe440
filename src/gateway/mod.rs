//! Gateway surface — single-target operations and event ingestion.
//!
//! The Gateway wires the catalog, registry, history, and dispatcher
//! together and exposes the operations callers hit directly:
//!   - Lifecycle: activate, delete
//!   - Configuration: get (with engine-injected defaults), set (with
//!     engine-enforced normalization and credential preservation)
//!   - Introspection: status (classified), users, field and drop-down
//!     listings, user mapping
//!   - Lookup: contact owner, first answer across the team's integrations
//!   - Ingestion: parse-then-fan-out for inbound events
//!
//! Single-target operations return `Result`; callers serialize failures
//! with [`Error::to_error_body`](crate::types::Error::to_error_body).
//! Fan-out acks anything that parses.

use crate::capability::{
    ActivationRequest, CapabilityContext, CapabilityKind, ContactOwner, ContactQuery,
    DirectoryUser, DropDownOption, EventArtifact, FieldDescriptor, UserMapping,
};
use crate::dispatch::{DispatchReport, DispatchStats, Dispatcher};
use crate::event::parse::parse_event;
use crate::integration::configuration::{
    ConfigDocument, KEY_ACCESS_TOKEN, KEY_HANGUP_ON_INVALID_CALL, KEY_REFRESH_TOKEN,
    KEY_TOKEN_EXPIRES_AT, PRESERVED_KEYS,
};
use crate::integration::IntegrationIdentity;
use crate::locator::{
    generic_delete, generic_get_configuration, generic_set_configuration, generic_status,
    CapabilityBinding, PluginCatalog,
};
use crate::registry::history::{HistoryKey, ObjectHistory};
use crate::registry::{IntegrationRecord, IntegrationRegistry};
use crate::status::{classify, classify_error, StatusReport};
use crate::types::{AgentId, Config, Error, Result, TeamId};
use crate::validation::validate_non_empty;
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub use crate::types::{ErrorBody, ErrorDetail};

// =============================================================================
// Gateway
// =============================================================================

/// The assembled engine: everything above the plugin seam.
pub struct Gateway {
    catalog: Arc<PluginCatalog>,
    registry: Arc<dyn IntegrationRegistry>,
    history: Arc<dyn ObjectHistory>,
    dispatcher: Dispatcher,
    config: Config,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish()
    }
}

impl Gateway {
    pub fn new(
        catalog: PluginCatalog,
        registry: Arc<dyn IntegrationRegistry>,
        history: Arc<dyn ObjectHistory>,
        config: Config,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let dispatcher = Dispatcher::new(
            catalog.clone(),
            registry.clone(),
            history.clone(),
            config.dispatch.clone(),
        );
        Self {
            catalog,
            registry,
            history,
            dispatcher,
            config,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Cumulative fan-out counters.
    pub async fn stats(&self) -> DispatchStats {
        self.dispatcher.stats().await
    }

    // =============================================================================
    // Ingestion
    // =============================================================================

    /// Parse an inbound payload and fan it out.
    ///
    /// The only rejection is a payload that does not parse into an event;
    /// per-integration failures are inside the report.
    pub async fn ingest(&self, payload: &Value) -> Result<DispatchReport> {
        let event = parse_event(payload)?;
        self.dispatcher.dispatch_event(&event).await
    }

    /// Ask the team's integrations who owns a contact.
    pub async fn contact_owner(
        &self,
        team: &TeamId,
        query: &ContactQuery,
    ) -> Result<Option<ContactOwner>> {
        self.dispatcher.find_contact_owner(team, query).await
    }

    // =============================================================================
    // Lifecycle
    // =============================================================================

    /// Activate an integration for a tenant and persist its row.
    pub async fn activate(
        &self,
        raw_name: &str,
        request: &ActivationRequest,
    ) -> Result<IntegrationIdentity> {
        validate_non_empty(raw_name, "integration name")?;

        let mut transient = IntegrationRecord::new(raw_name, request.team.clone());
        if let Some(agent) = request.agent.clone() {
            transient = transient.with_agent(agent);
        }

        let binding = self.resolve_required(
            self.catalog.resolve_activate(&transient, None),
            &transient,
            CapabilityKind::ActivateIntegration,
        )?;

        let mut identity = binding.handler.activate(&binding.ctx, request).await?;

        let mut record = IntegrationRecord::new(&identity.canonical_name, identity.team.clone());
        if let Some(agent) = identity.agent.clone() {
            record = record.with_agent(agent);
        }
        let id = self.registry.create(record).await?;
        identity.id = id;

        tracing::info!(
            code = "integration_activated",
            integration = %identity.namespace(),
            id = id,
            "integration activated"
        );
        Ok(identity)
    }

    /// Remove an integration: remote cleanup first, then the local row.
    ///
    /// Remote cleanup failure is logged and reported, never blocks local
    /// removal. Returns whether both sides succeeded.
    pub async fn delete_integration(&self, id: i64, auth_header: Option<&str>) -> Result<bool> {
        let record = self.load_record(id).await?;

        let fallback = generic_delete();
        let remote_ok = match self.catalog.resolve_delete(&record, Some(&fallback)) {
            Some(binding) => match binding.handler.delete(&binding.ctx, auth_header).await {
                Ok(ok) => ok,
                Err(err) => {
                    tracing::warn!(
                        code = "remote_cleanup_failed",
                        integration = %record.canonical_name,
                        error = %err,
                        "continuing with local removal"
                    );
                    false
                }
            },
            None => false,
        };

        let local_ok = self.registry.delete(id).await?;
        tracing::info!(
            code = "integration_deleted",
            integration = %record.canonical_name,
            remote = remote_ok,
            local = local_ok,
            "integration removed"
        );
        Ok(remote_ok && local_ok)
    }

    // =============================================================================
    // Configuration
    // =============================================================================

    /// Effective configuration document for an integration.
    ///
    /// The hangup-on-invalid-call default is injected here so every
    /// caller sees it regardless of which handler produced the document.
    pub async fn get_configuration(&self, id: i64) -> Result<ConfigDocument> {
        let record = self.load_record(id).await?;

        let fallback = generic_get_configuration();
        let binding = self.resolve_required(
            self.catalog.resolve_get_configuration(&record, Some(&fallback)),
            &record,
            CapabilityKind::GetConfiguration,
        )?;

        let mut doc = binding.handler.get_configuration(&binding.ctx).await?;
        if !doc.contains_key(KEY_HANGUP_ON_INVALID_CALL) {
            doc.set(KEY_HANGUP_ON_INVALID_CALL, true);
        }
        Ok(doc)
    }

    /// Apply a configuration update and persist the effective document.
    ///
    /// Boolean normalization and credential preservation happen here,
    /// around the handler, so no plugin can skip them. Returns rows
    /// persisted.
    pub async fn set_configuration(
        &self,
        id: i64,
        mut incoming: ConfigDocument,
        updated_by: Option<&AgentId>,
    ) -> Result<u64> {
        let record = self.load_record(id).await?;

        incoming.normalize_bool_strings();

        let fallback = generic_set_configuration();
        let binding = self.resolve_required(
            self.catalog.resolve_set_configuration(&record, Some(&fallback)),
            &record,
            CapabilityKind::SetConfiguration,
        )?;

        let mut effective = binding
            .handler
            .set_configuration(&binding.ctx, incoming, updated_by)
            .await?;
        effective.normalize_bool_strings();
        effective.merge_missing_from(&record.config, PRESERVED_KEYS);

        let rows = self.registry.save_configuration(id, &effective).await?;
        if rows == 0 {
            return Err(Error::not_found(format!(
                "integration {id} vanished before configuration could be saved"
            )));
        }

        tracing::info!(
            code = "configuration_saved",
            integration = %record.canonical_name,
            id = id,
            rows = rows,
            "configuration saved"
        );
        Ok(rows)
    }

    // =============================================================================
    // Introspection
    // =============================================================================

    /// Probe and classify an integration's health.
    ///
    /// An unknown id is a hard error; every other failure is classified
    /// into the report.
    pub async fn status(&self, id: i64) -> Result<StatusReport> {
        let record = self.load_record(id).await?;

        let fallback = generic_status();
        let mut binding = match self.resolve_required(
            self.catalog.resolve_status(&record, Some(&fallback)),
            &record,
            CapabilityKind::Status,
        ) {
            Ok(binding) => binding,
            Err(err) => return Ok(classify_error(&err)),
        };

        let probe = match self.refresh_credentials(&record, &mut binding.ctx).await {
            Ok(()) => binding.handler.is_alive(&binding.ctx).await,
            Err(err) => Err(err),
        };
        Ok(classify(probe))
    }

    /// The integration's user directory.
    pub async fn list_users(&self, id: i64) -> Result<Vec<DirectoryUser>> {
        let record = self.load_record(id).await?;
        let mut binding = self.resolve_required(
            self.catalog.resolve_list_users(&record, None),
            &record,
            CapabilityKind::ListUsers,
        )?;
        self.refresh_credentials(&record, &mut binding.ctx).await?;
        binding.handler.list_users(&binding.ctx).await
    }

    /// External-user-to-agent mapping table.
    pub async fn user_mapping(&self, id: i64) -> Result<Vec<UserMapping>> {
        let record = self.load_record(id).await?;
        let mut binding = self.resolve_required(
            self.catalog.resolve_user_mapping(&record, None),
            &record,
            CapabilityKind::ExternalUserMapping,
        )?;
        self.refresh_credentials(&record, &mut binding.ctx).await?;
        binding.handler.user_mapping(&binding.ctx).await
    }

    /// Fields the integration exposes for mapping.
    pub async fn integration_fields(&self, id: i64) -> Result<Vec<FieldDescriptor>> {
        let record = self.load_record(id).await?;
        let mut binding = self.resolve_required(
            self.catalog.resolve_integration_fields(&record, None),
            &record,
            CapabilityKind::IntegrationFields,
        )?;
        self.refresh_credentials(&record, &mut binding.ctx).await?;
        binding.handler.integration_fields(&binding.ctx).await
    }

    /// Options of one named drop-down field.
    pub async fn list_drop_down(&self, id: i64, field: &str) -> Result<Vec<DropDownOption>> {
        validate_non_empty(field, "field")?;
        let record = self.load_record(id).await?;
        let mut binding = self.resolve_required(
            self.catalog.resolve_list_drop_down(&record, None),
            &record,
            CapabilityKind::ListDropDown,
        )?;
        self.refresh_credentials(&record, &mut binding.ctx).await?;
        binding.handler.list_drop_down(&binding.ctx, field).await
    }

    /// Inbound SMS push from the provider, addressed to one integration.
    pub async fn process_sms_push(&self, id: i64, payload: &Value) -> Result<Option<EventArtifact>> {
        let record = self.load_record(id).await?;
        let mut binding = self.resolve_required(
            self.catalog.resolve_sms_push(&record, None),
            &record,
            CapabilityKind::ProcessSmsPush,
        )?;
        self.refresh_credentials(&record, &mut binding.ctx).await?;

        let artifact = binding.handler.process_sms_push(&binding.ctx, payload).await?;
        if let Some(artifact) = &artifact {
            let key = HistoryKey::new(
                artifact.object_key.clone(),
                record.team.clone(),
                record.canonical_name.clone(),
            );
            if let Err(err) = self.history.upsert(key, artifact.data.clone()).await {
                tracing::warn!(
                    code = "history_write_failed",
                    integration = %record.canonical_name,
                    error = %err,
                    "push artifact not recorded"
                );
            }
        }
        Ok(artifact)
    }

    // =============================================================================
    // Maintenance
    // =============================================================================

    /// Drop history rows older than the configured retention. Returns the
    /// removed row count.
    pub async fn sweep_history(&self) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.config.history.retention)
            .map_err(|e| Error::internal(format!("retention out of range: {e}")))?;
        let removed = self.history.purge_older_than(Utc::now() - retention).await?;
        if removed > 0 {
            tracing::info!(code = "history_swept", removed = removed, "history rows purged");
        }
        Ok(removed)
    }

    // =============================================================================
    // Internal Helpers
    // =============================================================================

    async fn load_record(&self, id: i64) -> Result<IntegrationRecord> {
        self.registry
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("integration {id} not found")))
    }

    /// Turn a missing binding into the right error: not-implemented when
    /// the capability was never declared, resolution failure when it was
    /// declared but could not be bound.
    fn resolve_required<T: ?Sized>(
        &self,
        binding: Option<CapabilityBinding<T>>,
        record: &IntegrationRecord,
        capability: CapabilityKind,
    ) -> Result<CapabilityBinding<T>> {
        binding.ok_or_else(|| {
            let declared = self
                .catalog
                .get(&record.canonical_name)
                .map(|m| m.capabilities().contains(&capability))
                .unwrap_or(false);
            if declared {
                Error::resolution(format!(
                    "{} could not be bound for {}",
                    capability, record.canonical_name
                ))
            } else {
                Error::not_implemented(format!(
                    "{} does not provide {}",
                    record.canonical_name, capability
                ))
            }
        })
    }

    /// Refresh the bound integration's credentials when the stored token
    /// has expired, persisting what the grant returned. The context's
    /// config is updated in place so the handler sees the fresh token.
    async fn refresh_credentials(
        &self,
        record: &IntegrationRecord,
        ctx: &mut CapabilityContext,
    ) -> Result<()> {
        if !ctx.config.token_expired(Utc::now()) {
            return Ok(());
        }

        let grant = ctx.client.refresh_token(&ctx.config).await?;

        let token = Value::String(grant.access_token);
        ctx.config.set(KEY_ACCESS_TOKEN, token.clone());
        self.registry
            .save_configuration_field(record.id, KEY_ACCESS_TOKEN, &token)
            .await?;

        if let Some(refresh) = grant.refresh_token {
            let refresh = Value::String(refresh);
            ctx.config.set(KEY_REFRESH_TOKEN, refresh.clone());
            self.registry
                .save_configuration_field(record.id, KEY_REFRESH_TOKEN, &refresh)
                .await?;
        }
        if let Some(expires_at) = grant.expires_at {
            let expires_at = Value::String(expires_at.to_rfc3339());
            ctx.config.set(KEY_TOKEN_EXPIRES_AT, expires_at.clone());
            self.registry
                .save_configuration_field(record.id, KEY_TOKEN_EXPIRES_AT, &expires_at)
                .await?;
        }

        tracing::info!(
            code = "credentials_refreshed",
            integration = %ctx.namespace(),
            "expired token refreshed and persisted"
        );
        Ok(())
    }
}
