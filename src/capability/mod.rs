//! Capability contracts — the polymorphic surface every integration plugs
//! into.
//!
//! One trait per capability, all async and object-safe. Handlers receive an
//! explicit [`CapabilityContext`] on every call; there is no bind-then-call
//! protocol and no setter ordering to get wrong. A handler that an
//! integration does not register simply does not exist for it (routing falls
//! back or skips), so trait satisfaction is checked where the manifest is
//! built, at registration time.

pub mod generic;

use crate::event::{CallEvent, Event, OmnichannelEvent, PresenceEvent, SmsEvent};
use crate::integration::client::IntegrationClient;
use crate::integration::configuration::ConfigDocument;
use crate::integration::IntegrationIdentity;
use crate::types::{AgentId, Result, TeamId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Capability kinds
// =============================================================================

/// Every capability an integration can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    ActivateIntegration,
    GetConfiguration,
    SetConfiguration,
    ProcessCallEvent,
    ProcessSmsEvent,
    ProcessPresenceEvent,
    ProcessOmnichannelEvent,
    Status,
    DeleteIntegration,
    ListUsers,
    GetContactOwner,
    ExternalUserMapping,
    IntegrationFields,
    ListDropDown,
    ProcessSmsPush,
}

impl CapabilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::ActivateIntegration => "activate_integration",
            CapabilityKind::GetConfiguration => "get_configuration",
            CapabilityKind::SetConfiguration => "set_configuration",
            CapabilityKind::ProcessCallEvent => "process_call_event",
            CapabilityKind::ProcessSmsEvent => "process_sms_event",
            CapabilityKind::ProcessPresenceEvent => "process_presence_event",
            CapabilityKind::ProcessOmnichannelEvent => "process_omnichannel_event",
            CapabilityKind::Status => "status",
            CapabilityKind::DeleteIntegration => "delete_integration",
            CapabilityKind::ListUsers => "list_users",
            CapabilityKind::GetContactOwner => "get_contact_owner",
            CapabilityKind::ExternalUserMapping => "external_user_mapping",
            CapabilityKind::IntegrationFields => "integration_fields",
            CapabilityKind::ListDropDown => "list_drop_down",
            CapabilityKind::ProcessSmsPush => "process_sms_push",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Invocation context
// =============================================================================

/// Everything a handler invocation is bound to, resolved fresh per call.
#[derive(Clone)]
pub struct CapabilityContext {
    pub identity: IntegrationIdentity,
    pub config: ConfigDocument,
    pub client: Arc<dyn IntegrationClient>,
}

impl CapabilityContext {
    pub fn new(
        identity: IntegrationIdentity,
        config: ConfigDocument,
        client: Arc<dyn IntegrationClient>,
    ) -> Self {
        Self {
            identity,
            config,
            client,
        }
    }

    /// Log namespace of the bound integration.
    pub fn namespace(&self) -> String {
        self.identity.namespace()
    }
}

impl fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("identity", &self.identity)
            .field("config_keys", &self.config.len())
            .field("client", &self.client.integration_name())
            .finish()
    }
}

// =============================================================================
// Operation values
// =============================================================================

/// Inbound activation request (body + query string), before any row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub body: Value,
    pub query: HashMap<String, String>,
    pub team: TeamId,
    pub agent: Option<AgentId>,
}

/// Artifact a process-event handler produced (created/updated remote
/// object). Recorded in object history under its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArtifact {
    pub object_key: String,
    pub data: Value,
}

impl EventArtifact {
    pub fn new(object_key: impl Into<String>, data: Value) -> Self {
        Self {
            object_key: object_key.into(),
            data,
        }
    }

    /// Artifact keyed by the event's own object key, the common case.
    pub fn for_event(event: &Event, data: Value) -> Self {
        Self::new(event.object_key(), data)
    }
}

/// One user in the integration's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Contact-owner lookup input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactQuery {
    pub phone: String,
}

/// Contact-owner lookup result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactOwner {
    pub owner_id: String,
    pub owner_name: Option<String>,
    /// Canonical name of the integration that answered; filled by the scan.
    #[serde(default)]
    pub integration: String,
}

/// Maps one external (remote-system) user to a PBX agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMapping {
    pub external_id: String,
    pub agent: AgentId,
}

/// One mappable field the integration exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    pub field_type: String,
}

/// One option of a drop-down field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropDownOption {
    pub value: String,
    pub label: String,
}

// =============================================================================
// Capability traits
// =============================================================================

/// Create the integration for a tenant; returns the identity to persist.
#[async_trait]
pub trait ActivateIntegration: Send + Sync {
    async fn activate(
        &self,
        ctx: &CapabilityContext,
        request: &ActivationRequest,
    ) -> Result<IntegrationIdentity>;
}

/// Read the effective configuration document.
#[async_trait]
pub trait GetConfiguration: Send + Sync {
    async fn get_configuration(&self, ctx: &CapabilityContext) -> Result<ConfigDocument>;
}

/// Apply a configuration update; returns the effective document to persist.
/// Persistence itself stays engine-side.
#[async_trait]
pub trait SetConfiguration: Send + Sync {
    async fn set_configuration(
        &self,
        ctx: &CapabilityContext,
        incoming: ConfigDocument,
        updated_by: Option<&AgentId>,
    ) -> Result<ConfigDocument>;
}

/// Push a call leg update into the integration.
#[async_trait]
pub trait ProcessCallEvent: Send + Sync {
    async fn process_call(
        &self,
        ctx: &CapabilityContext,
        event: &CallEvent,
    ) -> Result<Option<EventArtifact>>;
}

/// Push an SMS into the integration.
#[async_trait]
pub trait ProcessSmsEvent: Send + Sync {
    async fn process_sms(
        &self,
        ctx: &CapabilityContext,
        event: &SmsEvent,
    ) -> Result<Option<EventArtifact>>;
}

/// Push a presence change into the integration.
#[async_trait]
pub trait ProcessPresenceEvent: Send + Sync {
    async fn process_presence(
        &self,
        ctx: &CapabilityContext,
        event: &PresenceEvent,
    ) -> Result<Option<EventArtifact>>;
}

/// Push an omnichannel message into the integration.
#[async_trait]
pub trait ProcessOmnichannelEvent: Send + Sync {
    async fn process_omnichannel(
        &self,
        ctx: &CapabilityContext,
        event: &OmnichannelEvent,
    ) -> Result<Option<EventArtifact>>;
}

/// Liveness probe; the raw bool is classified by [`crate::status`].
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn is_alive(&self, ctx: &CapabilityContext) -> Result<bool>;
}

/// Remote-side cleanup on removal; returns whether cleanup succeeded.
/// Local row removal stays engine-side.
#[async_trait]
pub trait DeleteIntegration: Send + Sync {
    async fn delete(&self, ctx: &CapabilityContext, auth_header: Option<&str>) -> Result<bool>;
}

/// List the integration's user directory.
#[async_trait]
pub trait ListUsers: Send + Sync {
    async fn list_users(&self, ctx: &CapabilityContext) -> Result<Vec<DirectoryUser>>;
}

/// Look up which remote user owns a contact. `Ok(None)` means the
/// integration resolved but declined; that is not an error.
#[async_trait]
pub trait GetContactOwner: Send + Sync {
    async fn contact_owner(
        &self,
        ctx: &CapabilityContext,
        query: &ContactQuery,
    ) -> Result<Option<ContactOwner>>;
}

/// Mapping table between external users and PBX agents.
#[async_trait]
pub trait ExternalUserMapping: Send + Sync {
    async fn user_mapping(&self, ctx: &CapabilityContext) -> Result<Vec<UserMapping>>;
}

/// Fields the integration exposes for mapping in the UI.
#[async_trait]
pub trait IntegrationFields: Send + Sync {
    async fn integration_fields(&self, ctx: &CapabilityContext) -> Result<Vec<FieldDescriptor>>;
}

/// Options for one named drop-down field.
#[async_trait]
pub trait ListDropDown: Send + Sync {
    async fn list_drop_down(
        &self,
        ctx: &CapabilityContext,
        field: &str,
    ) -> Result<Vec<DropDownOption>>;
}

/// Inbound SMS push from the provider for one integration.
#[async_trait]
pub trait ProcessSmsPush: Send + Sync {
    async fn process_sms_push(
        &self,
        ctx: &CapabilityContext,
        payload: &Value,
    ) -> Result<Option<EventArtifact>>;
}
