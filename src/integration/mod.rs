//! Integration identity, configuration, and API client contract.
//!
//! Everything an integration invocation is bound to at resolution time:
//!   - **Identity**: who the integration is for which tenant
//!   - **Configuration**: the opaque per-tenant settings document
//!   - **Client**: the outbound API surface with anonymized logging

pub mod alias;
pub mod client;
pub mod configuration;

use crate::types::{AgentId, TeamId};
use serde::{Deserialize, Serialize};

/// Row id value for identities that have not been persisted yet.
pub const UNPERSISTED: i64 = 0;

/// Identity of one integration instance for one tenant.
///
/// Canonical name plus team (plus agent for user-scoped integrations)
/// uniquely identifies one persisted row. Identities are transient during
/// activation (`id == UNPERSISTED`) and persistent afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationIdentity {
    /// Canonical implementation name, the dispatch key.
    pub canonical_name: String,

    /// Persisted row id; [`UNPERSISTED`] until Activate completes.
    pub id: i64,

    /// Rebranded user-facing name, when one is configured.
    pub display_alias: Option<String>,

    pub team: TeamId,

    /// Owning agent for user-scoped integrations; `None` for team-scoped.
    pub agent: Option<AgentId>,
}

impl IntegrationIdentity {
    /// Transient identity for an integration being activated or resolved.
    ///
    /// The raw name is alias-resolved and the display alias filled from the
    /// rebrand table.
    pub fn transient(raw_name: &str, team: TeamId) -> Self {
        let canonical_name = alias::resolve_canonical_name(raw_name);
        let display_alias = alias::resolve_display_alias(&canonical_name).map(str::to_string);
        Self {
            canonical_name,
            id: UNPERSISTED,
            display_alias,
            team,
            agent: None,
        }
    }

    pub fn with_agent(mut self, agent: AgentId) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNPERSISTED
    }

    /// Name shown to users and sent to remote APIs.
    pub fn display_name(&self) -> &str {
        self.display_alias.as_deref().unwrap_or(&self.canonical_name)
    }

    /// Log namespace: canonical name qualified by tenant.
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.canonical_name, self.team)
    }
}
