//! Integration registry — which integrations each tenant has enabled.
//!
//! The trait is the persistence seam; production backs it with SQL, tests
//! and the CLI use [`InMemoryRegistry`]. Two contract points matter to the
//! rest of the engine:
//!   - `get_team_integrations` preserves the order of a non-empty filter
//!     (first-match-wins scans depend on it)
//!   - registry failures are surfaced as [`Error::Repository`] and never
//!     abort a sibling integration's dispatch

pub mod history;

use crate::integration::alias::{resolve_canonical_name, resolve_display_alias};
use crate::integration::configuration::ConfigDocument;
use crate::integration::{IntegrationIdentity, UNPERSISTED};
use crate::types::{AgentId, Error, Result, TeamId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// =============================================================================
// Record
// =============================================================================

/// One persisted integration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    pub id: i64,
    pub canonical_name: String,
    pub display_alias: Option<String>,
    pub team: TeamId,
    /// Owning agent for user-scoped integrations.
    pub agent: Option<AgentId>,
    pub enabled: bool,
    pub config: ConfigDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationRecord {
    /// New unpersisted record; the raw name is alias-resolved.
    pub fn new(raw_name: &str, team: TeamId) -> Self {
        let canonical_name = resolve_canonical_name(raw_name);
        let display_alias = resolve_display_alias(&canonical_name).map(str::to_string);
        let now = Utc::now();
        Self {
            id: UNPERSISTED,
            canonical_name,
            display_alias,
            team,
            agent: None,
            enabled: true,
            config: ConfigDocument::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_config(mut self, config: ConfigDocument) -> Self {
        self.config = config;
        self
    }

    pub fn with_agent(mut self, agent: AgentId) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn identity(&self) -> IntegrationIdentity {
        IntegrationIdentity {
            canonical_name: self.canonical_name.clone(),
            id: self.id,
            display_alias: self.display_alias.clone(),
            team: self.team.clone(),
            agent: self.agent.clone(),
        }
    }
}

// =============================================================================
// Registry contract
// =============================================================================

/// Persistence seam for integration rows.
#[async_trait]
pub trait IntegrationRegistry: Send + Sync {
    /// Enabled integrations of a team.
    ///
    /// An empty filter returns all enabled rows in insertion order. A
    /// non-empty filter returns matching rows in the filter's order.
    async fn get_team_integrations(
        &self,
        team: &TeamId,
        filter: &[String],
    ) -> Result<Vec<IntegrationRecord>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<IntegrationRecord>>;

    /// Persist a new row; returns the assigned id.
    async fn create(&self, record: IntegrationRecord) -> Result<i64>;

    async fn update(&self, record: &IntegrationRecord) -> Result<()>;

    /// Remove a row; `Ok(false)` when no such row existed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Replace the whole configuration document; returns rows affected.
    async fn save_configuration(&self, id: i64, config: &ConfigDocument) -> Result<u64>;

    /// Update a single configuration key; returns rows affected.
    async fn save_configuration_field(&self, id: i64, key: &str, value: &Value) -> Result<u64>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// BTreeMap-backed registry for tests and the CLI; id order doubles as
/// insertion order.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    rows: Arc<RwLock<BTreeMap<i64, IntegrationRecord>>>,
    next_id: AtomicI64,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row count (all teams, disabled included).
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl IntegrationRegistry for InMemoryRegistry {
    async fn get_team_integrations(
        &self,
        team: &TeamId,
        filter: &[String],
    ) -> Result<Vec<IntegrationRecord>> {
        let rows = self.rows.read().await;
        let team_rows = || {
            rows.values()
                .filter(|r| r.enabled && &r.team == team)
        };

        if filter.is_empty() {
            return Ok(team_rows().cloned().collect());
        }

        let mut out = Vec::new();
        for raw in filter {
            let name = resolve_canonical_name(raw);
            for record in team_rows() {
                if record.canonical_name == name {
                    out.push(record.clone());
                }
            }
        }
        Ok(out)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<IntegrationRecord>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn create(&self, mut record: IntegrationRecord) -> Result<i64> {
        let mut rows = self.rows.write().await;
        let duplicate = rows.values().any(|r| {
            r.canonical_name == record.canonical_name
                && r.team == record.team
                && r.agent == record.agent
        });
        if duplicate {
            return Err(Error::validation(format!(
                "integration {} already activated for team {}",
                record.canonical_name, record.team
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        record.id = id;
        record.updated_at = Utc::now();
        rows.insert(id, record);
        Ok(id)
    }

    async fn update(&self, record: &IntegrationRecord) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "integration row {} does not exist",
                record.id
            ))),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn save_configuration(&self, id: i64, config: &ConfigDocument) -> Result<u64> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(record) => {
                record.config = config.clone();
                record.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn save_configuration_field(&self, id: i64, key: &str, value: &Value) -> Result<u64> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(record) => {
                record.config.set(key, value.clone());
                record.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str) -> TeamId {
        TeamId::from_string(name.into()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = InMemoryRegistry::new();
        let id = registry
            .create(IntegrationRecord::new("copper", team("t1")))
            .await
            .unwrap();
        assert!(id > 0);

        let record = registry.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.canonical_name, "PROSPERWORKS");
        assert_eq!(record.display_alias.as_deref(), Some("COPPER"));
        assert!(record.identity().is_persisted());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_identity() {
        let registry = InMemoryRegistry::new();
        registry
            .create(IntegrationRecord::new("zoho", team("t1")))
            .await
            .unwrap();

        let err = registry
            .create(IntegrationRecord::new("ZOHO", team("t1")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already activated"));

        // Same name for another team is fine
        registry
            .create(IntegrationRecord::new("zoho", team("t2")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_filter_order_is_preserved() {
        let registry = InMemoryRegistry::new();
        for name in ["ZOHO", "PROSPERWORKS", "SALESFORCE"] {
            registry
                .create(IntegrationRecord::new(name, team("t1")))
                .await
                .unwrap();
        }

        let filter = vec!["salesforce".to_string(), "copper".to_string()];
        let records = registry
            .get_team_integrations(&team("t1"), &filter)
            .await
            .unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["SALESFORCE", "PROSPERWORKS"]);
    }

    #[tokio::test]
    async fn test_disabled_rows_are_hidden() {
        let registry = InMemoryRegistry::new();
        registry
            .create(IntegrationRecord::new("zoho", team("t1")).with_enabled(false))
            .await
            .unwrap();
        registry
            .create(IntegrationRecord::new("salesforce", team("t1")))
            .await
            .unwrap();

        let records = registry
            .get_team_integrations(&team("t1"), &[])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].canonical_name, "SALESFORCE");
    }

    #[tokio::test]
    async fn test_save_configuration_field() {
        let registry = InMemoryRegistry::new();
        let id = registry
            .create(IntegrationRecord::new("zoho", team("t1")))
            .await
            .unwrap();

        let affected = registry
            .save_configuration_field(id, "access_token", &serde_json::json!("at-9"))
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let record = registry.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.config.get_str("access_token"), Some("at-9"));

        let missing = registry
            .save_configuration_field(999, "k", &serde_json::json!(1))
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let registry = InMemoryRegistry::new();
        let id = registry
            .create(IntegrationRecord::new("zoho", team("t1")))
            .await
            .unwrap();

        let mut record = registry.get_by_id(id).await.unwrap().unwrap();
        record.enabled = false;
        registry.update(&record).await.unwrap();
        assert!(!registry.get_by_id(id).await.unwrap().unwrap().enabled);

        assert!(registry.delete(id).await.unwrap());
        assert!(!registry.delete(id).await.unwrap());
        assert!(registry.get_by_id(id).await.unwrap().is_none());

        let ghost = IntegrationRecord::new("zoho", team("t1"));
        assert!(registry.update(&ghost).await.is_err());
    }
}
