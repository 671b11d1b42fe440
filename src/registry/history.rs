//! Object history — artifacts recorded per dispatched event.
//!
//! Keyed by (object key, team, integration name). The upsert is
//! lookup-then-write: the same call or conversation flowing through twice
//! updates one row instead of creating a second. Concurrent events racing on
//! one key resolve last-write-wins; the store is not transactional.

use crate::types::{Result, TeamId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identity of one history row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub object_key: String,
    pub team: TeamId,
    pub integration: String,
}

impl HistoryKey {
    pub fn new(object_key: impl Into<String>, team: TeamId, integration: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            team,
            integration: integration.into(),
        }
    }
}

/// One stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub key: HistoryKey,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an upsert found an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persistence seam for event artifacts.
#[async_trait]
pub trait ObjectHistory: Send + Sync {
    async fn find(&self, key: &HistoryKey) -> Result<Option<HistoryRecord>>;

    /// Insert or overwrite the row for `key`.
    async fn upsert(&self, key: HistoryKey, data: Value) -> Result<UpsertOutcome>;

    /// Retention sweep; returns removed row count.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

/// Bounded in-memory history store.
///
/// When the bound is exceeded the stalest rows (by update time) are evicted
/// first.
#[derive(Debug)]
pub struct InMemoryHistory {
    rows: Arc<RwLock<HashMap<HistoryKey, HistoryRecord>>>,
    max_entries: usize,
}

impl InMemoryHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            max_entries,
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new(crate::types::HistoryConfig::default().max_entries)
    }
}

#[async_trait]
impl ObjectHistory for InMemoryHistory {
    async fn find(&self, key: &HistoryKey) -> Result<Option<HistoryRecord>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: HistoryKey, data: Value) -> Result<UpsertOutcome> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();

        let outcome = match rows.get_mut(&key) {
            Some(existing) => {
                existing.data = data;
                existing.updated_at = now;
                UpsertOutcome::Updated
            }
            None => {
                rows.insert(
                    key.clone(),
                    HistoryRecord {
                        key,
                        data,
                        created_at: now,
                        updated_at: now,
                    },
                );
                UpsertOutcome::Inserted
            }
        };

        // Evict stalest rows beyond the bound
        while rows.len() > self.max_entries {
            let stalest = rows
                .values()
                .min_by_key(|r| r.updated_at)
                .map(|r| r.key.clone());
            match stalest {
                Some(key) => {
                    rows.remove(&key);
                }
                None => break,
            }
        }

        Ok(outcome)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, record| record.updated_at >= cutoff);
        Ok(before - rows.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }
}
