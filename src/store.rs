use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{Domain, EntityKind, MetricSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn global(domain: Domain) -> Self {
        Self(format!("{}:global", domain.label()))
    }

    pub fn scoped(domain: Domain, kind: EntityKind, id: &str) -> Self {
        if matches!(kind, EntityKind::Global) {
            return Self::global(domain);
        }
        Self(format!("{}:{}:{}", domain.label(), kind.label(), id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub metrics: MetricSet,
    pub created_at_ms: u64,
}

pub struct ScopedMetricStore {
    ttl: Duration,
    path: Option<PathBuf>,
    entries: RwLock<HashMap<EntityId, StoredEntry>>,
}

impl ScopedMetricStore {
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            ttl,
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load(path: Option<PathBuf>, ttl: Duration) -> Self {
        let Some(path) = path else {
            return Self::in_memory(ttl);
        };

        let entries = match read_entries(&path).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %path.display(), "metric store unavailable, using memory only: {}", err);
                HashMap::new()
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "metric store loaded");

        Self {
            ttl,
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, entity: &EntityId) -> Option<MetricSet> {
        self.get_at(entity, now_ms()).await
    }

    pub async fn get_at(&self, entity: &EntityId, now_ms: u64) -> Option<MetricSet> {
        let guard = self.entries.read().await;
        guard
            .get(entity)
            .filter(|entry| !self.is_expired(entry, now_ms))
            .map(|entry| entry.metrics.clone())
    }

    pub async fn put(&self, entity: EntityId, metrics: MetricSet) {
        self.put_at(entity, metrics, now_ms()).await;
    }

    pub async fn put_at(&self, entity: EntityId, metrics: MetricSet, now_ms: u64) {
        let mut guard = self.entries.write().await;
        guard.insert(
            entity,
            StoredEntry {
                metrics,
                created_at_ms: now_ms,
            },
        );
        self.persist_or_warn(&guard).await;
    }

    // Shallow; never extends the entry's lifetime.
    pub async fn merge_partial(&self, entity: &EntityId, partial: &MetricSet) -> MetricSet {
        self.merge_partial_at(entity, partial, now_ms()).await
    }

    pub async fn merge_partial_at(
        &self,
        entity: &EntityId,
        partial: &MetricSet,
        now_ms: u64,
    ) -> MetricSet {
        let mut guard = self.entries.write().await;
        let live = guard
            .get(entity)
            .map(|entry| !self.is_expired(entry, now_ms))
            .unwrap_or(false);

        let merged = if live {
            let entry = match guard.get_mut(entity) {
                Some(entry) => entry,
                None => return partial.clone(),
            };
            entry.metrics.merge(partial);
            entry.metrics.clone()
        } else {
            guard.insert(
                entity.clone(),
                StoredEntry {
                    metrics: partial.clone(),
                    created_at_ms: now_ms,
                },
            );
            partial.clone()
        };

        self.persist_or_warn(&guard).await;
        merged
    }

    pub async fn clear(&self) {
        let mut guard = self.entries.write().await;
        guard.clear();
        self.persist_or_warn(&guard).await;
    }

    pub async fn len(&self) -> usize {
        let guard = self.entries.read().await;
        guard.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_expired(&self, entry: &StoredEntry, now_ms: u64) -> bool {
        let ttl_ms = self.ttl.as_millis() as u64;
        now_ms.saturating_sub(entry.created_at_ms) >= ttl_ms
    }

    async fn persist_or_warn(&self, entries: &HashMap<EntityId, StoredEntry>) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if let Err(err) = persist(path, entries).await {
            warn!(path = %path.display(), "metric store write failed, keeping memory copy: {}", err);
        }
    }
}

async fn read_entries(path: &Path) -> Result<HashMap<EntityId, StoredEntry>, String> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| format!("failed to read metric store: {}", err))?;
    if data.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(&data).map_err(|err| format!("failed to parse metric store: {}", err))
}

async fn persist(path: &Path, entries: &HashMap<EntityId, StoredEntry>) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    let payload = serde_json::to_string_pretty(entries)
        .map_err(|err| format!("failed to serialize metric store: {}", err))?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, payload)
        .await
        .map_err(|err| format!("failed to write metric store: {}", err))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|err| format!("failed to finalize metric store: {}", err))?;
    Ok(())
}

async fn ensure_dir(path: &Path) -> Result<(), String> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|err| format!("failed to create metric store dir: {}", err))
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
