//! In-memory local store for Dealflow
//!
//! Keeps every record in process memory behind a single lock, so the
//! uniqueness checks and the write they guard happen atomically. Useful for
//! development, tests and single-node deployments that do not need the
//! mirror to survive a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use dealflow_core::{
    EntityKind, ExternalId, Fields, LocalId, LocalRecord, LocalStore, RecordPatch, StoreError,
};


#[derive(Default)]
struct Tables {
    records: HashMap<(EntityKind, LocalId), LocalRecord>,
    by_external_id: HashMap<(EntityKind, ExternalId), LocalId>,
}

/// Local store held in memory
#[derive(Clone, Default)]
pub struct InMemoryLocalStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLocalStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of a kind
    pub async fn count(&self, kind: EntityKind) -> usize {
        let tables = self.tables.read().await;
        tables.records.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Drop every record
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.records.clear();
        tables.by_external_id.clear();
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn insert(&self, record: LocalRecord) -> Result<LocalRecord, StoreError> {
        let mut tables = self.tables.write().await;
        let key = (record.kind, record.local_id.clone());

        if tables.records.contains_key(&key) {
            return Err(StoreError::Duplicate(record.kind, record.local_id.to_string()));
        }
        if let Some(external_id) = &record.external_id {
            if tables
                .by_external_id
                .contains_key(&(record.kind, external_id.clone()))
            {
                return Err(StoreError::Duplicate(record.kind, external_id.to_string()));
            }
            tables
                .by_external_id
                .insert((record.kind, external_id.clone()), record.local_id.clone());
        }

        debug!(kind = %record.kind, local_id = %record.local_id, "Inserted record");
        tables.records.insert(key, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        patch: RecordPatch,
    ) -> Result<LocalRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(external_id) = &patch.external_id {
            if let Some(owner) = tables.by_external_id.get(&(kind, external_id.clone())) {
                if owner != local_id {
                    return Err(StoreError::Duplicate(kind, external_id.to_string()));
                }
            }
        }

        let record = tables
            .records
            .get_mut(&(kind, local_id.clone()))
            .ok_or_else(|| StoreError::NotFound(kind, local_id.clone()))?;
        let had_external_id = record.external_id.is_some();
        record.apply(patch)?;
        let updated = record.clone();

        if !had_external_id {
            if let Some(external_id) = &updated.external_id {
                tables
                    .by_external_id
                    .insert((kind, external_id.clone()), local_id.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .records
            .remove(&(kind, local_id.clone()))
            .ok_or_else(|| StoreError::NotFound(kind, local_id.clone()))?;
        if let Some(external_id) = record.external_id {
            tables.by_external_id.remove(&(kind, external_id));
        }
        debug!(%kind, %local_id, "Deleted record");
        Ok(())
    }

    async fn find_by_id(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<LocalRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.records.get(&(kind, local_id.clone())).cloned())
    }

    async fn find_by_external_id(
        &self,
        kind: EntityKind,
        external_id: &ExternalId,
    ) -> Result<Option<LocalRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_external_id
            .get(&(kind, external_id.clone()))
            .and_then(|local_id| tables.records.get(&(kind, local_id.clone())))
            .cloned())
    }

    async fn find_where(
        &self,
        kind: EntityKind,
        criteria: &Fields,
    ) -> Result<Vec<LocalRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut found: Vec<LocalRecord> = tables
            .records
            .iter()
            .filter(|((k, _), record)| *k == kind && record.matches(criteria))
            .map(|(_, record)| record.clone())
            .collect();
        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.local_id.cmp(&b.local_id))
        });
        Ok(found)
    }
}
