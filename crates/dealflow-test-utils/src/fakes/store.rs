//! Local store wrapper with scripted failures.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use dealflow_core::{
    EntityKind, ExternalId, Fields, LocalId, LocalRecord, LocalStore, RecordPatch, StoreError,
};
use dealflow_state_inmemory::InMemoryLocalStore;

/// Local store operation a failure can be scripted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Inserts
    Insert,
    /// Updates
    Update,
    /// Deletes
    Delete,
    /// Any lookup
    Read,
}

/// In-memory store that fails on demand
#[derive(Clone, Default)]
pub struct FailableLocalStore {
    inner: InMemoryLocalStore,
    failures: Arc<RwLock<Vec<(StoreOp, EntityKind)>>>,
}

impl FailableLocalStore {
    /// Create an empty store with no scripted failures
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `op` on records of `kind`
    pub fn fail(&self, op: StoreOp, kind: EntityKind) {
        self.failures.write().push((op, kind));
    }

    /// Drop every scripted failure
    pub fn heal(&self) {
        self.failures.write().clear();
    }

    /// The wrapped store, which never fails
    pub fn inner(&self) -> &InMemoryLocalStore {
        &self.inner
    }

    fn check(&self, op: StoreOp, kind: EntityKind) -> Result<(), StoreError> {
        if self.failures.read().contains(&(op, kind)) {
            return Err(StoreError::Backend(format!(
                "Injected {:?} failure for {}",
                op, kind
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FailableLocalStore {
    async fn insert(&self, record: LocalRecord) -> Result<LocalRecord, StoreError> {
        self.check(StoreOp::Insert, record.kind)?;
        self.inner.insert(record).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        patch: RecordPatch,
    ) -> Result<LocalRecord, StoreError> {
        self.check(StoreOp::Update, kind)?;
        self.inner.update(kind, local_id, patch).await
    }

    async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), StoreError> {
        self.check(StoreOp::Delete, kind)?;
        self.inner.delete(kind, local_id).await
    }

    async fn find_by_id(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<LocalRecord>, StoreError> {
        self.check(StoreOp::Read, kind)?;
        self.inner.find_by_id(kind, local_id).await
    }

    async fn find_by_external_id(
        &self,
        kind: EntityKind,
        external_id: &ExternalId,
    ) -> Result<Option<LocalRecord>, StoreError> {
        self.check(StoreOp::Read, kind)?;
        self.inner.find_by_external_id(kind, external_id).await
    }

    async fn find_where(
        &self,
        kind: EntityKind,
        criteria: &Fields,
    ) -> Result<Vec<LocalRecord>, StoreError> {
        self.check(StoreOp::Read, kind)?;
        self.inner.find_where(kind, criteria).await
    }
}
