//! Local store port
//!
//! The local store mirrors every entity written to the external system.
//! Implementations live in their own crates; the orchestrator only sees
//! this trait.

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::types::{EntityKind, ExternalId, Fields, LocalId, LocalRecord};

/// Changes applied to an existing local record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    /// External id to record; only accepted while the record is unsynced
    pub external_id: Option<ExternalId>,
    /// Fields merged over the existing ones
    pub fields: Fields,
}

impl RecordPatch {
    /// Patch that only replaces fields
    pub fn fields(fields: Fields) -> Self {
        Self {
            external_id: None,
            fields,
        }
    }
}

impl LocalRecord {
    /// Apply a patch in place
    ///
    /// Fields are merged key by key. The external id can be set once;
    /// changing a set id fails and leaves the record untouched.
    pub fn apply(&mut self, patch: RecordPatch) -> Result<(), StoreError> {
        if let Some(external_id) = patch.external_id {
            match &self.external_id {
                Some(current) if *current != external_id => {
                    return Err(StoreError::ExternalIdImmutable(
                        self.kind,
                        self.local_id.clone(),
                    ));
                }
                Some(_) => {}
                None => self.external_id = Some(external_id),
            }
        }
        for (key, value) in patch.fields {
            self.fields.insert(key, value);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Storage for local records
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert a new record; fails if the local or external id is taken
    async fn insert(&self, record: LocalRecord) -> Result<LocalRecord, StoreError>;

    /// Apply a patch to an existing record
    async fn update(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        patch: RecordPatch,
    ) -> Result<LocalRecord, StoreError>;

    /// Delete a record
    async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), StoreError>;

    /// Find a record by local id
    async fn find_by_id(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<LocalRecord>, StoreError>;

    /// Find a record by external id
    async fn find_by_external_id(
        &self,
        kind: EntityKind,
        external_id: &ExternalId,
    ) -> Result<Option<LocalRecord>, StoreError>;

    /// Find the records whose fields equal every criterion, oldest first
    async fn find_where(
        &self,
        kind: EntityKind,
        criteria: &Fields,
    ) -> Result<Vec<LocalRecord>, StoreError>;
}
