use std::sync::Arc;
use tracing::debug;

use crate::domain::repository::LocalStore;
use crate::error::StepError;
use crate::types::{EntityKind, ExternalId, LocalId, LocalRecord};

/// Translates between local and external identifiers through the local store
#[derive(Clone)]
pub struct ReferenceResolver {
    store: Arc<dyn LocalStore>,
}

impl ReferenceResolver {
    /// Create a resolver over a local store
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Load a local record; absence is `NotFound`
    pub async fn load(&self, kind: EntityKind, local_id: &LocalId) -> Result<LocalRecord, StepError> {
        self.store
            .find_by_id(kind, local_id)
            .await?
            .ok_or_else(|| StepError::not_found(kind, local_id))
    }

    /// External id of a local record
    ///
    /// Fails with `NotFound` when the record does not exist and with
    /// `NotSynced` when it exists without an external id. No remote call is
    /// ever made with an unresolved reference.
    pub async fn resolve(&self, kind: EntityKind, local_id: &LocalId) -> Result<ExternalId, StepError> {
        let (_, external_id) = self.load_synced(kind, local_id).await?;
        Ok(external_id)
    }

    /// Load a record that must already be synced
    pub async fn load_synced(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<(LocalRecord, ExternalId), StepError> {
        let record = self.load(kind, local_id).await?;
        match record.external_id.clone() {
            Some(external_id) => {
                debug!(%kind, %local_id, %external_id, "Resolved reference");
                Ok((record, external_id))
            }
            None => Err(StepError::NotSynced {
                entity: kind,
                local_id: local_id.clone(),
            }),
        }
    }

    /// Local id of the record mirroring an external id
    pub async fn resolve_local(
        &self,
        kind: EntityKind,
        external_id: &ExternalId,
    ) -> Result<LocalId, StepError> {
        self.store
            .find_by_external_id(kind, external_id)
            .await?
            .map(|record| record.local_id)
            .ok_or_else(|| StepError::not_found_external(kind, external_id))
    }
}
