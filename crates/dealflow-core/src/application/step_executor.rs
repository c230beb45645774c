//! Remote-then-local step execution
//!
//! A step writes one entity to the external system and then mirrors it into
//! the local store. The local write never happens before the remote write
//! succeeds, and a local failure after a remote success is reported with
//! the remote id so the mirror can be repaired.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::application::pinner::PinnedId;
use crate::domain::external::{ExternalSystem, RemoteRecord};
use crate::domain::repository::{LocalStore, RecordPatch};
use crate::domain::result::ItemResult;
use crate::error::{StepError, StoreError};
use crate::types::{
    Credential, EntityKind, ExternalId, Fields, LocalId, LocalRecord, SyncRef, Synced,
};

/// Lifecycle of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Nothing has been attempted
    NotStarted,
    /// The remote write is in flight
    RemoteStepRunning,
    /// The remote write failed; terminal
    RemoteStepFailed,
    /// The remote write succeeded and the local mirror is being written
    LocalMirrorRunning,
    /// The local mirror failed after a remote success; terminal
    MirrorFailed,
    /// Both writes succeeded; terminal
    StepComplete,
}

impl StepPhase {
    fn rank(self) -> u8 {
        match self {
            StepPhase::NotStarted => 0,
            StepPhase::RemoteStepRunning => 1,
            StepPhase::RemoteStepFailed => 2,
            StepPhase::LocalMirrorRunning => 2,
            StepPhase::MirrorFailed => 3,
            StepPhase::StepComplete => 3,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepPhase::RemoteStepFailed | StepPhase::MirrorFailed | StepPhase::StepComplete
        )
    }

    /// Whether the phase may move to `next`; phases only move forward
    pub fn can_advance_to(self, next: StepPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            StepPhase::RemoteStepFailed => self == StepPhase::RemoteStepRunning,
            StepPhase::MirrorFailed | StepPhase::StepComplete => {
                self == StepPhase::LocalMirrorRunning
            }
            _ => next.rank() > self.rank(),
        }
    }
}

struct PhaseTracker {
    kind: EntityKind,
    phase: StepPhase,
}

impl PhaseTracker {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            phase: StepPhase::NotStarted,
        }
    }

    fn advance(&mut self, next: StepPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid step transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(kind = %self.kind, from = ?self.phase, to = ?next, "Step phase");
        self.phase = next;
    }
}

enum StepAction {
    Create {
        pinned: PinnedId,
        payload: Fields,
        local_fields: Fields,
    },
    Adopt {
        pinned: PinnedId,
        remote: RemoteRecord,
        local_fields: Fields,
    },
    Update {
        local_id: LocalId,
        external_id: ExternalId,
        payload: Fields,
        local_fields: Fields,
    },
    Delete {
        local_id: LocalId,
        external_id: Option<ExternalId>,
    },
}

/// One unit of remote-then-local work
pub struct StepSpec {
    kind: EntityKind,
    input: Value,
    action: StepAction,
}

impl StepSpec {
    /// Create the entity remotely, then insert it locally under the pinned id
    ///
    /// `payload` must already carry the pinned id in the correlation field.
    pub fn create(
        kind: EntityKind,
        input: Value,
        pinned: PinnedId,
        payload: Fields,
        local_fields: Fields,
    ) -> Self {
        Self {
            kind,
            input,
            action: StepAction::Create {
                pinned,
                payload,
                local_fields,
            },
        }
    }

    /// Mirror an entity the external system already created
    pub fn adopt(
        kind: EntityKind,
        input: Value,
        pinned: PinnedId,
        remote: RemoteRecord,
        local_fields: Fields,
    ) -> Self {
        Self {
            kind,
            input,
            action: StepAction::Adopt {
                pinned,
                remote,
                local_fields,
            },
        }
    }

    /// Update the entity remotely, then patch the local record
    pub fn update(
        kind: EntityKind,
        input: Value,
        local_id: LocalId,
        external_id: ExternalId,
        payload: Fields,
        local_fields: Fields,
    ) -> Self {
        Self {
            kind,
            input,
            action: StepAction::Update {
                local_id,
                external_id,
                payload,
                local_fields,
            },
        }
    }

    /// Delete the entity remotely, then locally
    ///
    /// An unsynced record has nothing to delete remotely and only the local
    /// delete runs.
    pub fn delete(
        kind: EntityKind,
        input: Value,
        local_id: LocalId,
        external_id: Option<ExternalId>,
    ) -> Self {
        Self {
            kind,
            input,
            action: StepAction::Delete {
                local_id,
                external_id,
            },
        }
    }

    /// Kind of the entity the step writes
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Input reported alongside the step's result
    pub fn input(&self) -> &Value {
        &self.input
    }
}

/// What a successful step produced
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Kind of the entity
    pub kind: EntityKind,
    /// Local id of the entity
    pub local_id: LocalId,
    /// External id of the entity, absent for a local-only delete
    pub external_id: Option<ExternalId>,
    /// The local record after the step; absent for deletes
    pub record: Option<LocalRecord>,
    /// Fields returned by the external system
    pub remote_fields: Fields,
}

impl StepOutput {
    /// Reference to the written entity
    pub fn sync_ref(&self) -> SyncRef {
        SyncRef {
            kind: self.kind,
            local_id: self.local_id.clone(),
            external_id: self.external_id.clone(),
        }
    }

    /// Both identifiers, when the entity exists remotely
    pub fn synced(&self) -> Option<Synced> {
        self.external_id.as_ref().map(|external_id| Synced {
            local_id: self.local_id.clone(),
            external_id: external_id.clone(),
        })
    }
}

/// Runs steps against the external system and the local store
#[derive(Clone)]
pub struct StepExecutor {
    external: Arc<dyn ExternalSystem>,
    store: Arc<dyn LocalStore>,
}

impl StepExecutor {
    /// Create a step executor
    pub fn new(external: Arc<dyn ExternalSystem>, store: Arc<dyn LocalStore>) -> Self {
        Self { external, store }
    }

    /// Run a step: remote write first, local mirror second
    #[instrument(skip(self, credential, spec), fields(kind = %spec.kind))]
    pub async fn execute(
        &self,
        credential: &Credential,
        spec: StepSpec,
    ) -> Result<StepOutput, StepError> {
        let kind = spec.kind;
        let mut tracker = PhaseTracker::new(kind);

        match spec.action {
            StepAction::Create {
                pinned,
                payload,
                local_fields,
            } => {
                tracker.advance(StepPhase::RemoteStepRunning);
                let remote = match self
                    .external
                    .create(credential, kind.collection(), &payload)
                    .await
                {
                    Ok(remote) => remote,
                    Err(err) => {
                        tracker.advance(StepPhase::RemoteStepFailed);
                        warn!(%kind, local_id = %pinned.local_id(), error = %err, "Remote create failed");
                        return Err(err.into());
                    }
                };

                tracker.advance(StepPhase::LocalMirrorRunning);
                self.mirror_insert(&mut tracker, pinned, remote, local_fields, payload)
                    .await
            }

            StepAction::Adopt {
                pinned,
                remote,
                local_fields,
            } => {
                tracker.advance(StepPhase::LocalMirrorRunning);
                let payload = remote.fields.clone();
                self.mirror_insert(&mut tracker, pinned, remote, local_fields, payload)
                    .await
            }

            StepAction::Update {
                local_id,
                external_id,
                payload,
                local_fields,
            } => {
                tracker.advance(StepPhase::RemoteStepRunning);
                let remote_fields = match self
                    .external
                    .update(credential, kind.collection(), &external_id, &payload)
                    .await
                {
                    Ok(fields) => fields,
                    Err(err) => {
                        tracker.advance(StepPhase::RemoteStepFailed);
                        warn!(%kind, %local_id, %external_id, error = %err, "Remote update failed");
                        return Err(err.into());
                    }
                };

                tracker.advance(StepPhase::LocalMirrorRunning);
                match self
                    .store
                    .update(kind, &local_id, RecordPatch::fields(local_fields))
                    .await
                {
                    Ok(record) => {
                        tracker.advance(StepPhase::StepComplete);
                        Ok(StepOutput {
                            kind,
                            local_id,
                            external_id: Some(external_id),
                            record: Some(record),
                            remote_fields,
                        })
                    }
                    Err(err) => {
                        tracker.advance(StepPhase::MirrorFailed);
                        Err(mirror_failure(kind, external_id, Some(local_id), payload, err))
                    }
                }
            }

            StepAction::Delete {
                local_id,
                external_id,
            } => {
                if let Some(external_id) = &external_id {
                    tracker.advance(StepPhase::RemoteStepRunning);
                    if let Err(err) = self
                        .external
                        .delete(credential, kind.collection(), external_id)
                        .await
                    {
                        tracker.advance(StepPhase::RemoteStepFailed);
                        warn!(%kind, %local_id, %external_id, error = %err, "Remote delete failed");
                        return Err(err.into());
                    }
                }

                tracker.advance(StepPhase::LocalMirrorRunning);
                match self.store.delete(kind, &local_id).await {
                    Ok(()) => {
                        tracker.advance(StepPhase::StepComplete);
                        Ok(StepOutput {
                            kind,
                            local_id,
                            external_id,
                            record: None,
                            remote_fields: Fields::new(),
                        })
                    }
                    Err(err) => {
                        tracker.advance(StepPhase::MirrorFailed);
                        match external_id {
                            Some(external_id) => Err(mirror_failure(
                                kind,
                                external_id,
                                Some(local_id),
                                Value::Null,
                                err,
                            )),
                            None => Err(err.into()),
                        }
                    }
                }
            }
        }
    }

    /// Invoke a remote computation; nothing is mirrored locally
    #[instrument(skip(self, credential, payload))]
    pub async fn invoke(
        &self,
        credential: &Credential,
        action: &str,
        payload: &Fields,
    ) -> Result<Value, StepError> {
        self.external
            .invoke(credential, action, payload)
            .await
            .map_err(|err| {
                warn!(%action, error = %err, "Remote action failed");
                err.into()
            })
    }

    /// Run a step and fold its outcome into an item result
    pub async fn execute_item(&self, credential: &Credential, spec: StepSpec) -> ItemResult {
        let input = spec.input.clone();
        match self.execute(credential, spec).await {
            Ok(output) => ItemResult::succeeded(input, output.external_id, Some(output.local_id)),
            Err(err) => ItemResult::failed(input, err),
        }
    }

    async fn mirror_insert(
        &self,
        tracker: &mut PhaseTracker,
        pinned: PinnedId,
        remote: RemoteRecord,
        local_fields: Fields,
        payload: Fields,
    ) -> Result<StepOutput, StepError> {
        let kind = tracker.kind;
        let local_id = pinned.consume();
        let record = LocalRecord::new(
            kind,
            local_id.clone(),
            Some(remote.external_id.clone()),
            local_fields,
        );

        match self.store.insert(record).await {
            Ok(record) => {
                tracker.advance(StepPhase::StepComplete);
                Ok(StepOutput {
                    kind,
                    local_id,
                    external_id: Some(remote.external_id),
                    record: Some(record),
                    remote_fields: remote.fields,
                })
            }
            Err(err) => {
                tracker.advance(StepPhase::MirrorFailed);
                Err(mirror_failure(
                    kind,
                    remote.external_id,
                    Some(local_id),
                    Value::Object(payload),
                    err,
                ))
            }
        }
    }
}

fn mirror_failure(
    kind: EntityKind,
    external_id: ExternalId,
    local_id: Option<LocalId>,
    payload: impl Into<Value>,
    err: StoreError,
) -> StepError {
    error!(
        %kind,
        %external_id,
        local_id = ?local_id,
        error = %err,
        "Local mirror failed after remote write; the local store needs repair"
    );
    StepError::LocalPersistenceFailed {
        entity: kind,
        external_id,
        local_id,
        payload: payload.into(),
        message: err.to_string(),
    }
}
