use serde_json::Value;
use tracing::debug;

use crate::types::{EntityKind, Fields, LocalId};

/// Allocates local ids before the remote write and embeds them in the payload
///
/// The external system echoes the correlation field back, so the remote
/// record can always be matched to the local record that will mirror it.
#[derive(Debug, Clone)]
pub struct CorrelationPinner {
    field: String,
}

impl CorrelationPinner {
    /// Create a pinner writing into the given payload field
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Payload field holding the pinned id
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Pin a fresh local id
    pub fn pin(&self, kind: EntityKind) -> PinnedId {
        self.pin_with(kind, LocalId::generate())
    }

    /// Pin a caller-chosen local id
    pub fn pin_with(&self, kind: EntityKind, id: LocalId) -> PinnedId {
        debug!(%kind, local_id = %id, "Pinned local id");
        PinnedId {
            kind,
            id,
            consumed: false,
        }
    }

    /// Write the pinned id into a remote payload
    pub fn embed(&self, pinned: &PinnedId, payload: &mut Fields) {
        payload.insert(self.field.clone(), Value::String(pinned.id.to_string()));
    }
}

/// A local id reserved for exactly one local insert
///
/// Not `Clone`: the id is handed over by value to the insert that uses it,
/// so it cannot end up on two records. Dropping it unused discards the id.
#[derive(Debug)]
pub struct PinnedId {
    kind: EntityKind,
    id: LocalId,
    consumed: bool,
}

impl PinnedId {
    /// The pinned id
    pub fn local_id(&self) -> &LocalId {
        &self.id
    }

    /// Kind of the entity the id was pinned for
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Hand the id over to the local insert
    pub fn consume(mut self) -> LocalId {
        self.consumed = true;
        std::mem::take(&mut self.id.0).into()
    }
}

impl Drop for PinnedId {
    fn drop(&mut self) {
        if !self.consumed {
            debug!(kind = %self.kind, local_id = %self.id, "Discarded pinned id");
        }
    }
}
