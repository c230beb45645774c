use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{EntityKind, ExternalId, LocalId};

/// Classified failure of a single workflow step
///
/// Every step outcome that is not a success ends up as one of these and is
/// reported inside the workflow result; nothing is swallowed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StepError {
    /// The referenced local record does not exist
    #[error("{entity} {reference} not found")]
    NotFound {
        /// Kind of the missing record
        entity: EntityKind,
        /// Local or external identifier that was looked up
        reference: String,
    },

    /// The local record exists but has no external id yet
    #[error("{entity} {local_id} has not been synced to the external system")]
    NotSynced {
        /// Kind of the unsynced record
        entity: EntityKind,
        /// Its local identifier
        local_id: LocalId,
    },

    /// Network failure, timeout or transient remote error; retryable
    #[error("External system unavailable: {message}")]
    RemoteUnavailable {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// The external system refused the request; not retryable as-is
    #[error("External system rejected the request ({status}): {message}")]
    RemoteRejected {
        /// HTTP status
        status: u16,
        /// Message returned by the external system
        message: String,
    },

    /// The remote write happened but the local mirror did not
    #[error("{entity} {external_id} exists remotely but the local write failed: {message}")]
    LocalPersistenceFailed {
        /// Kind of the entity
        entity: EntityKind,
        /// Identifier of the remote record that needs a local counterpart
        external_id: ExternalId,
        /// Local id that was meant to hold the mirror, if one was pinned
        local_id: Option<LocalId>,
        /// Payload sent to the external system
        payload: Value,
        /// Local store failure
        message: String,
    },

    /// Input or pre-check failure
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// What was invalid
        message: String,
    },

    /// The local store failed before any remote write
    #[error("Local store failed: {message}")]
    LocalStoreFailed {
        /// Local store failure
        message: String,
    },
}

impl StepError {
    /// Create a not-found error for a local id
    pub fn not_found(entity: EntityKind, local_id: &LocalId) -> Self {
        StepError::NotFound {
            entity,
            reference: local_id.to_string(),
        }
    }

    /// Create a not-found error for an external id
    pub fn not_found_external(entity: EntityKind, external_id: &ExternalId) -> Self {
        StepError::NotFound {
            entity,
            reference: external_id.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        StepError::ValidationFailed {
            message: message.into(),
        }
    }

    /// Whether the whole step may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::RemoteUnavailable { .. })
    }

    /// The remote identifier carried by the error, if any
    pub fn remote_ref(&self) -> Option<&ExternalId> {
        match self {
            StepError::LocalPersistenceFailed { external_id, .. } => Some(external_id),
            _ => None,
        }
    }

    /// Short class name of the error
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepError::NotFound { .. } => "NotFound",
            StepError::NotSynced { .. } => "NotSynced",
            StepError::RemoteUnavailable { .. } => "RemoteUnavailable",
            StepError::RemoteRejected { .. } => "RemoteRejected",
            StepError::LocalPersistenceFailed { .. } => "LocalPersistenceFailed",
            StepError::ValidationFailed { .. } => "ValidationFailed",
            StepError::LocalStoreFailed { .. } => "LocalStoreFailed",
        }
    }
}

impl From<RemoteError> for StepError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable { status, message } => {
                StepError::RemoteUnavailable { status, message }
            }
            RemoteError::Rejected { status, body } => StepError::RemoteRejected {
                status,
                message: body,
            },
        }
    }
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        StepError::LocalStoreFailed {
            message: err.to_string(),
        }
    }
}

/// Normalized failure of an external system call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No usable response: network failure, timeout or transient status
    #[error("Request could not be completed: {message}")]
    Unavailable {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// The request was refused, or succeeded with a response that cannot be used
    #[error("Request rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body or extracted message
        body: String,
    },
}

impl RemoteError {
    /// Classify a failed HTTP status
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status >= 500 || status == 408 || status == 429 {
            RemoteError::Unavailable {
                status: Some(status),
                message: body,
            }
        } else {
            RemoteError::Rejected { status, body }
        }
    }

    /// A success response whose body cannot be used
    ///
    /// The remote side may have applied the request, so this is never
    /// classified as retryable.
    pub fn unusable_success(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            body: format!(
                "Request may have been applied but the response is unusable: {}",
                message.into()
            ),
        }
    }

    /// Create an error for a request that never got a response
    pub fn unavailable(message: impl Into<String>) -> Self {
        RemoteError::Unavailable {
            status: None,
            message: message.into(),
        }
    }
}

/// Local store error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record not found
    #[error("{0} record {1} not found")]
    NotFound(EntityKind, LocalId),

    /// A record with the same local or external id already exists
    #[error("{0} record {1} already exists")]
    Duplicate(EntityKind, String),

    /// An already-set external id would change
    #[error("External id of {0} {1} cannot change once set")]
    ExternalIdImmutable(EntityKind, LocalId),

    /// Backend failure
    #[error("Local store backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            RemoteError::from_status(503, "down"),
            RemoteError::Unavailable { status: Some(503), .. }
        ));
        assert!(matches!(
            RemoteError::from_status(429, "slow down"),
            RemoteError::Unavailable { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(408, "timeout"),
            RemoteError::Unavailable { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(400, "bad amount"),
            RemoteError::Rejected { status: 400, .. }
        ));
        assert!(matches!(
            RemoteError::from_status(404, "missing"),
            RemoteError::Rejected { status: 404, .. }
        ));
    }

    #[test]
    fn test_remote_error_maps_to_step_error() {
        let step: StepError = RemoteError::from_status(422, "amount must be positive").into();
        assert_eq!(
            step,
            StepError::RemoteRejected {
                status: 422,
                message: "amount must be positive".to_string()
            }
        );
        assert!(!step.is_retryable());

        let step: StepError = RemoteError::unavailable("connection reset").into();
        assert!(step.is_retryable());
    }

    #[test]
    fn test_step_error_serializes_with_kind_tag() {
        let error = StepError::RemoteRejected {
            status: 400,
            message: "invalid".to_string(),
        };
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["kind"], json!("RemoteRejected"));
        assert_eq!(value["status"], json!(400));
        assert_eq!(error.kind_name(), "RemoteRejected");
    }

    #[test]
    fn test_local_persistence_failure_exposes_remote_ref() {
        let error = StepError::LocalPersistenceFailed {
            entity: EntityKind::PriceList,
            external_id: "PL-9".into(),
            local_id: Some("pl-local".into()),
            payload: json!({"name": "Q3"}),
            message: "disk full".to_string(),
        };
        assert_eq!(error.remote_ref().map(ExternalId::as_str), Some("PL-9"));
        assert!(error.to_string().contains("PL-9"));
        assert!(StepError::validation("x").remote_ref().is_none());
    }
}
