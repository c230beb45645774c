//! External system port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::types::{Credential, ExternalId, Fields};

/// Record returned by a remote create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Identifier assigned by the external system
    pub external_id: ExternalId,
    /// Fields echoed back by the external system
    #[serde(default)]
    pub fields: Fields,
}

/// Client of the system of record
///
/// Every call runs on behalf of the caller whose credential is passed in;
/// implementations never hold a credential of their own.
#[async_trait]
pub trait ExternalSystem: Send + Sync {
    /// Create a record in a collection
    async fn create(
        &self,
        credential: &Credential,
        collection: &str,
        payload: &Fields,
    ) -> Result<RemoteRecord, RemoteError>;

    /// Update a record
    async fn update(
        &self,
        credential: &Credential,
        collection: &str,
        external_id: &ExternalId,
        payload: &Fields,
    ) -> Result<Fields, RemoteError>;

    /// Delete a record; deleting a record that is already gone succeeds
    async fn delete(
        &self,
        credential: &Credential,
        collection: &str,
        external_id: &ExternalId,
    ) -> Result<(), RemoteError>;

    /// Invoke a named remote computation
    async fn invoke(
        &self,
        credential: &Credential,
        action: &str,
        payload: &Fields,
    ) -> Result<Value, RemoteError>;
}
