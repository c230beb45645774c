use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;

use crate::domain::external::{ExternalSystem, RemoteRecord};
use crate::domain::repository::{LocalStore, RecordPatch};
use crate::error::{RemoteError, StoreError};
use crate::types::{Credential, EntityKind, ExternalId, Fields, LocalId, LocalRecord};

mock! {
    pub Store {}

    #[async_trait]
    impl LocalStore for Store {
        async fn insert(&self, record: LocalRecord) -> Result<LocalRecord, StoreError>;
        async fn update(
            &self,
            kind: EntityKind,
            local_id: &LocalId,
            patch: RecordPatch,
        ) -> Result<LocalRecord, StoreError>;
        async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), StoreError>;
        async fn find_by_id(
            &self,
            kind: EntityKind,
            local_id: &LocalId,
        ) -> Result<Option<LocalRecord>, StoreError>;
        async fn find_by_external_id(
            &self,
            kind: EntityKind,
            external_id: &ExternalId,
        ) -> Result<Option<LocalRecord>, StoreError>;
        async fn find_where(
            &self,
            kind: EntityKind,
            criteria: &Fields,
        ) -> Result<Vec<LocalRecord>, StoreError>;
    }
}

mock! {
    pub External {}

    #[async_trait]
    impl ExternalSystem for External {
        async fn create(
            &self,
            credential: &Credential,
            collection: &str,
            payload: &Fields,
        ) -> Result<RemoteRecord, RemoteError>;
        async fn update(
            &self,
            credential: &Credential,
            collection: &str,
            external_id: &ExternalId,
            payload: &Fields,
        ) -> Result<Fields, RemoteError>;
        async fn delete(
            &self,
            credential: &Credential,
            collection: &str,
            external_id: &ExternalId,
        ) -> Result<(), RemoteError>;
        async fn invoke(
            &self,
            credential: &Credential,
            action: &str,
            payload: &Fields,
        ) -> Result<Value, RemoteError>;
    }
}
