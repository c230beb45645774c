use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;

use dealflow_core::{
    EntityKind, ExternalId, Fields, LocalId, LocalRecord, LocalStore, RecordPatch, StoreError,
};

use crate::{backend_error, PostgresConnection};

const COLUMNS: &str = "kind, local_id, external_id, fields, created_at, updated_at";

/// Local store backed by PostgreSQL
#[derive(Clone)]
pub struct PostgresLocalStore {
    conn: PostgresConnection,
}

impl PostgresLocalStore {
    /// Create a store over an open connection
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

fn record_from_row(row: &PgRow) -> Result<LocalRecord, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::Serialization(format!("Error reading record: {}", e));

    let kind: String = row.try_get("kind").map_err(get_err)?;
    let local_id: String = row.try_get("local_id").map_err(get_err)?;
    let external_id: Option<String> = row.try_get("external_id").map_err(get_err)?;
    let Json(fields): Json<Fields> = row.try_get("fields").map_err(get_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(get_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(get_err)?;

    Ok(LocalRecord {
        kind: kind.parse()?,
        local_id: local_id.into(),
        external_id: external_id.map(ExternalId::from),
        fields,
        created_at,
        updated_at,
    })
}

/// Map a write error, turning unique violations into duplicates
fn write_error(kind: EntityKind, key: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(kind, key.to_string())
        }
        _ => backend_error("Write failed", err),
    }
}

#[async_trait]
impl LocalStore for PostgresLocalStore {
    async fn insert(&self, record: LocalRecord) -> Result<LocalRecord, StoreError> {
        let key = record
            .external_id
            .as_ref()
            .map(|id| format!("{} / {}", record.local_id, id))
            .unwrap_or_else(|| record.local_id.to_string());

        sqlx::query(
            "INSERT INTO synced_records (kind, local_id, external_id, fields, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.kind.as_str())
        .bind(record.local_id.as_str())
        .bind(record.external_id.as_ref().map(ExternalId::as_str))
        .bind(Json(&record.fields))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.conn.pool())
        .await
        .map_err(|e| write_error(record.kind, &key, e))?;

        debug!(kind = %record.kind, local_id = %record.local_id, "Inserted record");
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        patch: RecordPatch,
    ) -> Result<LocalRecord, StoreError> {
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(|e| backend_error("Failed to start transaction", e))?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM synced_records WHERE kind = $1 AND local_id = $2 FOR UPDATE",
            COLUMNS
        ))
        .bind(kind.as_str())
        .bind(local_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| backend_error("Failed to load record", e))?
        .ok_or_else(|| StoreError::NotFound(kind, local_id.clone()))?;

        let mut record = record_from_row(&row)?;
        record.apply(patch)?;

        sqlx::query(
            "UPDATE synced_records SET external_id = $3, fields = $4, updated_at = $5
             WHERE kind = $1 AND local_id = $2",
        )
        .bind(kind.as_str())
        .bind(local_id.as_str())
        .bind(record.external_id.as_ref().map(ExternalId::as_str))
        .bind(Json(&record.fields))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(kind, local_id.as_str(), e))?;

        tx.commit()
            .await
            .map_err(|e| backend_error("Failed to commit update", e))?;
        Ok(record)
    }

    async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM synced_records WHERE kind = $1 AND local_id = $2")
            .bind(kind.as_str())
            .bind(local_id.as_str())
            .execute(self.conn.pool())
            .await
            .map_err(|e| backend_error("Delete failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(kind, local_id.clone()));
        }
        debug!(%kind, %local_id, "Deleted record");
        Ok(())
    }

    async fn find_by_id(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<LocalRecord>, StoreError> {
        sqlx::query(&format!(
            "SELECT {} FROM synced_records WHERE kind = $1 AND local_id = $2",
            COLUMNS
        ))
        .bind(kind.as_str())
        .bind(local_id.as_str())
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| backend_error("Lookup failed", e))?
        .map(|row| record_from_row(&row))
        .transpose()
    }

    async fn find_by_external_id(
        &self,
        kind: EntityKind,
        external_id: &ExternalId,
    ) -> Result<Option<LocalRecord>, StoreError> {
        sqlx::query(&format!(
            "SELECT {} FROM synced_records WHERE kind = $1 AND external_id = $2",
            COLUMNS
        ))
        .bind(kind.as_str())
        .bind(external_id.as_str())
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| backend_error("Lookup failed", e))?
        .map(|row| record_from_row(&row))
        .transpose()
    }

    async fn find_where(
        &self,
        kind: EntityKind,
        criteria: &Fields,
    ) -> Result<Vec<LocalRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM synced_records WHERE kind = $1 AND fields @> $2
             ORDER BY created_at, local_id",
            COLUMNS
        ))
        .bind(kind.as_str())
        .bind(Json(criteria))
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| backend_error("Query failed", e))?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        // Containment also matches nested values; keep exact top-level equality
        Ok(records
            .into_iter()
            .filter(|record| record.matches(criteria))
            .collect())
    }
}
