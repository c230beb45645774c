use sqlx::{PgPool, Row};
use tracing::debug;

use dealflow_core::StoreError;

use crate::backend_error;

/// SQL migrations for the local store, in application order
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240601000000_synced_records",
            r#"
            CREATE TABLE IF NOT EXISTS synced_records (
                kind TEXT NOT NULL,
                local_id TEXT NOT NULL,
                external_id TEXT,
                fields JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (kind, local_id)
            );

            -- An external id maps to at most one local record per kind
            CREATE UNIQUE INDEX IF NOT EXISTS idx_synced_records_external_id
                ON synced_records(kind, external_id)
                WHERE external_id IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_synced_records_fields
                ON synced_records USING GIN (fields jsonb_path_ops);
            "#,
        ),
    ]
}

/// Apply the migrations missing from the `dealflow_migrations` ledger
pub async fn apply(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS dealflow_migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| backend_error("Failed to create migration ledger", e))?;

    let applied: Vec<String> = sqlx::query("SELECT name FROM dealflow_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| backend_error("Failed to read migration ledger", e))?
        .into_iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()
        .map_err(|e| backend_error("Failed to read migration ledger", e))?;

    for (name, sql) in generate_migrations() {
        if applied.iter().any(|done| done == name) {
            continue;
        }
        debug!(migration = name, "Applying migration");

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| backend_error("Failed to start migration", e))?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend_error(name, e))?;
        sqlx::query("INSERT INTO dealflow_migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend_error(name, e))?;
        tx.commit()
            .await
            .map_err(|e| backend_error("Failed to commit migration", e))?;
    }
    Ok(())
}
