use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tokio::sync::OnceCell;
use tracing::info;

use super::{Snapshot, SnapshotInput, SnapshotStore, StoreError};
use crate::config;

/// Postgres backend. One row per `(sub, date)`; extra client fields live in
/// a JSONB column so the row stays schemaless beyond the contract.
///
/// The pool is created lazily on the first call and reused for the process
/// lifetime. A failed initialization is not cached, so a later request
/// retries the connection.
pub struct PgSnapshotStore {
    pool: OnceCell<PgPool>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS snapshots (
    sub        TEXT NOT NULL,
    date       TEXT NOT NULL,
    net_worth  DOUBLE PRECISION NOT NULL,
    fields     JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (sub, date)
)";

impl PgSnapshotStore {
    pub fn new() -> Self {
        Self {
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool
            .get_or_try_init(|| async {
                let url = config::config()
                    .storage
                    .database_url
                    .as_deref()
                    .ok_or(StoreError::Config("DATABASE_URL"))?;

                let pool = PgPoolOptions::new()
                    .connect(url)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

                // Ensure the table exists once per cold start; the primary
                // key is what makes the upsert a real conditional write
                sqlx::query(SCHEMA)
                    .execute(&pool)
                    .await
                    .map_err(map_sqlx)?;

                info!("created snapshot database pool");
                Ok(pool)
            })
            .await
    }
}

impl Default for PgSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn list(&self, sub: &str) -> Result<Vec<Snapshot>, StoreError> {
        let pool = self.pool().await?;

        let rows = sqlx::query(
            "SELECT date, net_worth, fields, created_at, updated_at
             FROM snapshots WHERE sub = $1 ORDER BY date ASC",
        )
        .bind(sub)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(|row| {
                let fields: Value = row.try_get("fields").map_err(map_sqlx)?;
                Ok(Snapshot {
                    date: row.try_get("date").map_err(map_sqlx)?,
                    net_worth: row.try_get("net_worth").map_err(map_sqlx)?,
                    created_at: row
                        .try_get::<DateTime<Utc>, _>("created_at")
                        .map_err(map_sqlx)?,
                    updated_at: row
                        .try_get::<DateTime<Utc>, _>("updated_at")
                        .map_err(map_sqlx)?,
                    fields: fields.as_object().cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn upsert(&self, sub: &str, snapshot: &Value) -> Result<(), StoreError> {
        let input = SnapshotInput::parse(snapshot)?;
        let pool = self.pool().await?;
        let now = Utc::now();

        // Single conditional write; two racing upserts for the same key
        // serialize inside Postgres instead of merging
        sqlx::query(
            "INSERT INTO snapshots (sub, date, net_worth, fields, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             ON CONFLICT (sub, date) DO UPDATE
             SET net_worth = EXCLUDED.net_worth,
                 fields = EXCLUDED.fields,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(sub)
        .bind(&input.date)
        .bind(input.net_worth)
        .bind(Value::Object(input.fields))
        .bind(now)
        .execute(pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn delete(&self, sub: &str, date: &str) -> Result<(), StoreError> {
        let pool = self.pool().await?;

        sqlx::query("DELETE FROM snapshots WHERE sub = $1 AND date = $2")
            .bind(sub)
            .bind(date)
            .execute(pool)
            .await
            .map_err(map_sqlx)?;

        Ok(())
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    ) {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Internal(e.to_string())
    }
}
