pub mod json_file;
pub mod postgres;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{self, StorageBackend};

/// One dated net-worth record. `fields` carries whatever extra numeric or
/// string breakdowns the client sent; the store persists them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: String,
    #[serde(rename = "netWorth")]
    pub net_worth: f64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Validated upsert payload. Construction via [`SnapshotInput::parse`] is the
/// only way to get one, so a parsed input is always safe to persist.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    pub date: String,
    pub net_worth: f64,
    pub fields: Map<String, Value>,
}

/// Fields the caller is never allowed to set directly.
const RESERVED_FIELDS: &[&str] = &["sub", "createdAt", "updatedAt", "_id"];

impl SnapshotInput {
    /// Validate a raw `snapshot` object: a non-empty `date` string and a
    /// numeric `netWorth` are required, everything else rides along opaquely.
    pub fn parse(value: &Value) -> Result<Self, StoreError> {
        let obj = value
            .as_object()
            .ok_or_else(StoreError::invalid_payload)?;

        let date = obj
            .get("date")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .ok_or_else(StoreError::invalid_payload)?
            .to_string();

        let net_worth = obj
            .get("netWorth")
            .and_then(Value::as_f64)
            .ok_or_else(StoreError::invalid_payload)?;

        let mut fields = obj.clone();
        fields.remove("date");
        fields.remove("netWorth");
        for key in RESERVED_FIELDS {
            fields.remove(*key);
        }

        Ok(Self {
            date,
            net_worth,
            fields,
        })
    }
}

/// Errors from snapshot storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing configuration: {0}")]
    Config(&'static str),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Internal(String),
}

impl StoreError {
    fn invalid_payload() -> Self {
        StoreError::Validation("Invalid snapshot payload".to_string())
    }
}

/// Per-subject snapshot collection with upsert-by-date semantics.
///
/// Every operation is scoped by the caller-supplied subject identifier; no
/// query can reach another subject's records.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// All snapshots owned by `sub`, ascending by date, `sub` and any
    /// backend-internal identifiers stripped.
    async fn list(&self, sub: &str) -> Result<Vec<Snapshot>, StoreError>;

    /// Insert-or-replace keyed by `(sub, date)`. The payload is validated
    /// before any persistence attempt. First write sets `createdAt`;
    /// subsequent writes replace everything except `date` and `createdAt`
    /// and bump `updatedAt`.
    async fn upsert(&self, sub: &str, snapshot: &Value) -> Result<(), StoreError>;

    /// Remove the record for `(sub, date)`. Succeeds when absent.
    async fn delete(&self, sub: &str, date: &str) -> Result<(), StoreError>;
}

/// Process-wide store handle, built from config on first use and reused for
/// the process lifetime.
pub fn store() -> &'static Arc<dyn SnapshotStore> {
    static STORE: OnceLock<Arc<dyn SnapshotStore>> = OnceLock::new();
    STORE.get_or_init(|| {
        let storage = &config::config().storage;
        match storage.backend {
            StorageBackend::Postgres => Arc::new(postgres::PgSnapshotStore::new()),
            StorageBackend::File => {
                Arc::new(json_file::JsonFileStore::new(storage.data_file.clone()))
            }
        }
    })
}
