use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Snapshot, SnapshotInput, SnapshotStore, StoreError};

/// Flat-file backend: one JSON document holding every user's snapshots.
///
/// The file layout is `{"users": {"<sub>": {"snapshots": [...]}}}`. Each
/// operation is a full read-modify-write cycle, so all of them run under a
/// single mutex; without it two racing upserts could each read the old
/// document and the second write would drop the first one's record.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileState {
    #[serde(default)]
    users: BTreeMap<String, UserData>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserData {
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<FileState, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileState::default()),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        // A corrupt data file is surfaced, not silently reset: resetting
        // here would destroy every user's records on the next write.
        serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Unavailable(format!("data file {} is corrupt: {}", self.path.display(), e))
        })
    }

    async fn persist(&self, state: &FileState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| *d != Path::new("")) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        let raw = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::Internal(format!("serialize data file: {}", e)))?;
        tokio::fs::write(&self.path, raw).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot write {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn list(&self, sub: &str) -> Result<Vec<Snapshot>, StoreError> {
        let _guard = self.lock.lock().await;
        let state = self.load().await?;
        let mut snapshots = state
            .users
            .get(sub)
            .map(|user| user.snapshots.clone())
            .unwrap_or_default();
        // ISO dates sort correctly as strings
        snapshots.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(snapshots)
    }

    async fn upsert(&self, sub: &str, snapshot: &Value) -> Result<(), StoreError> {
        let input = SnapshotInput::parse(snapshot)?;
        let now = Utc::now();

        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let user = state.users.entry(sub.to_string()).or_default();

        match user.snapshots.iter_mut().find(|s| s.date == input.date) {
            Some(existing) => {
                existing.net_worth = input.net_worth;
                existing.fields = input.fields;
                existing.updated_at = now;
            }
            None => user.snapshots.push(Snapshot {
                date: input.date,
                net_worth: input.net_worth,
                created_at: now,
                updated_at: now,
                fields: input.fields,
            }),
        }

        self.persist(&state).await
    }

    async fn delete(&self, sub: &str, date: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;

        let Some(user) = state.users.get_mut(sub) else {
            return Ok(());
        };

        let before = user.snapshots.len();
        user.snapshots.retain(|s| s.date != date);
        if user.snapshots.len() == before {
            return Ok(());
        }

        self.persist(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("data.json"))
    }

    #[tokio::test]
    async fn test_list_empty_for_unknown_subject() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.list("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_ascending_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        for date in ["2024-03-01", "2024-01-01", "2024-02-01"] {
            store
                .upsert("alice", &json!({"date": date, "netWorth": 1.0}))
                .await
                .unwrap();
        }
        let dates: Vec<_> = store
            .list("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.date)
            .collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-02-01", "2024-03-01"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_preserves_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 100, "cash": 10}))
            .await
            .unwrap();
        let first = store.list("alice").await.unwrap().remove(0);

        store
            .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 250}))
            .await
            .unwrap();
        let snapshots = store.list("alice").await.unwrap();
        assert_eq!(snapshots.len(), 1);

        let second = &snapshots[0];
        assert_eq!(second.net_worth, 250.0);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= second.created_at);
        // Replaced wholesale, not merged
        assert!(second.fields.get("cash").is_none());
    }

    #[tokio::test]
    async fn test_subjects_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 100}))
            .await
            .unwrap();
        store
            .upsert("bob", &json!({"date": "2024-02-01", "netWorth": 200}))
            .await
            .unwrap();

        let alice = store.list("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].date, "2024-01-01");

        store.delete("bob", "2024-02-01").await.unwrap();
        assert_eq!(store.list("alice").await.unwrap().len(), 1);
        assert!(store.list("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 100}))
            .await
            .unwrap();

        store.delete("alice", "2024-01-01").await.unwrap();
        assert!(store.list("alice").await.unwrap().is_empty());
        // Second delete of the same key and a delete for an unknown subject
        // are both no-op successes
        store.delete("alice", "2024-01-01").await.unwrap();
        store.delete("carol", "2024-01-01").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_payload_leaves_storage_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 100}))
            .await
            .unwrap();

        let err = store
            .upsert("alice", &json!({"date": "2024-01-01", "netWorth": "abc"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let snapshots = store.list("alice").await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].net_worth, 100.0);
    }

    #[tokio::test]
    async fn test_corrupt_file_reported_not_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        let err = store.list("alice").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        // The broken file is still there for the operator to inspect
        let raw = tokio::fs::read(&path).await.unwrap();
        assert_eq!(raw, b"{not json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_key_upserts_never_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 100}))
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert("alice", &json!({"date": "2024-01-01", "netWorth": 200}))
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let snapshots = store.list("alice").await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].net_worth == 100.0 || snapshots[0].net_worth == 200.0);
    }
}
