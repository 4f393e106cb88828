//! Process-local lock store.
//!
//! Stands in for the cluster in dry-run mode and in tests. All operations take
//! one mutex, which makes the store linearizable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{LockRecord, ResourceLock, VersionToken};
use crate::error::LockError;
use crate::identity::Identity;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: LockRecord,
    version: u64,
}

/// Shared in-memory store of lock records keyed by `(namespace, name)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<(String, String), StoredRecord>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A lock handle on `namespace/name` writing as `identity`.
    #[must_use]
    pub fn lock(&self, namespace: &str, name: &str, identity: &Identity) -> MemoryLock {
        MemoryLock {
            store: self.clone(),
            key: (namespace.to_string(), name.to_string()),
            identity: identity.to_string(),
        }
    }

    /// Current record stored under `namespace/name`, if any.
    pub async fn record(&self, namespace: &str, name: &str) -> Option<LockRecord> {
        let records = self.records.lock().await;
        records
            .get(&(namespace.to_string(), name.to_string()))
            .map(|stored| stored.record.clone())
    }

    /// Overwrite a record unconditionally, bumping its version.
    pub async fn insert(&self, namespace: &str, name: &str, record: LockRecord) {
        let mut records = self.records.lock().await;
        let key = (namespace.to_string(), name.to_string());
        let version = records.get(&key).map_or(1, |stored| stored.version + 1);
        records.insert(key, StoredRecord { record, version });
    }
}

/// [`ResourceLock`] over a [`MemoryStore`] entry.
#[derive(Debug, Clone)]
pub struct MemoryLock {
    store: MemoryStore,
    key: (String, String),
    identity: String,
}

#[async_trait]
impl ResourceLock for MemoryLock {
    async fn get(&self) -> Result<(LockRecord, VersionToken), LockError> {
        let records = self.store.records.lock().await;
        records
            .get(&self.key)
            .map(|stored| {
                (
                    stored.record.clone(),
                    VersionToken::new(stored.version.to_string()),
                )
            })
            .ok_or(LockError::NotFound)
    }

    async fn create(&self, record: &LockRecord) -> Result<(), LockError> {
        let mut records = self.store.records.lock().await;
        if records.contains_key(&self.key) {
            return Err(LockError::AlreadyExists);
        }
        records.insert(
            self.key.clone(),
            StoredRecord {
                record: record.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn update(&self, record: &LockRecord, version: &VersionToken) -> Result<(), LockError> {
        let mut records = self.store.records.lock().await;
        let stored = records.get_mut(&self.key).ok_or(LockError::NotFound)?;
        if stored.version.to_string() != version.as_str() {
            return Err(LockError::Conflict {
                version: version.to_string(),
            });
        }
        stored.record = record.clone();
        stored.version += 1;
        Ok(())
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.key.0, self.key.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lock(store: &MemoryStore, id: &str) -> MemoryLock {
        store.lock("demo", "kle", &Identity::new(id))
    }

    #[tokio::test]
    async fn test_get_missing_record() {
        let store = MemoryStore::new();
        let err = lock(&store, "a").get().await.unwrap_err();
        assert!(matches!(err, LockError::NotFound));
    }

    #[tokio::test]
    async fn test_second_create_fails() {
        let store = MemoryStore::new();
        let a = lock(&store, "a");
        let b = lock(&store, "b");

        a.create(&LockRecord::acquired("a", 15, Utc::now()))
            .await
            .unwrap();
        let err = b
            .create(&LockRecord::acquired("b", 15, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::AlreadyExists));

        let stored = store.record("demo", "kle").await.unwrap();
        assert_eq!(stored.holder_identity, "a");
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let a = lock(&store, "a");
        let b = lock(&store, "b");
        a.create(&LockRecord::acquired("a", 15, Utc::now()))
            .await
            .unwrap();

        let (_, version_a) = a.get().await.unwrap();
        let (_, version_b) = b.get().await.unwrap();
        assert_eq!(version_a, version_b);

        a.update(&LockRecord::acquired("a", 15, Utc::now()), &version_a)
            .await
            .unwrap();
        let err = b
            .update(&LockRecord::acquired("b", 15, Utc::now()), &version_b)
            .await
            .unwrap_err();
        assert!(err.is_race());

        let (record, version) = b.get().await.unwrap();
        assert_eq!(record.holder_identity, "a");
        assert_ne!(version, version_b);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryStore::new();
        let identity = Identity::new("a");
        let first = store.lock("demo", "one", &identity);
        let second = store.lock("demo", "two", &identity);

        first
            .create(&LockRecord::acquired("a", 15, Utc::now()))
            .await
            .unwrap();
        assert!(matches!(second.get().await, Err(LockError::NotFound)));
    }
}
