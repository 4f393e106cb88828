//! # Lock Resource Abstraction
//!
//! A named, versioned record in a shared store saying who holds the lease and
//! until when. Every write is a compare-and-swap: [`ResourceLock::create`]
//! fails if the record exists and [`ResourceLock::update`] fails if the version
//! token is stale, so at most one writer wins per version.
//!
//! Backends:
//!
//! - **`LeaseLock`**: Kubernetes `coordination.k8s.io/v1` Lease objects
//! - **`MemoryLock`**: process-local [`MemoryStore`], used for dry runs and tests

pub mod lease;
pub mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ElectionError, LockError};
use crate::identity::Identity;

pub use lease::LeaseLock;
pub use memory::{MemoryLock, MemoryStore};

/// Persisted leader election record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Current holder; empty when the lease has been released.
    pub holder_identity: String,
    pub lease_duration_seconds: i32,
    pub acquire_time: DateTime<Utc>,
    pub renew_time: DateTime<Utc>,
    pub leader_transitions: i32,
}

impl LockRecord {
    /// A fresh record claiming the lease for `holder` at `now`.
    #[must_use]
    pub fn acquired(holder: &str, lease_duration_seconds: i32, now: DateTime<Utc>) -> Self {
        Self {
            holder_identity: holder.to_string(),
            lease_duration_seconds,
            acquire_time: now,
            renew_time: now,
            leader_transitions: 0,
        }
    }

    /// Returns `true` if nobody holds the lease.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.holder_identity.is_empty()
    }

    /// Instant after which the lease may be claimed by another process.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.renew_time + ChronoDuration::seconds(i64::from(self.lease_duration_seconds))
    }

    /// Returns `true` if `renewTime + leaseDuration` is in the past.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() < now
    }

    /// The record written when the holder gives the lease up voluntarily.
    #[must_use]
    pub fn released(&self) -> Self {
        Self {
            holder_identity: String::new(),
            renew_time: DateTime::<Utc>::UNIX_EPOCH,
            ..self.clone()
        }
    }
}

/// Opaque store version of a record, used for compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Atomic access to one lock record.
///
/// Implementations add no buffering; each call is one store round trip.
#[async_trait]
pub trait ResourceLock: Send + Sync {
    /// Read the current record and its version.
    async fn get(&self) -> Result<(LockRecord, VersionToken), LockError>;

    /// Create the record. Fails with [`LockError::AlreadyExists`] if one exists.
    async fn create(&self, record: &LockRecord) -> Result<(), LockError>;

    /// Replace the record. Fails with [`LockError::Conflict`] if `version` is stale.
    async fn update(&self, record: &LockRecord, version: &VersionToken) -> Result<(), LockError>;

    /// Identity written into `holderIdentity` by this lock.
    fn identity(&self) -> &str;

    /// Human readable `namespace/name` of the lock.
    fn describe(&self) -> String;
}

/// Supported lock types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// `coordination.k8s.io/v1` Lease objects
    Leases,
}

impl FromStr for LockKind {
    type Err = ElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leases" => Ok(Self::Leases),
            "endpoints" | "configmaps" | "endpointsleases" | "configmapsleases" => {
                Err(ElectionError::LockConstruction(format!(
                    "{s} lock is no longer supported, migrate to leases"
                )))
            }
            other => Err(ElectionError::LockConstruction(format!(
                "invalid lock type: {other}"
            ))),
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leases => write!(f, "leases"),
        }
    }
}

/// Source of lock handles, i.e. the store client.
pub trait LockBackend {
    /// Build a lease lock for `namespace/name` owned by `identity`.
    fn lease_lock(&self, namespace: &str, name: &str, identity: &Identity) -> Arc<dyn ResourceLock>;
}

impl LockBackend for kube::Client {
    fn lease_lock(
        &self,
        namespace: &str,
        name: &str,
        identity: &Identity,
    ) -> Arc<dyn ResourceLock> {
        Arc::new(LeaseLock::new(self.clone(), namespace, name, identity))
    }
}

impl LockBackend for MemoryStore {
    fn lease_lock(
        &self,
        namespace: &str,
        name: &str,
        identity: &Identity,
    ) -> Arc<dyn ResourceLock> {
        Arc::new(self.lock(namespace, name, identity))
    }
}

/// Build a resource lock of the named type.
pub fn new<B: LockBackend + ?Sized>(
    kind: &str,
    namespace: &str,
    name: &str,
    backend: &B,
    identity: &Identity,
) -> Result<Arc<dyn ResourceLock>, ElectionError> {
    if namespace.is_empty() || name.is_empty() {
        return Err(ElectionError::LockConstruction(format!(
            "malformed lock identity {namespace:?}/{name:?}"
        )));
    }
    match kind.parse::<LockKind>()? {
        LockKind::Leases => Ok(backend.lease_lock(namespace, name, identity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_expiry_uses_renew_time() {
        let mut record = LockRecord::acquired("a", 15, ts(1_000));
        assert!(!record.is_expired(ts(1_010)));
        assert!(!record.is_expired(ts(1_015)));
        assert!(record.is_expired(ts(1_016)));

        record.renew_time = ts(1_010);
        assert!(!record.is_expired(ts(1_016)));
    }

    #[test]
    fn test_released_record() {
        let mut record = LockRecord::acquired("a", 15, ts(1_000));
        record.leader_transitions = 3;
        let released = record.released();
        assert!(released.is_released());
        assert_eq!(released.renew_time, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(released.leader_transitions, 3);
        assert_eq!(released.acquire_time, record.acquire_time);
        assert!(released.is_expired(Utc::now()));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = LockRecord::acquired("a", 15, ts(0));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["holderIdentity"], "a");
        assert_eq!(json["leaseDurationSeconds"], 15);
        assert_eq!(json["leaderTransitions"], 0);
    }

    #[test]
    fn test_lock_kind_parsing() {
        assert_eq!("leases".parse::<LockKind>().unwrap(), LockKind::Leases);

        let legacy = "endpoints".parse::<LockKind>().unwrap_err();
        assert!(legacy.to_string().contains("no longer supported"));

        let unknown = "zookeeper".parse::<LockKind>().unwrap_err();
        assert!(unknown.to_string().contains("invalid lock type"));
    }

    #[test]
    fn test_new_lock_binds_identity() {
        let store = MemoryStore::new();
        let identity = Identity::new("node-a");
        let lock = new("leases", "demo", "kle", &store, &identity).unwrap();
        assert_eq!(lock.identity(), "node-a");
        assert_eq!(lock.describe(), "demo/kle");
    }

    #[test]
    fn test_new_lock_rejects_bad_input() {
        let store = MemoryStore::new();
        let identity = Identity::new("node-a");
        assert!(matches!(
            new("configmaps", "demo", "kle", &store, &identity),
            Err(ElectionError::LockConstruction(_))
        ));
        assert!(matches!(
            new("leases", "", "kle", &store, &identity),
            Err(ElectionError::LockConstruction(_))
        ));
    }
}
