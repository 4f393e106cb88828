//! # Lease Lock
//!
//! [`ResourceLock`] backed by a Kubernetes `coordination.k8s.io/v1` Lease.
//! Updates use `replace` with `metadata.resourceVersion` set, so the API
//! server rejects a write made against a stale read with 409 Conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, PostParams};
use kube::core::ObjectMeta;
use kube::{Client, Error as KubeError};
use tracing::debug;

use super::{LockRecord, ResourceLock, VersionToken};
use crate::error::LockError;
use crate::identity::Identity;

const HTTP_CONFLICT: u16 = 409;

/// Leader election lock stored in a Lease object
#[derive(Clone)]
pub struct LeaseLock {
    api: Api<Lease>,
    namespace: String,
    name: String,
    identity: String,
}

impl LeaseLock {
    /// Create a lock on the Lease `namespace/name`
    #[must_use]
    pub fn new(client: Client, namespace: &str, name: &str, identity: &Identity) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            name: name.to_string(),
            identity: identity.to_string(),
        }
    }

    fn lease_object(&self, record: &LockRecord, version: Option<&VersionToken>) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version: version.map(|v| v.as_str().to_string()),
                ..Default::default()
            },
            spec: Some(record_to_spec(record)),
        }
    }
}

/// Convert a lock record into the Lease spec that stores it.
pub fn record_to_spec(record: &LockRecord) -> LeaseSpec {
    LeaseSpec {
        holder_identity: Some(record.holder_identity.clone()),
        lease_duration_seconds: Some(record.lease_duration_seconds),
        acquire_time: Some(MicroTime(record.acquire_time)),
        renew_time: Some(MicroTime(record.renew_time)),
        lease_transitions: Some(record.leader_transitions),
        ..Default::default()
    }
}

/// Read a lock record out of a Lease spec.
///
/// Missing fields read as their zero values, the same way a freshly created
/// empty Lease is interpreted by other leader election clients.
pub fn spec_to_record(spec: &LeaseSpec) -> LockRecord {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    LockRecord {
        holder_identity: spec.holder_identity.clone().unwrap_or_default(),
        lease_duration_seconds: spec.lease_duration_seconds.unwrap_or_default(),
        acquire_time: spec.acquire_time.as_ref().map_or(epoch, |t| t.0),
        renew_time: spec.renew_time.as_ref().map_or(epoch, |t| t.0),
        leader_transitions: spec.lease_transitions.unwrap_or_default(),
    }
}

fn is_conflict(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(response) if response.code == HTTP_CONFLICT)
}

#[async_trait]
impl ResourceLock for LeaseLock {
    async fn get(&self) -> Result<(LockRecord, VersionToken), LockError> {
        let lease = self.api.get_opt(&self.name).await?.ok_or(LockError::NotFound)?;
        let version = lease
            .metadata
            .resource_version
            .clone()
            .ok_or_else(|| LockError::Invalid("Lease has no resourceVersion".to_string()))?;
        let record = lease
            .spec
            .as_ref()
            .map_or_else(|| spec_to_record(&LeaseSpec::default()), spec_to_record);
        Ok((record, VersionToken::new(version)))
    }

    async fn create(&self, record: &LockRecord) -> Result<(), LockError> {
        let lease = self.lease_object(record, None);
        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(()),
            Err(e) if is_conflict(&e) => {
                debug!(lease = %self.describe(), "Lease was created concurrently");
                Err(LockError::AlreadyExists)
            }
            Err(e) => Err(LockError::Kube(e)),
        }
    }

    async fn update(&self, record: &LockRecord, version: &VersionToken) -> Result<(), LockError> {
        let lease = self.lease_object(record, Some(version));
        match self
            .api
            .replace(&self.name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_conflict(&e) => Err(LockError::Conflict {
                version: version.to_string(),
            }),
            Err(e) => Err(LockError::Kube(e)),
        }
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
