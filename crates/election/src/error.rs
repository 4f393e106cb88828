//! Error types for leader election.

use thiserror::Error;

/// Errors returned by a [`ResourceLock`](crate::lock::ResourceLock) backend.
///
/// None of these are fatal to the election loop. The engine treats every
/// variant as a failed attempt and retries after the retry period.
#[derive(Error, Debug)]
pub enum LockError {
    /// Kubernetes API error that does not map onto a more specific variant
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// No lock record exists yet
    #[error("lock record not found")]
    NotFound,

    /// A create raced with another writer that created the record first
    #[error("lock record already exists")]
    AlreadyExists,

    /// An update carried a stale version token
    #[error("lock record was modified concurrently (stale version {version})")]
    Conflict { version: String },

    /// The stored object could not be interpreted as a lock record
    #[error("invalid lock record: {0}")]
    Invalid(String),
}

impl LockError {
    /// Returns `true` when another writer won the race for the record.
    #[must_use]
    pub fn is_race(&self) -> bool {
        matches!(self, Self::AlreadyExists | Self::Conflict { .. })
    }
}

/// Fatal errors reported to the caller before the election loop starts.
#[derive(Error, Debug)]
pub enum ElectionError {
    /// Invalid leader election configuration
    #[error("invalid leader election configuration: {0}")]
    Config(String),

    /// The resource lock could not be built
    #[error("create leader election lock: {0}")]
    LockConstruction(String),
}

/// Result type for election setup
pub type Result<T> = std::result::Result<T, ElectionError>;
