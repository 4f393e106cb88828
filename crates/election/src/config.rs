//! Leader election configuration.

use std::time::Duration;

use crate::error::{ElectionError, Result};

/// Default time a lease stays valid without renewal
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);

/// Default time a leader has to renew before giving up leadership
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Default interval between acquisition and renewal attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Default lock type
pub const DEFAULT_RESOURCE_LOCK: &str = "leases";

/// Default lock object name
pub const DEFAULT_RESOURCE_NAME: &str = "kle";

/// Default lock object namespace
pub const DEFAULT_RESOURCE_NAMESPACE: &str = "demo";

/// Configuration for a single leader election.
///
/// Durations are validated together by [`ElectionConfig::validate`]; nothing
/// is checked when fields are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// How long a lease is valid without renewal. Non-leaders wait at least
    /// this long after the last observed renewal before taking over.
    pub lease_duration: Duration,

    /// How long the acting leader keeps retrying renewal before it demotes itself.
    pub renew_deadline: Duration,

    /// Interval between acquisition or renewal attempts.
    pub retry_period: Duration,

    /// Lock type name, e.g. `leases`.
    pub resource_lock: String,

    /// Name of the lock object.
    pub resource_name: String,

    /// Namespace of the lock object.
    pub resource_namespace: String,

    /// Clear the holder when the election is cancelled while leading.
    pub release_on_cancel: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            resource_lock: DEFAULT_RESOURCE_LOCK.to_string(),
            resource_name: DEFAULT_RESOURCE_NAME.to_string(),
            resource_namespace: DEFAULT_RESOURCE_NAMESPACE.to_string(),
            release_on_cancel: true,
        }
    }
}

impl ElectionConfig {
    /// Set the lease duration (default: 15 seconds)
    #[must_use]
    pub fn with_lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    /// Set the renew deadline (default: 10 seconds)
    #[must_use]
    pub fn with_renew_deadline(mut self, deadline: Duration) -> Self {
        self.renew_deadline = deadline;
        self
    }

    /// Set the retry period (default: 2 seconds)
    #[must_use]
    pub fn with_retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    /// Set the lock object namespace and name
    #[must_use]
    pub fn with_resource(mut self, namespace: &str, name: &str) -> Self {
        self.resource_namespace = namespace.to_string();
        self.resource_name = name.to_string();
        self
    }

    /// Set the lock type name
    #[must_use]
    pub fn with_resource_lock(mut self, kind: &str) -> Self {
        self.resource_lock = kind.to_string();
        self
    }

    /// Set whether the lease is released on cancellation (default: true)
    #[must_use]
    pub fn with_release_on_cancel(mut self, release: bool) -> Self {
        self.release_on_cancel = release;
        self
    }

    /// Lease duration as stored in the lock record, in whole seconds.
    #[must_use]
    pub fn lease_duration_seconds(&self) -> i32 {
        i32::try_from(self.lease_duration.as_secs()).unwrap_or(i32::MAX)
    }

    /// Check the full configuration, including the lock identity.
    pub fn validate(&self) -> Result<()> {
        if self.resource_namespace.is_empty() {
            return Err(ElectionError::Config(
                "namespace may not be empty".to_string(),
            ));
        }
        if self.resource_name.is_empty() {
            return Err(ElectionError::Config("name may not be empty".to_string()));
        }
        self.validate_timing()
    }

    /// Check only the duration ordering.
    pub fn validate_timing(&self) -> Result<()> {
        if self.retry_period.is_zero() {
            return Err(ElectionError::Config(
                "retryPeriod must be greater than zero".to_string(),
            ));
        }
        if self.renew_deadline.is_zero() {
            return Err(ElectionError::Config(
                "renewDeadline must be greater than zero".to_string(),
            ));
        }
        if self.lease_duration < Duration::from_secs(1) {
            return Err(ElectionError::Config(format!(
                "leaseDuration must be at least 1s, got {:?}",
                self.lease_duration
            )));
        }
        // other candidates only see the whole seconds written to the record
        let stored_lease =
            Duration::from_secs(u64::from(self.lease_duration_seconds().unsigned_abs()));
        if stored_lease <= self.renew_deadline {
            return Err(ElectionError::Config(format!(
                "leaseDuration ({:?}, stored as {}s) must be greater than renewDeadline ({:?})",
                self.lease_duration,
                stored_lease.as_secs(),
                self.renew_deadline
            )));
        }
        if self.renew_deadline <= self.retry_period {
            return Err(ElectionError::Config(format!(
                "renewDeadline ({:?}) must be greater than retryPeriod ({:?})",
                self.renew_deadline, self.retry_period
            )));
        }
        Ok(())
    }
}
