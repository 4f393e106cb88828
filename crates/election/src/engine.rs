//! # Election Engine
//!
//! Single coordination loop that acquires the lock, renews it while leading,
//! demotes itself when renewal misses the deadline, and reports three events:
//! [`LeaderEvent::StartedLeading`], [`LeaderEvent::StoppedLeading`] and
//! [`LeaderEvent::NewLeader`]. Firing those events is the engine's only side
//! effect besides store writes; what runs while leading is up to the receiver.
//!
//! ## Timing
//!
//! Expiry of somebody else's lease is judged from the stored `renewTime` plus
//! `leaseDurationSeconds` against the local wall clock. The renew deadline of
//! our own term is measured with the local monotonic clock from the start of
//! the last successful renewal. Neither assumes synchronized clocks beyond a
//! drift well below `leaseDuration - renewDeadline`. Deployments that need a
//! stronger guarantee should pair this with a store-side lease TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ElectionConfig;
use crate::error::{LockError, Result};
use crate::lock::{LockRecord, ResourceLock};

/// Lifecycle notifications emitted by the engine, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderEvent {
    /// This process became leader; a new term begins.
    StartedLeading,
    /// This process is no longer leader; the current term is over.
    StoppedLeading,
    /// A different holder was observed. Empty when the lease was released.
    NewLeader { identity: String },
}

/// Coarse state of the coordination loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElectionPhase {
    #[default]
    Unknown,
    Acquiring,
    Leading,
    /// Renewal attempt in flight while leading
    Renewing,
    Releasing,
    NotLeading,
}

/// In-memory election state, owned and mutated only by the engine loop.
#[derive(Debug, Clone, Default)]
pub struct ElectionState {
    /// Last record read from or written to the store
    pub observed_record: Option<LockRecord>,
    /// Local time at which `observed_record` last changed
    pub observed_time: Option<Instant>,
    /// Start of the last successful acquisition or renewal
    pub renewed_at: Option<Instant>,
    pub is_leader: bool,
    pub phase: ElectionPhase,
    reported_leader: String,
}

enum Attempt {
    Acquired,
    HeldByOther(String),
    Failed,
}

enum TermEnd {
    Lost,
    Cancelled,
}

/// Drives one identity's participation in one election.
pub struct LeaderElector {
    lock: Arc<dyn ResourceLock>,
    lease_duration_seconds: i32,
    renew_deadline: Duration,
    retry_period: Duration,
    release_on_cancel: bool,
    events: mpsc::UnboundedSender<LeaderEvent>,
    state: ElectionState,
}

impl LeaderElector {
    /// Create an elector. Only the timing part of `config` is used; the lock
    /// already names the resource.
    pub fn new(
        lock: Arc<dyn ResourceLock>,
        config: &ElectionConfig,
        events: mpsc::UnboundedSender<LeaderEvent>,
    ) -> Result<Self> {
        config.validate_timing()?;
        Ok(Self {
            lock,
            lease_duration_seconds: config.lease_duration_seconds(),
            renew_deadline: config.renew_deadline,
            retry_period: config.retry_period,
            release_on_cancel: config.release_on_cancel,
            events,
            state: ElectionState::default(),
        })
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        self.lock.identity()
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.state.is_leader
    }

    /// Holder of the last observed record, if it has one.
    #[must_use]
    pub fn leader(&self) -> Option<&str> {
        self.state
            .observed_record
            .as_ref()
            .map(|record| record.holder_identity.as_str())
            .filter(|holder| !holder.is_empty())
    }

    #[must_use]
    pub fn phase(&self) -> ElectionPhase {
        self.state.phase
    }

    #[must_use]
    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    /// Run until `cancel` fires.
    ///
    /// Leadership lost through a missed renewal loops back to acquisition;
    /// only cancellation ends the loop.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        loop {
            if !self.acquire(cancel).await {
                break;
            }

            self.start_term();
            let end = self.renew(cancel).await;
            self.end_term();

            if let TermEnd::Cancelled = end {
                if self.release_on_cancel {
                    self.release().await;
                }
                break;
            }
        }
        self.state.phase = ElectionPhase::NotLeading;
        debug!(lock = %self.lock.describe(), "Leader election loop exited");
    }

    /// Retry acquisition every retry period. Returns `false` on cancellation.
    async fn acquire(&mut self, cancel: &CancellationToken) -> bool {
        self.state.phase = ElectionPhase::Acquiring;
        info!(
            lock = %self.lock.describe(),
            identity = %self.lock.identity(),
            "Attempting to acquire leader lease"
        );

        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let attempt = self.try_acquire_or_renew().await;
            self.maybe_report_transition();
            if cancel.is_cancelled() {
                // won the lease after cancellation: no term, hand it back
                if matches!(attempt, Attempt::Acquired) && self.release_on_cancel {
                    self.release().await;
                }
                return false;
            }
            match attempt {
                Attempt::Acquired => {
                    info!(lock = %self.lock.describe(), "Successfully acquired lease");
                    return true;
                }
                Attempt::HeldByOther(holder) => {
                    debug!(
                        lock = %self.lock.describe(),
                        holder = %holder,
                        "Lease is held by another process and has not yet expired"
                    );
                }
                Attempt::Failed => {
                    debug!(lock = %self.lock.describe(), "Failed to acquire lease");
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(self.retry_period) => {}
            }
        }
    }

    /// Renew every retry period until the renew deadline passes without a
    /// successful renewal, another holder is observed, or `cancel` fires.
    async fn renew(&mut self, cancel: &CancellationToken) -> TermEnd {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return TermEnd::Cancelled,
                () = tokio::time::sleep(self.retry_period) => {}
            }

            let now = Instant::now();
            let deadline = self
                .state
                .renewed_at
                .map_or(now, |renewed| renewed + self.renew_deadline);
            if now >= deadline {
                warn!(
                    lock = %self.lock.describe(),
                    "Failed to renew lease within the renew deadline"
                );
                return TermEnd::Lost;
            }

            self.state.phase = ElectionPhase::Renewing;
            let attempt =
                match tokio::time::timeout(deadline - now, self.try_acquire_or_renew()).await {
                    Ok(attempt) => attempt,
                    Err(_) => {
                        warn!(
                            lock = %self.lock.describe(),
                            "Lease renewal did not complete before the renew deadline"
                        );
                        return TermEnd::Lost;
                    }
                };
            self.maybe_report_transition();
            self.state.phase = ElectionPhase::Leading;

            match attempt {
                Attempt::Acquired => {
                    debug!(lock = %self.lock.describe(), "Successfully renewed lease");
                }
                Attempt::HeldByOther(holder) => {
                    warn!(
                        lock = %self.lock.describe(),
                        holder = %holder,
                        "Lease was taken over by another process"
                    );
                    return TermEnd::Lost;
                }
                Attempt::Failed => {
                    debug!(lock = %self.lock.describe(), "Failed to renew lease, retrying");
                }
            }
        }
    }

    /// One read followed by at most one write.
    async fn try_acquire_or_renew(&mut self) -> Attempt {
        let started = Instant::now();
        let now = Utc::now();
        let identity = self.lock.identity().to_string();

        let (old, version) = match self.lock.get().await {
            Ok(found) => found,
            Err(LockError::NotFound) => {
                let record = LockRecord::acquired(&identity, self.lease_duration_seconds, now);
                return match self.lock.create(&record).await {
                    Ok(()) => {
                        self.observe(record);
                        self.state.renewed_at = Some(started);
                        Attempt::Acquired
                    }
                    Err(e) if e.is_race() => {
                        debug!(lock = %self.lock.describe(), "Lost race creating lease");
                        Attempt::Failed
                    }
                    Err(e) => {
                        error!(
                            lock = %self.lock.describe(),
                            error = %e,
                            "Error initially creating leader election record"
                        );
                        Attempt::Failed
                    }
                };
            }
            Err(e) => {
                error!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Error retrieving resource lock"
                );
                return Attempt::Failed;
            }
        };

        self.observe(old.clone());
        self.maybe_report_transition();
        if !old.is_released() && old.holder_identity != identity && !old.is_expired(now) {
            return Attempt::HeldByOther(old.holder_identity);
        }

        let mut record = LockRecord::acquired(&identity, self.lease_duration_seconds, now);
        if old.holder_identity == identity {
            record.leader_transitions = old.leader_transitions;
            if self.state.is_leader {
                record.acquire_time = old.acquire_time;
            }
        } else {
            record.leader_transitions = old.leader_transitions.saturating_add(1);
        }

        match self.lock.update(&record, &version).await {
            Ok(()) => {
                self.observe(record);
                self.state.renewed_at = Some(started);
                Attempt::Acquired
            }
            Err(e) if e.is_race() => {
                debug!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Lost race updating lease"
                );
                Attempt::Failed
            }
            Err(e) => {
                warn!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Failed to update lease"
                );
                Attempt::Failed
            }
        }
    }

    /// Best-effort release after cancellation. Failures are logged only; the
    /// lease expires on its own.
    async fn release(&mut self) {
        self.state.phase = ElectionPhase::Releasing;

        let (current, version) = match self.lock.get().await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Failed to read lease for release, it will expire naturally"
                );
                return;
            }
        };
        if current.holder_identity != self.lock.identity() {
            debug!(
                lock = %self.lock.describe(),
                holder = %current.holder_identity,
                "Lease is no longer ours, skipping release"
            );
            return;
        }

        let released = current.released();
        match self.lock.update(&released, &version).await {
            Ok(()) => {
                self.observe(released);
                info!(lock = %self.lock.describe(), "Successfully released lease");
            }
            Err(e) => {
                warn!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Failed to release lease, it will expire naturally"
                );
            }
        }
    }

    fn start_term(&mut self) {
        self.state.is_leader = true;
        self.state.phase = ElectionPhase::Leading;
        self.emit(LeaderEvent::StartedLeading);
    }

    fn end_term(&mut self) {
        self.state.is_leader = false;
        self.state.phase = ElectionPhase::NotLeading;
        info!(lock = %self.lock.describe(), "Leadership term ended");
        self.emit(LeaderEvent::StoppedLeading);
    }

    fn observe(&mut self, record: LockRecord) {
        if self.state.observed_record.as_ref() != Some(&record) {
            self.state.observed_record = Some(record);
            self.state.observed_time = Some(Instant::now());
        }
    }

    fn maybe_report_transition(&mut self) {
        let Some(holder) = self
            .state
            .observed_record
            .as_ref()
            .map(|record| record.holder_identity.clone())
        else {
            return;
        };
        if holder == self.state.reported_leader {
            return;
        }
        self.state.reported_leader.clone_from(&holder);
        if holder != self.lock.identity() {
            self.emit(LeaderEvent::NewLeader { identity: holder });
        }
    }

    fn emit(&self, event: LeaderEvent) {
        if self.events.send(event).is_err() {
            debug!(lock = %self.lock.describe(), "Leader event receiver dropped");
        }
    }
}
