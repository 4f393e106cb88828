//! # Coordinator Runner
//!
//! Validates configuration, generates the process identity, builds the lock
//! and drives a [`LeaderElector`] to completion. While leading, the workload
//! runs as its own task under a child token of the caller's token; the token
//! is cancelled as soon as the term ends.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ElectionConfig;
use crate::engine::{LeaderElector, LeaderEvent};
use crate::error::Result;
use crate::identity::Identity;
use crate::lock::{self, LockBackend};

/// Run `workload` whenever this process holds the lease, until `cancel` fires.
///
/// Configuration and lock construction errors are returned before any store
/// call. Otherwise this only returns, with `Ok(())`, once `cancel` has fired
/// and the current term (if any) has been wound down. Losing leadership is not
/// an error: the election goes back to acquiring.
///
/// The workload receives a fresh token per term and must return promptly once
/// that token is cancelled; it is never aborted.
pub async fn run_election<B, W, Fut>(
    workload: W,
    backend: &B,
    config: &ElectionConfig,
    cancel: CancellationToken,
) -> Result<()>
where
    B: LockBackend + ?Sized,
    W: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let identity = Identity::generate();
    debug!(identity = %identity, "Assigned unique lease holder id");

    let lock = lock::new(
        &config.resource_lock,
        &config.resource_namespace,
        &config.resource_name,
        backend,
        &identity,
    )?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut elector = LeaderElector::new(lock, config, events_tx)?;

    let engine = {
        let cancel = cancel.clone();
        async move {
            elector.run(&cancel).await;
            // dropping the elector closes the event channel
        }
    };

    tokio::join!(engine, supervise(workload, events_rx, cancel));
    Ok(())
}

/// One leadership term's workload task.
struct Term {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Term {
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!("Leader workload panicked");
            }
        }
    }
}

/// Turn engine events into workload starts and stops.
async fn supervise<W, Fut>(
    workload: W,
    mut events: mpsc::UnboundedReceiver<LeaderEvent>,
    cancel: CancellationToken,
) where
    W: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut term: Option<Term> = None;

    while let Some(event) = events.recv().await {
        match event {
            LeaderEvent::StartedLeading => {
                info!("Started leading");
                if let Some(previous) = term.take() {
                    previous.stop().await;
                }
                let token = cancel.child_token();
                let handle = tokio::spawn(workload(token.clone()));
                term = Some(Term { token, handle });
            }
            LeaderEvent::StoppedLeading => {
                info!("Leader lost");
                if let Some(current) = term.take() {
                    current.stop().await;
                }
            }
            LeaderEvent::NewLeader { identity } if identity.is_empty() => {
                info!("Lease released by previous leader");
            }
            LeaderEvent::NewLeader { identity } => {
                info!(leader = %identity, "New leader elected");
            }
        }
    }

    if let Some(current) = term.take() {
        current.stop().await;
    }
}
