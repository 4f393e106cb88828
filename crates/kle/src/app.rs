//! Wiring for the `kle` server: health server, backend selection and the workload.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use election::{run_election, LockBackend, MemoryStore};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Cli, LeaderElectionArgs};
use crate::client;
use crate::server::{self, Readiness};

/// Run kle until `cancel` fires.
///
/// The health server runs for the whole lifetime; the workload runs either
/// directly or only while this process holds the lease.
pub async fn run(cli: &Cli, readiness: Readiness, cancel: CancellationToken) -> Result<()> {
    let server = {
        let addr = cli.addr.clone();
        let readiness = readiness.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(&addr, readiness, cancel).await {
                error!("http server, err: {e:#}");
            }
        })
    };

    let workload = move |term: CancellationToken| tick(term, readiness.clone());

    let result = run_workload(cli, workload, cancel.clone()).await;

    // the workload is done, take the health server down with it
    cancel.cancel();
    if let Err(e) = server.await {
        error!("http server task failed: {e}");
    }
    result
}

/// Pick the lock backend and run the workload against it.
async fn run_workload<W, Fut>(cli: &Cli, workload: W, cancel: CancellationToken) -> Result<()>
where
    W: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    if cli.dry_run {
        warn!("dry run mode");
        return elect_or_run(workload, &MemoryStore::new(), &cli.leader_election, cancel).await;
    }
    let client = client::kube_client(cli.kubeconfig.as_deref()).await?;
    elect_or_run(workload, &client, &cli.leader_election, cancel).await
}

async fn elect_or_run<B, W, Fut>(
    workload: W,
    backend: &B,
    args: &LeaderElectionArgs,
    cancel: CancellationToken,
) -> Result<()>
where
    B: LockBackend + ?Sized,
    W: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    if args.leader_elect {
        run_election(workload, backend, &args.to_config(), cancel)
            .await
            .context("create leader election")?;
    } else {
        workload(cancel).await;
    }
    Ok(())
}

/// Demo workload: logs once a second until `term` is cancelled.
pub async fn tick(term: CancellationToken, readiness: Readiness) {
    readiness.mark_ready();
    let period = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = term.cancelled() => return,
            _ = ticker.tick() => info!("tick..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tick_marks_ready_and_stops_on_cancel() {
        let readiness = Readiness::default();
        let term = CancellationToken::new();
        let handle = tokio::spawn(tick(term.clone(), readiness.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(readiness.is_ready());

        term.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
