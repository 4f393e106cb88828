//! Shared fixtures for election integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use election::lock::MemoryLock;
use election::{
    ElectionConfig, Identity, LeaderElector, LeaderEvent, LockBackend, LockError, LockRecord,
    MemoryStore, ResourceLock, VersionToken,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "demo";
pub const NAME: &str = "kle";

/// Short timings so a failover fits in a few seconds.
pub fn fast_config() -> ElectionConfig {
    ElectionConfig::default()
        .with_resource(NAMESPACE, NAME)
        .with_lease_duration(Duration::from_secs(2))
        .with_renew_deadline(Duration::from_millis(600))
        .with_retry_period(Duration::from_millis(50))
}

/// Injected store behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Every call fails immediately
    Fail,
    /// Every call blocks until the fault is cleared
    Hang,
}

/// Shared switch flipping a [`FlakyLock`] between healthy and faulty.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Arc<AtomicU8>);

impl FaultSwitch {
    pub fn set(&self, fault: Fault) {
        let raw = match fault {
            Fault::None => 0,
            Fault::Fail => 1,
            Fault::Hang => 2,
        };
        self.0.store(raw, Ordering::SeqCst);
    }

    pub fn get(&self) -> Fault {
        match self.0.load(Ordering::SeqCst) {
            1 => Fault::Fail,
            2 => Fault::Hang,
            _ => Fault::None,
        }
    }
}

/// Memory lock whose store calls can be made to fail or hang.
pub struct FlakyLock {
    inner: MemoryLock,
    switch: FaultSwitch,
    calls: Arc<AtomicUsize>,
}

impl FlakyLock {
    async fn gate(&self) -> Result<(), LockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.switch.get() {
            Fault::None => Ok(()),
            Fault::Fail => Err(LockError::Invalid("injected store failure".to_string())),
            Fault::Hang => {
                while self.switch.get() == Fault::Hang {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ResourceLock for FlakyLock {
    async fn get(&self) -> Result<(LockRecord, VersionToken), LockError> {
        self.gate().await?;
        self.inner.get().await
    }

    async fn create(&self, record: &LockRecord) -> Result<(), LockError> {
        self.gate().await?;
        self.inner.create(record).await
    }

    async fn update(&self, record: &LockRecord, version: &VersionToken) -> Result<(), LockError> {
        self.gate().await?;
        self.inner.update(record, version).await
    }

    fn identity(&self) -> &str {
        self.inner.identity()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// Backend handing out [`FlakyLock`]s over one memory store.
#[derive(Clone, Default)]
pub struct FlakyBackend {
    pub store: MemoryStore,
    pub switch: FaultSwitch,
    pub calls: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn lock(&self, id: &str) -> Arc<FlakyLock> {
        Arc::new(FlakyLock {
            inner: self.store.lock(NAMESPACE, NAME, &Identity::new(id)),
            switch: self.switch.clone(),
            calls: self.calls.clone(),
        })
    }

    pub fn store_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LockBackend for FlakyBackend {
    fn lease_lock(
        &self,
        namespace: &str,
        name: &str,
        identity: &Identity,
    ) -> Arc<dyn ResourceLock> {
        Arc::new(FlakyLock {
            inner: self.store.lock(namespace, name, identity),
            switch: self.switch.clone(),
            calls: self.calls.clone(),
        })
    }
}

/// Memory lock that cancels `token` as its first store read starts, so the
/// attempt in flight completes after cancellation.
pub struct CancellingLock {
    inner: MemoryLock,
    token: CancellationToken,
}

impl CancellingLock {
    pub fn new(store: &MemoryStore, id: &str, token: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            inner: store.lock(NAMESPACE, NAME, &Identity::new(id)),
            token: token.clone(),
        })
    }
}

#[async_trait]
impl ResourceLock for CancellingLock {
    async fn get(&self) -> Result<(LockRecord, VersionToken), LockError> {
        self.token.cancel();
        self.inner.get().await
    }

    async fn create(&self, record: &LockRecord) -> Result<(), LockError> {
        self.inner.create(record).await
    }

    async fn update(&self, record: &LockRecord, version: &VersionToken) -> Result<(), LockError> {
        self.inner.update(record, version).await
    }

    fn identity(&self) -> &str {
        self.inner.identity()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// Plain memory lock on the shared test resource.
pub fn memory_lock(store: &MemoryStore, id: &str) -> Arc<dyn ResourceLock> {
    Arc::new(store.lock(NAMESPACE, NAME, &Identity::new(id)))
}

/// Events from every elector in a test, stamped on arrival.
#[derive(Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<(Instant, String, LeaderEvent)>>>);

impl Timeline {
    pub fn events(&self) -> Vec<(Instant, String, LeaderEvent)> {
        self.0.lock().unwrap().clone()
    }

    /// Give forwarding tasks a chance to deliver already-sent events.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Events of one elector, in order.
    pub fn events_of(&self, id: &str) -> Vec<LeaderEvent> {
        self.events()
            .into_iter()
            .filter(|(_, who, _)| who == id)
            .map(|(_, _, event)| event)
            .collect()
    }

    pub fn count(&self, event: &LeaderEvent) -> usize {
        self.events().iter().filter(|(_, _, e)| e == event).count()
    }

    /// When `id` first emitted `event` after `since`, waiting up to `within`.
    pub async fn wait_for(
        &self,
        id: &str,
        event: &LeaderEvent,
        since: Instant,
        within: Duration,
    ) -> Option<Instant> {
        let give_up = Instant::now() + within;
        loop {
            let found = self
                .events()
                .into_iter()
                .find(|(at, who, e)| *at >= since && who == id && e == event)
                .map(|(at, _, _)| at);
            if found.is_some() {
                return found;
            }
            if Instant::now() >= give_up {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Spawn an elector on `lock`, recording its events into `timeline`.
pub fn spawn_elector(
    lock: Arc<dyn ResourceLock>,
    config: &ElectionConfig,
    timeline: &Timeline,
    cancel: &CancellationToken,
) -> JoinHandle<LeaderElector> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = lock.identity().to_string();
    let mut elector = LeaderElector::new(lock, config, tx).unwrap();

    let sink = timeline.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            sink.0.lock().unwrap().push((Instant::now(), id.clone(), event));
        }
    });

    let cancel = cancel.clone();
    tokio::spawn(async move {
        elector.run(&cancel).await;
        elector
    })
}

/// Check that starts and stops of one elector strictly alternate, beginning with a start.
pub fn assert_alternating(events: &[LeaderEvent]) {
    let mut leading = false;
    for event in events {
        match event {
            LeaderEvent::StartedLeading => {
                assert!(!leading, "two starts without a stop: {events:?}");
                leading = true;
            }
            LeaderEvent::StoppedLeading => {
                assert!(leading, "stop without a start: {events:?}");
                leading = false;
            }
            LeaderEvent::NewLeader { .. } => {}
        }
    }
}
