//! Controller driving the reconciler.
//!
//! The controller decides *when* to reconcile:
//! - Triggers from [`ControllerHandle::enqueue`] and periodic resyncs feed a
//!   [`WorkQueue`], which keeps at most one reconcile per lamp in flight
//! - A pool of workers pops lamps and runs one attempt each
//! - Failed or timed-out attempts are requeued after exponential backoff;
//!   successful ones clear the lamp's failure count

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lamp_id::ResourceId;
use lamp_reconcile::{Backoff, RetryTracker, WorkQueue, DEFAULT_RESYNC_INTERVAL};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::reconciler::{Outcome, Reconciler};
use crate::store::ResourceStore;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent workers.
    pub workers: usize,

    /// Interval between full resyncs of every known lamp.
    pub resync_interval: Duration,

    /// Upper bound for one reconcile attempt.
    pub reconcile_timeout: Duration,

    /// Requeue backoff after failures.
    pub backoff: Backoff,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            reconcile_timeout: Duration::from_secs(30),
            backoff: Backoff::default(),
        }
    }
}

/// Counts of finished reconcile attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub no_action: u64,
    pub corrected: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl ReconcileStats {
    /// Total finished attempts.
    pub fn total(&self) -> u64 {
        self.no_action + self.corrected + self.failed + self.timed_out
    }
}

#[derive(Debug, Default)]
struct Counters {
    no_action: AtomicU64,
    corrected: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// State shared between the controller, its workers, and handles.
struct Shared {
    queue: Mutex<WorkQueue<ResourceId>>,
    retries: Mutex<RetryTracker<ResourceId>>,
    notify: Notify,
    counters: Counters,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn enqueue(&self, id: ResourceId) {
        locked(&self.queue).add(id);
        self.notify.notify_one();
    }

    fn stats(&self) -> ReconcileStats {
        ReconcileStats {
            no_action: self.counters.no_action.load(Ordering::Relaxed),
            corrected: self.counters.corrected.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle for triggering reconciles and reading stats.
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Arc<Shared>,
}

impl ControllerHandle {
    /// Signal "reconcile this lamp now".
    pub fn enqueue(&self, id: ResourceId) {
        self.shared.enqueue(id);
    }

    /// Snapshot of finished attempts.
    pub fn stats(&self) -> ReconcileStats {
        self.shared.stats()
    }

    /// Consecutive failures currently recorded for a lamp.
    pub fn failures(&self, id: &ResourceId) -> u32 {
        locked(&self.shared.retries).attempts(id)
    }
}

/// Lamp controller.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn ResourceStore>,
    config: ControllerConfig,
    shared: Arc<Shared>,
}

impl Controller {
    /// Create a new controller.
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn ResourceStore>,
        config: ControllerConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(WorkQueue::new()),
            retries: Mutex::new(RetryTracker::new(config.backoff)),
            notify: Notify::new(),
            counters: Counters::default(),
        });

        Self {
            reconciler,
            store,
            config,
            shared,
        }
    }

    /// Get a handle for triggering reconciles.
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run until shutdown is signaled.
    ///
    /// The first resync happens immediately. In-flight attempts finish
    /// before their worker exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let worker_count = self.config.workers.max(1);
        info!(
            workers = worker_count,
            resync_interval_secs = self.config.resync_interval.as_secs(),
            reconcile_timeout_ms = self.config.reconcile_timeout.as_millis() as u64,
            "Starting lamp controller"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                reconciler: Arc::clone(&self.reconciler),
                shared: Arc::clone(&self.shared),
                reconcile_timeout: self.config.reconcile_timeout,
            };
            workers.spawn(worker.run(shutdown.clone()));
        }

        let mut resync = tokio::time::interval(self.config.resync_interval);

        loop {
            tokio::select! {
                _ = resync.tick() => {
                    self.resync().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Lamp controller shutting down");
                        break;
                    }
                }
            }
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Lamp controller stopped");
    }

    /// Enqueue every known lamp.
    async fn resync(&self) {
        match self.store.list().await {
            Ok(ids) => {
                debug!(count = ids.len(), "Resyncing lamps");
                for id in ids {
                    self.shared.enqueue(id);
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list lamps for resync");
            }
        }
    }
}

/// One worker pulling lamps off the queue.
struct Worker {
    id: usize,
    reconciler: Arc<Reconciler>,
    shared: Arc<Shared>,
    reconcile_timeout: Duration,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = self.id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = {
                let mut queue = locked(&self.shared.queue);
                let next = queue.pop();
                if next.is_some() && !queue.is_empty() {
                    // More work left; wake another worker.
                    self.shared.notify.notify_one();
                }
                next
            };

            let Some(id) = next else {
                let closed = tokio::select! {
                    _ = self.shared.notify.notified() => false,
                    changed = shutdown.changed() => changed.is_err(),
                };
                if closed {
                    break;
                }
                continue;
            };

            self.process(&id, &shutdown).await;

            let requeued = {
                let mut queue = locked(&self.shared.queue);
                queue.done(&id);
                !queue.is_empty()
            };
            if requeued {
                self.shared.notify.notify_one();
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }

    #[instrument(skip(self, id, shutdown), fields(worker = self.id, resource = %id))]
    async fn process(&self, id: &ResourceId, shutdown: &watch::Receiver<bool>) {
        // Counters move last so a stats reader sees the retry state settled.
        let counters = &self.shared.counters;
        let attempt =
            tokio::time::timeout(self.reconcile_timeout, self.reconciler.reconcile(id)).await;

        match attempt {
            Ok(Outcome::NoActionNeeded) => {
                locked(&self.shared.retries).clear(id);
                counters.no_action.fetch_add(1, Ordering::Relaxed);
                debug!(outcome = "no_action", "Reconcile complete");
            }
            Ok(Outcome::Corrected) => {
                locked(&self.shared.retries).clear(id);
                counters.corrected.fetch_add(1, Ordering::Relaxed);
                info!(outcome = "corrected", "Reconcile complete");
            }
            Ok(Outcome::Failed(e)) => {
                let delay = locked(&self.shared.retries).record_failure(id.clone());
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    outcome = "failed",
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Reconcile failed, will retry"
                );
                self.requeue_after(id.clone(), delay, shutdown.clone());
            }
            Err(_) => {
                let delay = locked(&self.shared.retries).record_failure(id.clone());
                counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    outcome = "timed_out",
                    timeout_ms = self.reconcile_timeout.as_millis() as u64,
                    retry_in_ms = delay.as_millis() as u64,
                    "Reconcile aborted, will retry"
                );
                self.requeue_after(id.clone(), delay, shutdown.clone());
            }
        }
    }

    fn requeue_after(&self, id: ResourceId, delay: Duration, mut shutdown: watch::Receiver<bool>) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => shared.enqueue(id),
                _ = shutdown.changed() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::client::{DeviceClient, STATUS_PATH, UPDATE_PATH};
    use crate::reconciler::ReconcilerConfig;
    use crate::resource::Lamp;
    use crate::store::{MemoryStore, StoreError};
    use crate::transport::MockTransport;

    /// Store that can neither read nor list.
    #[derive(Default)]
    struct DownStore {
        lists: AtomicUsize,
    }

    #[async_trait]
    impl ResourceStore for DownStore {
        async fn get(&self, _id: &ResourceId) -> Result<Lamp, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn list(&self) -> Result<Vec<ResourceId>, StoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        }
    }

    fn lamp_id(name: &str) -> ResourceId {
        ResourceId::new("default", name).unwrap()
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            workers: 2,
            resync_interval: Duration::from_secs(3600),
            reconcile_timeout: Duration::from_secs(5),
            backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(50)),
        }
    }

    async fn wait_for(handle: &ControllerHandle, check: impl Fn(ReconcileStats) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !check(handle.stats()) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met, stats: {:?}",
                handle.stats()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn setup(lamps: &[(&str, &str)]) -> (Controller, Arc<MemoryStore>, Arc<MockTransport>) {
        let store = Arc::new(MemoryStore::new());
        for (name, host) in lamps {
            store
                .insert(Lamp::new(&lamp_id(name), *host, "red"))
                .await
                .unwrap();
        }

        let transport = Arc::new(MockTransport::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            DeviceClient::new(transport.clone()),
            ReconcilerConfig::default(),
        ));
        let controller = Controller::new(reconciler, store.clone(), test_config());
        (controller, store, transport)
    }

    #[test]
    fn test_controller_config_default() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.resync_interval, DEFAULT_RESYNC_INTERVAL);
    }

    #[tokio::test]
    async fn test_initial_resync_corrects_drift() {
        let (controller, _store, transport) = setup(&[("desk", "lamp.local")]).await;
        transport.respond(STATUS_PATH, 200, "blue");
        transport.respond(UPDATE_PATH, 200, "OK\n");

        let handle = controller.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(shutdown_rx));

        wait_for(&handle, |s| s.corrected == 1).await;
        assert_eq!(transport.count(UPDATE_PATH), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_reconcile_is_retried_until_success() {
        let (controller, _store, transport) = setup(&[("desk", "lamp.local")]).await;
        transport.respond(STATUS_PATH, 500, "");

        let handle = controller.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(shutdown_rx));

        wait_for(&handle, |s| s.failed >= 2).await;
        assert!(handle.failures(&lamp_id("desk")) >= 2);

        transport.respond(STATUS_PATH, 200, "red");
        wait_for(&handle, |s| s.no_action >= 1).await;
        assert_eq!(handle.failures(&lamp_id("desk")), 0);
        assert_eq!(transport.count(UPDATE_PATH), 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_lamps() {
        // An empty host fails at request construction on every attempt.
        let (controller, _store, transport) =
            setup(&[("broken", ""), ("desk", "lamp.local")]).await;
        transport.respond(STATUS_PATH, 200, "blue");
        transport.respond(UPDATE_PATH, 200, "OK\n");

        let handle = controller.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(shutdown_rx));

        wait_for(&handle, |s| s.corrected == 1 && s.failed >= 3).await;
        assert_eq!(handle.failures(&lamp_id("desk")), 0);
        assert!(handle.failures(&lamp_id("broken")) >= 3);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_deleted_lamp_completes_without_device_calls() {
        let (controller, store, transport) = setup(&[]).await;

        let handle = controller.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(shutdown_rx));

        handle.enqueue(lamp_id("gone"));
        wait_for(&handle, |s| s.no_action == 1).await;
        assert!(transport.requests().is_empty());
        assert!(store.is_empty().await);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_outage_is_retried_and_survives_resync() {
        let store = Arc::new(DownStore::default());
        let transport = Arc::new(MockTransport::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            DeviceClient::new(transport.clone()),
            ReconcilerConfig::default(),
        ));
        let config = ControllerConfig {
            resync_interval: Duration::from_millis(20),
            ..test_config()
        };
        let controller = Controller::new(reconciler, store.clone(), config);

        let handle = controller.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(shutdown_rx));

        handle.enqueue(lamp_id("desk"));
        wait_for(&handle, |s| s.failed >= 2).await;
        assert!(handle.failures(&lamp_id("desk")) >= 2);

        // Failed listings only skip a resync.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.lists.load(Ordering::SeqCst) < 3 {
            assert!(tokio::time::Instant::now() < deadline, "resync stopped");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(transport.requests().is_empty());
        assert_eq!(handle.stats().no_action + handle.stats().corrected, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
