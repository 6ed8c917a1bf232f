//! End-to-end tests against the lamp simulator.
//!
//! Runs the controller with the real HTTP transport against an in-process
//! simulator, the same pairing used for local development.

use std::sync::Arc;
use std::time::Duration;

use lamp_controller::{
    Controller, ControllerConfig, ControllerHandle, DeviceClient, HttpTransport, Lamp,
    MemoryStore, Reconciler, ReconcilerConfig,
};
use lamp_device_sim::SimState;
use lamp_id::ResourceId;
use lamp_reconcile::Backoff;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

struct Harness {
    sim: SimState,
    handle: ControllerHandle,
    shutdown: watch::Sender<bool>,
    controller: JoinHandle<()>,
    sim_stop: oneshot::Sender<()>,
    sim_task: JoinHandle<std::io::Result<()>>,
}

impl Harness {
    async fn start(initial_color: u32, desired: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sim = SimState::new(initial_color);

        let (sim_stop, stop_rx) = oneshot::channel::<()>();
        let sim_task = tokio::spawn(lamp_device_sim::serve(listener, sim.clone(), async move {
            let _ = stop_rx.await;
        }));

        let store = Arc::new(MemoryStore::new());
        store
            .insert(Lamp::new(&lamp_id(), addr.to_string(), desired))
            .await
            .unwrap();

        let transport = Arc::new(HttpTransport::new(Duration::from_secs(1)).unwrap());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            DeviceClient::new(transport),
            ReconcilerConfig {
                device_timeout: Duration::from_secs(2),
            },
        ));
        let controller = Controller::new(
            reconciler,
            store,
            ControllerConfig {
                workers: 2,
                resync_interval: Duration::from_secs(3600),
                reconcile_timeout: Duration::from_secs(5),
                backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(100)),
            },
        );
        let handle = controller.handle();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let controller = tokio::spawn(controller.run(shutdown_rx));

        Self {
            sim,
            handle,
            shutdown,
            controller,
            sim_stop,
            sim_task,
        }
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.controller.await.unwrap();

        let _ = self.sim_stop.send(());
        self.sim_task.await.unwrap().unwrap();
    }
}

fn lamp_id() -> ResourceId {
    ResourceId::new("default", "desk").unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_controller_converges_simulated_lamp() {
    let harness = Harness::start(0x000000, "00ff00").await;

    let handle = harness.handle.clone();
    eventually(|| handle.stats().corrected == 1).await;
    assert_eq!(harness.sim.color(), 0x00ff00);
    assert_eq!(harness.sim.update_count(), 1);

    // A converged lamp is only read.
    harness.handle.enqueue(lamp_id());
    eventually(|| handle.stats().no_action >= 1).await;
    assert_eq!(harness.sim.update_count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_out_of_band_change_is_reverted() {
    let harness = Harness::start(0x00ff00, "00ff00").await;

    let handle = harness.handle.clone();
    eventually(|| handle.stats().no_action >= 1).await;
    assert_eq!(harness.sim.update_count(), 0);

    harness.sim.set_color(0x123456);
    harness.handle.enqueue(lamp_id());

    eventually(|| handle.stats().corrected == 1).await;
    assert_eq!(harness.sim.color(), 0x00ff00);
    assert_eq!(harness.sim.update_count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_uppercase_color_drifts_on_every_pass() {
    // The simulator reports lowercase hex and comparison is exact.
    let harness = Harness::start(0x000000, "00FF00").await;

    let handle = harness.handle.clone();
    eventually(|| handle.stats().corrected >= 1).await;
    harness.handle.enqueue(lamp_id());
    eventually(|| handle.stats().corrected >= 2).await;

    assert_eq!(harness.sim.color(), 0x00ff00);
    assert!(harness.sim.update_count() >= 2);

    harness.stop().await;
}

#[tokio::test]
async fn test_rejected_color_keeps_failing() {
    let harness = Harness::start(0x000000, "red").await;

    let handle = harness.handle.clone();
    eventually(|| handle.stats().failed >= 2).await;
    assert!(harness.handle.failures(&lamp_id()) >= 2);
    assert_eq!(harness.sim.color(), 0x000000);
    assert_eq!(harness.sim.update_count(), 0);

    harness.stop().await;
}
