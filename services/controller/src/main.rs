//! Lamp controller
//!
//! Loads lamp resources from a manifest and keeps every lamp's color in sync
//! with its declared color.
//!
//! ## Architecture
//!
//! - **Controller**: Work queue with periodic resync and failure backoff
//! - **Reconciler**: Reads the device color and corrects drift
//! - **Device Client**: Plain-text HTTP protocol to the lamp

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lamp_controller::config::Config;
use lamp_controller::{Controller, DeviceClient, HttpTransport, MemoryStore, Reconciler};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; the log level comes from it
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        manifest = %config.manifest_path.display(),
        workers = config.workers,
        resync_interval_secs = config.resync_interval.as_secs(),
        "Starting lamp controller"
    );

    let store = Arc::new(
        MemoryStore::from_manifest(&config.manifest_path).context("Failed to load lamps")?,
    );
    info!(lamps = store.len().await, "Lamp manifest loaded");

    let transport = HttpTransport::new(config.connect_timeout)
        .context("Failed to create device transport")?;
    let device = DeviceClient::new(Arc::new(transport));

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        device,
        config.reconciler_config(),
    ));
    let controller = Controller::new(reconciler, store, config.controller_config());

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut controller_handle = tokio::spawn(controller.run(shutdown_rx));

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
            return Ok(());
        }
    }

    // Signal shutdown and let in-flight reconciles finish
    let _ = shutdown_tx.send(true);
    if let Err(e) = controller_handle.await {
        error!(error = %e, "Controller task panicked");
    }

    info!("Lamp controller shutdown complete");
    Ok(())
}
