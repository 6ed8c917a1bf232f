//! Reconciler for converging one lamp to its desired color.
//!
//! One call to [`Reconciler::reconcile`] is one convergence attempt:
//! - Read the lamp resource (a missing resource needs no action)
//! - Read the device's current color
//! - If it differs from the desired color, write the desired color
//!
//! The attempt holds no state between calls and never retries; failures are
//! returned to the caller, which owns requeue and backoff.

use std::sync::Arc;
use std::time::Duration;

use lamp_id::ResourceId;
use lamp_reconcile::ReconcileOutcome;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client::{DeviceClient, DeviceError};
use crate::store::{ResourceStore, StoreError};

/// Reconcile failures, tagged with the phase that failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource could not be read.
    #[error("can't fetch lamp: {0}")]
    Store(#[source] StoreError),

    /// The device state could not be read.
    #[error("can't get lamp status ({phase}): {0}", phase = .0.phase())]
    DeviceRead(#[source] DeviceError),

    /// The corrected state could not be written.
    #[error("can't update lamp ({phase}): {0}", phase = .0.phase())]
    DeviceWrite(#[source] DeviceError),
}

/// Outcome of one reconcile attempt.
pub type Outcome = ReconcileOutcome<ReconcileError>;

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Deadline for each device call.
    pub device_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            device_timeout: Duration::from_secs(10),
        }
    }
}

/// Reconciler for lamp resources.
pub struct Reconciler {
    /// Resource store (read-only).
    store: Arc<dyn ResourceStore>,

    /// Device client.
    device: DeviceClient,

    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        device: DeviceClient,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            device,
            config,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.device_timeout
    }

    /// Perform a single reconcile attempt for `id`.
    #[instrument(skip(self, id), fields(resource = %id))]
    pub async fn reconcile(&self, id: &ResourceId) -> Outcome {
        debug!("Starting reconcile");

        let lamp = match self.store.get(id).await {
            Ok(lamp) => lamp,
            Err(e) if e.is_not_found() => {
                debug!("Lamp no longer exists, nothing to do");
                return Outcome::NoActionNeeded;
            }
            Err(e) => {
                warn!(error = %e, "Unable to fetch lamp");
                return Outcome::Failed(ReconcileError::Store(e));
            }
        };

        let host = lamp.host();
        let desired = lamp.desired_color();

        let current = match self.device.read_state(host, self.deadline()).await {
            Ok(color) => color,
            Err(e) => {
                warn!(host, error = %e, phase = %e.phase(), "Failed to read lamp status");
                return Outcome::Failed(ReconcileError::DeviceRead(e));
            }
        };

        debug!(host, current_color = %current, "Current lamp color");

        if current == desired {
            return Outcome::NoActionNeeded;
        }

        info!(
            host,
            current_color = %current,
            desired_color = %desired,
            "Updating lamp color"
        );

        match self.device.write_state(host, desired, self.deadline()).await {
            Ok(()) => Outcome::Corrected,
            Err(e) => {
                warn!(host, error = %e, phase = %e.phase(), "Failed to update lamp color");
                Outcome::Failed(ReconcileError::DeviceWrite(e))
            }
        }
    }
}
