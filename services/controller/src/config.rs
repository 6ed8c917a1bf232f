//! Configuration for the lamp controller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use lamp_reconcile::Backoff;

use crate::controller::ControllerConfig;
use crate::reconciler::ReconcilerConfig;

/// Lamp controller configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON manifest holding the lamp resources.
    pub manifest_path: PathBuf,

    /// Number of concurrent reconcile workers.
    pub workers: usize,

    /// Interval between full resyncs.
    pub resync_interval: Duration,

    /// Deadline for each device call.
    pub device_timeout: Duration,

    /// TCP connect timeout for device connections.
    pub connect_timeout: Duration,

    /// Upper bound for one reconcile attempt.
    pub reconcile_timeout: Duration,

    /// Delay after the first failed attempt.
    pub backoff_base: Duration,

    /// Upper bound for retry delays.
    pub backoff_max: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Read an optional integer env var.
fn env_u64(key: &str) -> Result<Option<u64>> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().parse::<u64>())
        .transpose()
        .with_context(|| format!("{key} must be a non-negative integer."))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let manifest_path = std::env::var("LAMP_MANIFEST")
            .map(PathBuf::from)
            .context("Missing lamp manifest. Set LAMP_MANIFEST to a JSON file of lamps.")?;

        let workers = env_u64("LAMP_WORKERS")?.unwrap_or(2).max(1) as usize;

        let resync_interval =
            Duration::from_secs(env_u64("LAMP_RESYNC_INTERVAL_SECS")?.unwrap_or(30).max(1));

        let device_timeout =
            Duration::from_millis(env_u64("LAMP_DEVICE_TIMEOUT_MS")?.unwrap_or(10_000).max(1));

        let connect_timeout =
            Duration::from_millis(env_u64("LAMP_CONNECT_TIMEOUT_MS")?.unwrap_or(5_000).max(1));

        let reconcile_timeout = Duration::from_millis(
            env_u64("LAMP_RECONCILE_TIMEOUT_MS")?
                .unwrap_or(30_000)
                .max(1),
        );

        let backoff_base = Duration::from_millis(env_u64("LAMP_BACKOFF_BASE_MS")?.unwrap_or(500));

        let backoff_max = Duration::from_secs(env_u64("LAMP_BACKOFF_MAX_SECS")?.unwrap_or(300));

        let log_level = std::env::var("LAMP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            manifest_path,
            workers,
            resync_interval,
            device_timeout,
            connect_timeout,
            reconcile_timeout,
            backoff_base,
            backoff_max,
            log_level,
        })
    }

    /// Reconciler settings derived from this configuration.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            device_timeout: self.device_timeout,
        }
    }

    /// Controller settings derived from this configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            resync_interval: self.resync_interval,
            reconcile_timeout: self.reconcile_timeout,
            backoff: Backoff::new(self.backoff_base, self.backoff_max.max(self.backoff_base)),
        }
    }
}
