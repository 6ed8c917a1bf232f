//! Lamp controller library
//!
//! Keeps each lamp showing the color its resource declares. For every lamp
//! the controller reads the device's current color over HTTP and, when it
//! drifts from the declared color, sends one corrective update.
//!
//! ## Architecture
//!
//! ```text
//! Controller (work queue, workers, resync, backoff)
//! └── Reconciler          (one convergence attempt per call)
//!     ├── ResourceStore   (read-only desired state)
//!     └── DeviceClient    (status/update wire protocol)
//!         └── Transport   (HTTP via reqwest, or mock)
//! ```
//!
//! ## Modules
//!
//! - `client`: Device protocol client
//! - `controller`: Scheduling of reconcile attempts
//! - `reconciler`: The reconcile decision procedure
//! - `resource`: Lamp resource model
//! - `store`: Resource-read capability
//! - `transport`: Request/response transports

pub mod client;
pub mod config;
pub mod controller;
pub mod reconciler;
pub mod resource;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use client::{DeviceClient, DeviceError, Phase};
pub use controller::{Controller, ControllerConfig, ControllerHandle, ReconcileStats};
pub use reconciler::{Outcome, ReconcileError, Reconciler, ReconcilerConfig};
pub use resource::{Lamp, LampSpec, ObjectMeta};
pub use store::{MemoryStore, ResourceStore, StoreError};
pub use transport::{HttpTransport, MockTransport, Transport, TransportError};
