//! Lamp device simulator.
//!
//! Serves the same plain-text protocol as the lamp firmware:
//! - `/` answers `OK` for any method
//! - `GET /status` answers the current color as six lowercase hex digits
//! - `POST /update` takes a form field `color` of exactly six hex digits
//!
//! Used for local runs of the controller and for end-to-end tests.

pub mod config;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::{any, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Largest color value (24-bit RGB).
pub const MAX_COLOR: u32 = 0x00ff_ffff;

const OK_BODY: &str = "OK\n";
const BAD_REQUEST_BODY: &str = "Bad request\n";

/// Shared simulator state.
#[derive(Debug, Clone, Default)]
pub struct SimState {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    color: AtomicU32,
    updates: AtomicU64,
}

impl SimState {
    /// Create a simulator showing `color`.
    pub fn new(color: u32) -> Self {
        let state = Self::default();
        state.set_color(color);
        state
    }

    /// Current color.
    pub fn color(&self) -> u32 {
        self.inner.color.load(Ordering::SeqCst)
    }

    /// Current color as the device reports it (without the newline).
    pub fn color_hex(&self) -> String {
        format!("{:06x}", self.color())
    }

    /// Change the color out of band, as if someone flipped it locally.
    pub fn set_color(&self, color: u32) {
        self.inner.color.store(color & MAX_COLOR, Ordering::SeqCst);
    }

    /// Number of accepted updates.
    pub fn update_count(&self) -> u64 {
        self.inner.updates.load(Ordering::SeqCst)
    }
}

/// Parse a color: exactly six hex digits.
///
/// Stricter than the firmware, whose `strtoul` also takes a sign, leading
/// whitespace or a `0x` prefix as long as the value is six characters long.
pub fn parse_color(value: &str) -> Option<u32> {
    if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(value, 16).ok()
}

/// Create the simulator router.
pub fn router(state: SimState) -> Router {
    Router::new()
        .route("/", any(index))
        .route("/status", get(status))
        .route("/update", post(update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the simulator on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: SimState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, color = %state.color_hex(), "Lamp simulator listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn index() -> &'static str {
    OK_BODY
}

async fn status(State(state): State<SimState>) -> String {
    debug!(color = %state.color_hex(), "Status requested");
    format!("{}\n", state.color_hex())
}

async fn update(
    State(state): State<SimState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> (StatusCode, &'static str) {
    let value = match &form {
        Ok(Form(fields)) => fields.get("color").map(String::as_str).unwrap_or_default(),
        Err(_) => "",
    };

    let Some(color) = parse_color(value) else {
        debug!(value, "Rejected color update");
        return (StatusCode::BAD_REQUEST, BAD_REQUEST_BODY);
    };

    state.set_color(color);
    state.inner.updates.fetch_add(1, Ordering::SeqCst);
    info!(color = %state.color_hex(), "Color updated");

    (StatusCode::OK, OK_BODY)
}
