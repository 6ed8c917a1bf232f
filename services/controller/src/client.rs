//! Device client for lamps.
//!
//! Speaks the lamp's plain-text HTTP protocol:
//! - `GET http://<host>/status` returns the current color as text
//! - `POST http://<host>/update` with form body `color=<value>` sets it
//!
//! Each call is a single stateless round trip bounded by a caller-supplied
//! deadline. Nothing is retried here.

use std::fmt;
use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::transport::{DeviceRequest, DeviceResponse, Transport, TransportError};

/// Path of the state-read endpoint.
pub const STATUS_PATH: &str = "/status";

/// Path of the state-write endpoint.
pub const UPDATE_PATH: &str = "/update";

/// Content type of the state-write body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Form field carrying the color.
pub const COLOR_FIELD: &str = "color";

/// Phase of a device call in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestConstruction,
    Transport,
    StatusCode,
    BodyRead,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::RequestConstruction => write!(f, "request construction"),
            Phase::Transport => write!(f, "transport"),
            Phase::StatusCode => write!(f, "status code"),
            Phase::BodyRead => write!(f, "body read"),
        }
    }
}

/// Device call errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The request could not be built for this host.
    #[error("can't build request for host {host:?}: {reason}")]
    Request { host: String, reason: String },

    /// The transport failed.
    #[error("transport failed: {0}")]
    Transport(TransportError),

    /// The call did not finish before its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The device answered with a non-200 status.
    #[error("got {} code from device", .0.as_u16())]
    Status(StatusCode),

    /// The response body could not be read or decoded.
    #[error("can't read response body: {0}")]
    Body(String),
}

impl DeviceError {
    /// The phase this error belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            DeviceError::Request { .. } => Phase::RequestConstruction,
            DeviceError::Transport(_) | DeviceError::DeadlineExceeded => Phase::Transport,
            DeviceError::Status(_) => Phase::StatusCode,
            DeviceError::Body(_) => Phase::BodyRead,
        }
    }
}

impl From<TransportError> for DeviceError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Body(reason) => DeviceError::Body(reason),
            other => DeviceError::Transport(other),
        }
    }
}

/// Client for lamp devices.
#[derive(Clone)]
pub struct DeviceClient {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceClient").finish_non_exhaustive()
    }
}

impl DeviceClient {
    /// Create a client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Read the current color of the device at `host`.
    ///
    /// Returns the response body with surrounding whitespace stripped.
    pub async fn read_state(&self, host: &str, deadline: Instant) -> Result<String, DeviceError> {
        let request = DeviceRequest {
            method: Method::GET,
            url: device_url(host, STATUS_PATH)?,
            content_type: None,
            body: None,
        };
        debug!(host, "Reading lamp status");

        let response = self.send(request, deadline).await?;
        if response.status != StatusCode::OK {
            return Err(DeviceError::Status(response.status));
        }

        let body = std::str::from_utf8(&response.body)
            .map_err(|e| DeviceError::Body(format!("not UTF-8: {e}")))?;

        Ok(body.trim().to_string())
    }

    /// Set the color of the device at `host`.
    pub async fn write_state(
        &self,
        host: &str,
        color: &str,
        deadline: Instant,
    ) -> Result<(), DeviceError> {
        let request = DeviceRequest {
            method: Method::POST,
            url: device_url(host, UPDATE_PATH)?,
            content_type: Some(FORM_CONTENT_TYPE),
            body: Some(encode_color_form(color)),
        };
        debug!(host, color, "Updating lamp color");

        let response = self.send(request, deadline).await?;
        if response.status != StatusCode::OK {
            return Err(DeviceError::Status(response.status));
        }

        Ok(())
    }

    async fn send(
        &self,
        request: DeviceRequest,
        deadline: Instant,
    ) -> Result<DeviceResponse, DeviceError> {
        match tokio::time::timeout_at(deadline, self.transport.send(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DeviceError::DeadlineExceeded),
        }
    }
}

/// Build `http://<host><path>`, rejecting hosts that would alter the path.
pub fn device_url(host: &str, path: &str) -> Result<Url, DeviceError> {
    let invalid = |reason: &str| DeviceError::Request {
        host: host.to_string(),
        reason: reason.to_string(),
    };

    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    if host
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@' | '\\'))
    {
        return Err(invalid("host must be of the form host[:port]"));
    }

    let url = Url::parse(&format!("http://{host}{path}")).map_err(|e| invalid(&e.to_string()))?;
    if url.host().is_none() {
        return Err(invalid("missing host"));
    }

    Ok(url)
}

/// Encode the single-field form body `color=<value>`.
///
/// Uses WHATWG `application/x-www-form-urlencoded` escaping: a space becomes
/// `+`, `*` is left as is and `~` is escaped as `%7E`. Other encoders (Go's
/// `url.Values`, for one) escape those two the other way round, so the bytes
/// may differ while the decoded value is the same.
pub fn encode_color_form(color: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair(COLOR_FIELD, color)
        .finish()
}
