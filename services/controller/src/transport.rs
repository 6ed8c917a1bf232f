//! Device transport interface and implementations.
//!
//! The transport abstracts "send one request, get one response":
//! - [`HttpTransport`] talks to real devices over HTTP via reqwest
//! - [`MockTransport`] answers from a script, for tests and development
//!
//! The device client builds requests and interprets responses; transports
//! only move bytes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

/// A request to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub method: Method,
    pub url: Url,
    pub content_type: Option<&'static str>,
    pub body: Option<String>,
}

/// A device response with its body fully read.
#[derive(Debug, Clone)]
pub struct DeviceResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Transport failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not connect to the device.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The transport gave up waiting.
    #[error("timed out")]
    Timeout,

    /// The response body could not be read.
    #[error("body read failed: {0}")]
    Body(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Transport interface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for the full response.
    async fn send(&self, request: DeviceRequest) -> Result<DeviceResponse, TransportError>;
}

/// HTTP transport backed by a shared reqwest client.
///
/// The client pools connections and is safe to share across reconciles.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: DeviceRequest) -> Result<DeviceResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "Sending device request");

        let mut builder = self.client.request(request.method, request.url);
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();

        // Error bodies are informational only.
        let body = if status.is_success() {
            response
                .bytes()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?
        } else {
            response.bytes().await.unwrap_or_default()
        };

        Ok(DeviceResponse { status, body })
    }
}

/// Scripted reply for one path.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with a status and body.
    Respond { status: StatusCode, body: Bytes },

    /// Fail at the transport level.
    Fail(TransportError),

    /// Never answer.
    Hang,
}

/// Mock transport for testing and development.
///
/// Replies are scripted per URL path and apply to every host. Every request
/// is recorded. Paths without a script answer 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, MockReply>>,
    requests: Mutex<Vec<DeviceRequest>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a mock transport with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a reply for `path`, replacing any previous one.
    pub fn reply(&self, path: &str, reply: MockReply) {
        locked(&self.replies).insert(path.to_string(), reply);
    }

    /// Script a status and body for `path`.
    pub fn respond(&self, path: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.reply(
            path,
            MockReply::Respond {
                status,
                body: Bytes::copy_from_slice(body.as_bytes()),
            },
        );
    }

    /// Script a transport failure for `path`.
    pub fn fail(&self, path: &str, err: TransportError) {
        self.reply(path, MockReply::Fail(err));
    }

    /// Make requests to `path` hang forever.
    pub fn hang(&self, path: &str) {
        self.reply(path, MockReply::Hang);
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<DeviceRequest> {
        locked(&self.requests).clone()
    }

    /// Number of requests sent to `path`.
    pub fn count(&self, path: &str) -> usize {
        locked(&self.requests)
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: DeviceRequest) -> Result<DeviceResponse, TransportError> {
        let path = request.url.path().to_string();
        debug!(method = %request.method, url = %request.url, "[MOCK] Device request");

        locked(&self.requests).push(request);
        let reply = locked(&self.replies).get(&path).cloned();

        match reply {
            Some(MockReply::Respond { status, body }) => Ok(DeviceResponse { status, body }),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Ok(DeviceResponse {
                status: StatusCode::NOT_FOUND,
                body: Bytes::new(),
            }),
        }
    }
}
