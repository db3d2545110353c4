//! Transport abstraction for backend calls
//!
//! Defines the `Transport` trait that decouples the authenticated request
//! pipeline from the network. `HttpTransport` is the `reqwest`-backed
//! implementation; tests substitute scripted in-memory transports.
//!
//! Everything the pipeline sends is a `RequestDescriptor`, and every body it
//! receives is decoded once through `envelope::unwrap_body`.

pub mod descriptor;
pub mod envelope;
pub mod http;

pub use descriptor::RequestDescriptor;
pub use envelope::{Envelope, EnvelopeError, SUCCESS_CODE, unwrap_body};
pub use http::{HeaderInjection, HttpTransport};
pub use reqwest::Method;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::future::Future;
use std::pin::Pin;

/// Raw backend response, before any business-envelope interpretation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Response with an empty header map, used by fakes and tests.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Convenience for JSON bodies.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Body as lossy UTF-8, for log fields and error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network-layer failures. The request may or may not have reached the
/// backend; none of these are retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Label for metrics and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Unreachable(_) => "unreachable",
            TransportError::InvalidRequest(_) => "invalid_request",
            TransportError::Other(_) => "other",
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Sends fully prepared requests to the backend.
///
/// The descriptor already carries every header the caller wants, including
/// `Authorization` when the pipeline attached one. Implementations add only
/// transport-level concerns (base URL, default headers, timeout).
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'a>>;
}
