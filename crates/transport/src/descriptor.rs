//! Request descriptors
//!
//! A descriptor is everything needed to send (and re-send) one backend call.
//! The pipeline mutates it in place: attaching the bearer header, appending
//! the cache-busting query parameter, and flipping `retried` at most once.

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use uuid::Uuid;

use crate::{Result, TransportError};

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    id: Uuid,
    pub method: Method,
    /// Path relative to the backend base URL, e.g. `/api/user/query`.
    pub target: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// False for login/refresh/validate-class endpoints.
    pub auth_required: bool,
    /// Whether loading notifications fire for this request.
    pub show_loading: bool,
    retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            target: target.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            auth_required: true,
            show_loading: true,
            retried: false,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, target).with_body(body)
    }

    pub fn put(target: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, target).with_body(body)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Mark the request as exempt from credential attachment.
    pub fn without_auth(mut self) -> Self {
        self.auth_required = false;
        self
    }

    /// Suppress loading notifications (background calls).
    pub fn without_loading(mut self) -> Self {
        self.show_loading = false;
        self
    }

    /// Correlation id for logs. Stable across the retry.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn retried(&self) -> bool {
        self.retried
    }

    /// Flip the retry marker. Returns false if it was already set, in which
    /// case the caller must not resend.
    pub fn mark_retried(&mut self) -> bool {
        if self.retried {
            return false;
        }
        self.retried = true;
        true
    }

    /// Set `Authorization: Bearer <token>`, replacing any previous value.
    pub fn attach_bearer(&mut self, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::InvalidRequest(format!("invalid bearer token: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// The token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}
