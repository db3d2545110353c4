//! `reqwest`-backed transport
//!
//! Joins descriptor targets onto the configured base URL, injects the
//! configured default headers (never `Authorization`, which belongs to the
//! pipeline), serializes JSON bodies and enforces one fixed per-request
//! timeout. Responses are returned verbatim, including non-2xx statuses.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::{RequestDescriptor, Result, Transport, TransportError, TransportResponse};

/// Content type the backend expects on every JSON request.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Header injection rule (name + value pair from config).
#[derive(Debug, Clone)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    default_headers: HeaderMap,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport for `base_url`.
    ///
    /// Invalid header names/values are skipped with a warning rather than
    /// failing startup; an injected `Authorization` is refused outright.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        injections: &[HeaderInjection],
        timeout: Duration,
    ) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid base url {base_url}: {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        for injection in injections {
            let name = match HeaderName::from_str(&injection.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == reqwest::header::AUTHORIZATION {
                warn!(header = %injection.name, "refusing to inject authorization header");
                continue;
            }
            let value = match HeaderValue::from_str(&injection.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            default_headers.insert(name, value);
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for a descriptor: base + target + query pairs.
    pub fn url_for(&self, request: &RequestDescriptor) -> Result<Url> {
        let target = if request.target.starts_with('/') {
            request.target.clone()
        } else {
            format!("/{}", request.target)
        };
        let mut url = Url::parse(&format!("{}{}", self.base_url, target)).map_err(|e| {
            TransportError::InvalidRequest(format!("invalid target {}: {e}", request.target))
        })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn dispatch(&self, request: &RequestDescriptor) -> Result<TransportResponse> {
        let url = self.url_for(request)?;

        // Descriptor headers win over defaults.
        let mut headers = self.default_headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(self.timeout);

        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| TransportError::InvalidRequest(format!("serializing body: {e}")))?;
            builder = builder.body(bytes);
        }

        debug!(request_id = %request.id(), method = %request.method, target = %request.target, "sending request");

        let response = builder.send().await.map_err(|e| map_send_error(e, self.timeout))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        debug!(request_id = %request.id(), status, "response received");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'a>> {
        Box::pin(self.dispatch(request))
    }
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(format!("no response within {}s", timeout.as_secs()))
    } else if e.is_connect() {
        TransportError::Unreachable(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
