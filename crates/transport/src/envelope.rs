//! Business response envelope
//!
//! The backend wraps payloads as `{"statusCode": 200, "message": "...", "data": ...}`.
//! `statusCode` is the success signal regardless of the HTTP status, so a
//! transport-level 200 can still carry a failure. Bodies are decoded exactly
//! once here; callers never poke at raw JSON fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The business status code meaning success.
pub const SUCCESS_CODE: i64 = 200;

const STATUS_FIELD: &str = "statusCode";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T = serde_json::Value> {
    pub status_code: i64,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.status_code == SUCCESS_CODE
    }

    /// Unwrap the payload, turning a non-success code into `Business`.
    pub fn into_result(self) -> Result<Option<T>, EnvelopeError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(EnvelopeError::Business {
                code: self.status_code,
                message: self.message.unwrap_or_else(|| "request failed".into()),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("business error {code}: {message}")]
    Business { code: i64, message: String },

    #[error("malformed response body: {0}")]
    Malformed(String),
}

/// Decode a successful transport body into the caller-facing payload.
///
/// - empty body → `null`
/// - object with `statusCode` → typed envelope; success yields `data` (or `null`)
/// - any other JSON → returned as-is
/// - non-JSON, or a `statusCode` that is not an integer → `Malformed`
pub fn unwrap_body(body: &[u8]) -> Result<serde_json::Value, EnvelopeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| EnvelopeError::Malformed(format!("body is not JSON: {e}")))?;

    let is_enveloped = value
        .as_object()
        .is_some_and(|obj| obj.contains_key(STATUS_FIELD));
    if !is_enveloped {
        return Ok(value);
    }

    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| EnvelopeError::Malformed(format!("invalid envelope: {e}")))?;
    Ok(envelope.into_result()?.unwrap_or(serde_json::Value::Null))
}

/// Decode a body that must be an envelope carrying a typed payload.
pub fn decode_typed<T: DeserializeOwned>(body: &[u8]) -> Result<T, EnvelopeError> {
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| EnvelopeError::Malformed(format!("invalid envelope: {e}")))?;
    envelope
        .into_result()?
        .ok_or_else(|| EnvelopeError::Malformed("envelope has no data".into()))
}

/// Best-effort `message` extraction for error statuses.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}
