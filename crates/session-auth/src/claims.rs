//! Access-token claims and expiry classification
//!
//! Tokens are JWT-shaped (`header.payload.signature`). Only the payload is
//! read, and only to learn `exp`; the signature is the backend's business.
//! Anything that cannot be decoded is classified `Expired` so that a broken
//! token is never attached to a request.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;
use tracing::debug;

/// base64url, with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Usability of an access token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No token stored.
    Absent,
    /// Token text cannot be carried in a bearer header.
    Invalid,
    /// Past `exp`, or undecodable.
    Expired,
    /// Still valid but within the refresh threshold.
    Expiring,
    Valid,
}

impl TokenState {
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::Absent => "absent",
            TokenState::Invalid => "invalid",
            TokenState::Expired => "expired",
            TokenState::Expiring => "expiring",
            TokenState::Valid => "valid",
        }
    }
}

/// Decoded payload claims.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the unix epoch. NumericDate allows fractions.
    pub exp: f64,
    #[serde(default)]
    pub sub: Option<String>,
    /// Every other claim, e.g. employee and organisation attributes.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("expected 3 token segments, found {0}")]
    Segments(usize),

    #[error("payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("payload is not a claim set: {0}")]
    Json(#[from] serde_json::Error),
}

impl Claims {
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(ClaimsError::Segments(segments.len()));
        }
        let payload = PAYLOAD_ENGINE.decode(segments[1])?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Expiry as a wall-clock instant. `None` for pre-epoch values.
    pub fn expires_at(&self) -> Option<SystemTime> {
        Duration::try_from_secs_f64(self.exp)
            .ok()
            .and_then(|since_epoch| UNIX_EPOCH.checked_add(since_epoch))
    }

    /// Expiry in milliseconds since the unix epoch.
    pub fn expires_at_millis(&self) -> i128 {
        (self.exp * 1000.0) as i128
    }

    /// Roles claim, accepted either as `"a,b"` or `["a", "b"]`.
    pub fn roles(&self) -> Vec<String> {
        match self.attributes.get("roles") {
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_owned)
                .collect(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A string-valued attribute by claim name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_str())
    }
}

/// Classify `token` at `now` against the refresh `threshold`.
pub fn classify(token: Option<&str>, now: SystemTime, threshold: Duration) -> TokenState {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return TokenState::Absent,
    };

    if !token.bytes().all(|b| b.is_ascii_graphic()) {
        return TokenState::Invalid;
    }

    let claims = match Claims::decode(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "undecodable access token, treating as expired");
            return TokenState::Expired;
        }
    };

    let now_millis = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i128)
        .unwrap_or(0);
    let exp_millis = claims.expires_at_millis();

    if now_millis >= exp_millis {
        TokenState::Expired
    } else if exp_millis - now_millis < threshold.as_millis() as i128 {
        TokenState::Expiring
    } else {
        TokenState::Valid
    }
}
