//! Token exchange with the backend's auth endpoints
//!
//! Handles the three calls that bypass credential attachment:
//! 1. Login (user credentials → token pair)
//! 2. Refresh (refresh token → new token pair)
//! 3. Logout (tell the backend the session is over)
//!
//! All go through a `Transport` so the pipeline and tests share one seam.
//! Login and refresh answer with the business envelope carrying
//! `{accessToken, refreshToken}` in `data`.

use serde::{Deserialize, Serialize};
use tracing::debug;
use transport::envelope::{self, EnvelopeError};
use transport::{RequestDescriptor, Transport, TransportResponse};

use crate::constants::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Token pair as issued by login and refresh.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for CredentialPair {
    fn from(pair: TokenPair) -> Self {
        CredentialPair::new(pair.access_token, pair.refresh_token)
    }
}

/// Body shape of the refresh request. Backends disagree on whether the
/// refresh token is sent wrapped in an object or as a bare JSON string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPayload {
    /// `{"refreshToken": "<token>"}`
    #[default]
    Wrapped,
    /// `"<token>"`
    Bare,
}

impl RefreshPayload {
    fn body(self, refresh: &str) -> serde_json::Value {
        match self {
            RefreshPayload::Wrapped => serde_json::json!({ "refreshToken": refresh }),
            RefreshPayload::Bare => serde_json::Value::String(refresh.to_string()),
        }
    }
}

/// The descriptor for a refresh call. Exposed so callers can recognise it.
pub fn refresh_request(refresh: &str, payload: RefreshPayload) -> RequestDescriptor {
    RequestDescriptor::post(REFRESH_PATH, payload.body(refresh))
        .without_auth()
        .without_loading()
}

/// Exchange user credentials for a token pair.
///
/// `form` is sent as-is; its field names belong to the backend's login form.
pub async fn login(transport: &dyn Transport, form: serde_json::Value) -> Result<TokenPair> {
    let request = RequestDescriptor::post(LOGIN_PATH, form).without_auth();
    let response = transport.send(&request).await?;
    decode_token_response(response, "login")
}

/// Trade a refresh token for a new pair.
///
/// 401/403 from the endpoint means the refresh token is revoked or expired.
pub async fn refresh_token(
    transport: &dyn Transport,
    refresh: &str,
    payload: RefreshPayload,
) -> Result<TokenPair> {
    let request = refresh_request(refresh, payload);
    let response = transport.send(&request).await?;
    decode_token_response(response, "refresh")
}

/// Tell the backend the session is over.
pub async fn logout(transport: &dyn Transport, access: &str) -> Result<()> {
    let mut request =
        RequestDescriptor::post(LOGOUT_PATH, serde_json::json!({})).without_loading();
    request.attach_bearer(access)?;
    let response = transport.send(&request).await?;
    if !response.is_success() {
        return Err(Error::TokenExchange(format!(
            "logout returned {}: {}",
            response.status,
            response.text()
        )));
    }
    debug!("backend acknowledged logout");
    Ok(())
}

fn decode_token_response(response: TransportResponse, operation: &str) -> Result<TokenPair> {
    if !response.is_success() {
        if let Some(message) = envelope::error_message(&response.body) {
            return Err(Error::Rejected {
                status: i64::from(response.status),
                message,
            });
        }
        let body = response.text();
        if response.status == 401 || response.status == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{operation} rejected ({}): {body}",
                response.status
            )));
        }
        return Err(Error::TokenExchange(format!(
            "{operation} returned {}: {body}",
            response.status
        )));
    }

    let pair: TokenPair = envelope::decode_typed(&response.body).map_err(|e| match e {
        EnvelopeError::Business { code, message } => Error::Rejected {
            status: code,
            message,
        },
        EnvelopeError::Malformed(msg) => {
            Error::TokenExchange(format!("invalid {operation} response: {msg}"))
        }
    })?;

    if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
        return Err(Error::TokenExchange(format!(
            "{operation} response is missing a token"
        )));
    }
    Ok(pair)
}
