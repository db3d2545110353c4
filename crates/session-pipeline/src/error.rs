//! Error taxonomy for the request pipeline
//!
//! `Clone` so that one refresh outcome can be handed to every subscriber of a
//! flight.

use session_auth::Error as AuthError;
use transport::{EnvelopeError, TransportError};

use crate::classify::HttpErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session expired")]
    SessionExpired,

    #[error("no refresh token stored")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("authentication failed after retry")]
    AuthenticationFailed,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("http {status} ({kind}): {message}")]
    Http {
        status: u16,
        kind: HttpErrorKind,
        message: String,
    },

    #[error("business error {code}: {message}")]
    Business { code: i64, message: String },

    #[error("response decode failed: {0}")]
    Decode(String),

    /// Login refused. Carries the backend's reason when it gave one.
    #[error("login failed{}", .0.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Login(Option<String>),

    #[error("illegal request transition: {0}")]
    IllegalTransition(String),

    #[error("session store error: {0}")]
    Store(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors whose only remedy is a fresh login. These are reported by the
    /// auth failure handler, never by the request that hit them.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated
                | Error::SessionExpired
                | Error::NoRefreshToken
                | Error::RefreshFailed(_)
                | Error::AuthenticationFailed
        )
    }

    /// Short label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotAuthenticated => "not_authenticated",
            Error::SessionExpired => "session_expired",
            Error::NoRefreshToken => "no_refresh_token",
            Error::RefreshFailed(_) => "refresh_failed",
            Error::AuthenticationFailed => "authentication_failed",
            Error::Transport(e) => e.label(),
            Error::Http { .. } => "http",
            Error::Business { .. } => "business",
            Error::Decode(_) => "decode",
            Error::Login(_) => "login",
            Error::IllegalTransition(_) => "illegal_transition",
            Error::Store(_) => "store",
        }
    }

    /// Text suitable for showing to the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotAuthenticated => "Please log in first.".into(),
            Error::SessionExpired | Error::NoRefreshToken | Error::RefreshFailed(_) => {
                "Your session has expired, please log in again.".into()
            }
            Error::AuthenticationFailed => {
                "Authentication failed, please log in again.".into()
            }
            Error::Transport(TransportError::Timeout(_)) => {
                "The request timed out, please try again later.".into()
            }
            Error::Transport(TransportError::Unreachable(_)) => {
                "The server could not be reached, check the network connection.".into()
            }
            Error::Transport(_) => "Network error, please try again later.".into(),
            Error::Http { kind, message, .. } => match kind {
                HttpErrorKind::Forbidden => "You do not have permission to do that.".into(),
                HttpErrorKind::NotFound => "The requested resource does not exist.".into(),
                HttpErrorKind::ServerError => "Internal server error.".into(),
                HttpErrorKind::Other => message.clone(),
            },
            Error::Business { message, .. } => message.clone(),
            Error::Decode(_) => "The server sent an unreadable response.".into(),
            Error::Login(Some(message)) => message.clone(),
            Error::Login(None) => "Login failed, check the user name and password.".into(),
            Error::IllegalTransition(_) | Error::Store(_) => {
                "Something went wrong, please try again.".into()
            }
        }
    }
}

impl From<EnvelopeError> for Error {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Business { code, message } => Error::Business { code, message },
            EnvelopeError::Malformed(msg) => Error::Decode(msg),
        }
    }
}

/// Map a failed refresh exchange. Network failures stay network failures in
/// the log, but every subscriber sees `RefreshFailed`: a refresh that did not
/// produce a token ends the session either way.
impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Io(msg) | AuthError::CredentialParse(msg) => Error::Store(msg),
            other => Error::RefreshFailed(other.to_string()),
        }
    }
}
