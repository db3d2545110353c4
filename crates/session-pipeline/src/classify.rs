//! Coarse classification of non-success HTTP statuses
//!
//! 401 is handled by the retry path and never reaches this module's callers
//! as a terminal kind. Everything else is bucketed for messaging only; none of
//! these statuses are retried.

use std::fmt;

use transport::envelope;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Forbidden,
    NotFound,
    ServerError,
    Other,
}

impl HttpErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            HttpErrorKind::Forbidden => "forbidden",
            HttpErrorKind::NotFound => "not_found",
            HttpErrorKind::ServerError => "server_error",
            HttpErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify_status(status: u16) -> HttpErrorKind {
    match status {
        403 => HttpErrorKind::Forbidden,
        404 => HttpErrorKind::NotFound,
        500..=599 => HttpErrorKind::ServerError,
        _ => HttpErrorKind::Other,
    }
}

/// Build the terminal error for a non-success, non-401 response.
///
/// For `Other` the backend's own `message` is the most useful thing to show,
/// so it is lifted from the body when present.
pub fn http_error(status: u16, body: &[u8]) -> Error {
    let kind = classify_status(status);
    let message = match kind {
        HttpErrorKind::Forbidden => "permission denied".to_string(),
        HttpErrorKind::NotFound => "the requested resource does not exist".to_string(),
        HttpErrorKind::ServerError => "internal server error".to_string(),
        HttpErrorKind::Other => envelope::error_message(body)
            .unwrap_or_else(|| format!("request failed ({status})")),
    };
    Error::Http {
        status,
        kind,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_and_not_found() {
        assert_eq!(classify_status(403), HttpErrorKind::Forbidden);
        assert_eq!(classify_status(404), HttpErrorKind::NotFound);
    }

    #[test]
    fn every_5xx_is_server_error() {
        for status in [500, 502, 503, 504, 599] {
            assert_eq!(classify_status(status), HttpErrorKind::ServerError, "{status}");
        }
    }

    #[test]
    fn remaining_statuses_are_other() {
        for status in [400, 405, 409, 422, 429, 302] {
            assert_eq!(classify_status(status), HttpErrorKind::Other, "{status}");
        }
    }

    #[test]
    fn other_uses_backend_message() {
        let err = http_error(422, br#"{"statusCode":422,"message":"empCode already exists"}"#);
        assert_eq!(
            err,
            Error::Http {
                status: 422,
                kind: HttpErrorKind::Other,
                message: "empCode already exists".into()
            }
        );
    }

    #[test]
    fn other_without_message_mentions_status() {
        match http_error(429, b"") {
            Error::Http { message, .. } => assert_eq!(message, "request failed (429)"),
            other => panic!("expected Http, got {other:?}"),
        }
    }

    #[test]
    fn server_error_ignores_body_message() {
        match http_error(500, br#"{"message":"NullReferenceException at ..."}"#) {
            Error::Http { kind, message, .. } => {
                assert_eq!(kind, HttpErrorKind::ServerError);
                assert_eq!(message, "internal server error");
            }
            other => panic!("expected Http, got {other:?}"),
        }
    }
}
