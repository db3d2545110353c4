//! Session counters
//!
//! Recorded through the `metrics` facade; the host application decides
//! whether a recorder is installed.
//!
//! - `session_refresh_total` (counter): label `outcome` (`success` | `failure`)
//! - `session_refresh_joined_total` (counter): callers that joined a running flight
//! - `session_auth_failures_total` (counter): label `reason`
//! - `session_requests_total` (counter): label `outcome`
//! - `session_retries_total` (counter): resends after a 401

pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_refresh_joined() {
    metrics::counter!("session_refresh_joined_total").increment(1);
}

pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("session_auth_failures_total", "reason" => reason).increment(1);
}

/// `outcome` is `success` or an error reason label.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("session_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_retry() {
    metrics::counter!("session_retries_total").increment(1);
}
