//! Authenticated request pipeline
//!
//! Wraps every backend call with credential handling: attaches the bearer
//! token, refreshes it ahead of expiry, funnels concurrent refreshes through
//! one in-flight exchange, retries once after a 401 and routes terminal
//! authentication failures to a single handler.
//!
//! Request lifecycle:
//! 1. Allowlisted targets (login/refresh/validate) pass straight through
//! 2. Otherwise the stored access token is classified
//! 3. `Expired` blocks the send; `Expiring` awaits `RefreshCoordinator::refresh()`
//! 4. The response is classified: 401 → refresh + one resend, other errors surface
//! 5. Successful bodies are unwrapped from the business envelope
//! 6. Authentication-class failures clear the session via `AuthFailureHandler`

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod failure;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use classify::{HttpErrorKind, classify_status};
pub use coordinator::RefreshCoordinator;
pub use error::{Error, Result};
pub use failure::AuthFailureHandler;
pub use hooks::{MessageLevel, SessionHooks};
pub use pipeline::{PipelineSettings, RequestPipeline};
pub use state::{RequestEvent, RequestState, advance};
