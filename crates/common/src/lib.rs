//! Shared types for the session workspace
//!
//! `Secret` wraps access tokens, refresh tokens and login passwords so they
//! never reach logs. `Error` covers configuration loading for binaries.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
