//! Session credentials for the authenticated request pipeline
//!
//! Holds the access/refresh pair, decides whether an access token is still
//! usable, and talks to the backend's auth endpoints. This crate has no
//! knowledge of the pipeline; it can be tested and used on its own.
//!
//! Credential flow:
//! 1. `token::login()` exchanges user credentials for a `TokenPair`
//! 2. The pair is stored via `credentials::TokenStore::set()`
//! 3. Every request classifies the stored access token with `claims::classify()`
//! 4. Near expiry, `token::refresh_token()` trades the refresh token for a new pair
//! 5. `token::logout()` tells the backend; the store is cleared regardless

pub mod claims;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use claims::{Claims, TokenState, classify};
pub use constants::*;
pub use credentials::{CredentialPair, TokenStore};
pub use error::{Error, Result};
pub use token::{RefreshPayload, TokenPair, login, logout, refresh_token};
