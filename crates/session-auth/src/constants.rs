//! Backend endpoints and session defaults

use std::time::Duration;

/// Storage key for the access token in the persisted token file.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token in the persisted token file.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const VALIDATE_PATH: &str = "/api/auth/validate";

/// Target fragments that never carry credentials. Matched as substrings so
/// that gateway prefixes (`/api`, `/v2/api`) don't matter.
pub const DEFAULT_ALLOWLIST: &[&str] = &["/auth/login", "/auth/refresh", "/auth/validate"];

/// Refresh ahead of expiry by this much. Two minutes covers a slow refresh
/// round-trip before the token actually lapses.
pub const DEFAULT_EXPIRING_THRESHOLD: Duration = Duration::from_secs(120);

/// Fixed per-request timeout enforced by the transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query parameter appended to GET requests to defeat intermediary caches.
pub const CACHE_BUST_PARAM: &str = "_t";
