//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password is read from `--password-file` or SESSIONCTL_PASSWORD
//! and is never stored in the TOML.

use common::Secret;
use serde::Deserialize;
use session_auth::{DEFAULT_ALLOWLIST, DEFAULT_EXPIRING_THRESHOLD, RefreshPayload};
use session_pipeline::PipelineSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Where the backend lives and how long to wait for it
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session handling
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_threshold")]
    pub expiring_threshold_secs: u64,
    #[serde(default)]
    pub refresh_payload: RefreshPayload,
    #[serde(default = "default_true")]
    pub cache_bust: bool,
    #[serde(default = "default_allowlist")]
    pub allowlist: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
            expiring_threshold_secs: default_threshold(),
            refresh_payload: RefreshPayload::default(),
            cache_bust: true,
            allowlist: default_allowlist(),
        }
    }
}

/// Header added to every backend request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

fn default_timeout() -> u64 {
    session_auth::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("sessionctl-tokens.json")
}

fn default_threshold() -> u64 {
    DEFAULT_EXPIRING_THRESHOLD.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_allowlist() -> Vec<String> {
    DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// SESSIONCTL_BASE_URL replaces `backend.base_url`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("SESSIONCTL_BASE_URL") {
            config.backend.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> common::Result<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.backend.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.expiring_threshold_secs == 0 {
            return Err(common::Error::Config(
                "expiring_threshold_secs must be greater than 0".into(),
            ));
        }

        if self.session.allowlist.iter().any(|p| p.trim().is_empty()) {
            return Err(common::Error::Config(
                "allowlist entries must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or SESSIONCTL_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("SESSIONCTL_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("sessionctl.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    pub fn transport_headers(&self) -> Vec<transport::HeaderInjection> {
        self.headers
            .iter()
            .map(|h| transport::HeaderInjection {
                name: h.name.clone(),
                value: h.value.clone(),
            })
            .collect()
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            expiring_threshold: Duration::from_secs(self.session.expiring_threshold_secs),
            allowlist: self.session.allowlist.clone(),
            cache_bust: self.session.cache_bust,
            refresh_payload: self.session.refresh_payload,
        }
    }
}

/// Resolve the login password.
///
/// Resolution order:
/// 1. `--password-file` path
/// 2. SESSIONCTL_PASSWORD env var
pub fn resolve_password(password_file: Option<&Path>) -> common::Result<Secret<String>> {
    if let Some(path) = password_file {
        let password = std::fs::read_to_string(path).map_err(|e| {
            common::Error::Config(format!(
                "failed to read password file {}: {e}",
                path.display()
            ))
        })?;
        let password = password.trim_end_matches(['\r', '\n']).to_owned();
        if password.is_empty() {
            return Err(common::Error::Config(format!(
                "password file {} is empty",
                path.display()
            )));
        }
        return Ok(Secret::new(password));
    }

    match std::env::var("SESSIONCTL_PASSWORD") {
        Ok(password) if !password.is_empty() => Ok(Secret::new(password)),
        _ => Err(common::Error::Config(
            "no password given: pass --password-file or set SESSIONCTL_PASSWORD".into(),
        )),
    }
}
