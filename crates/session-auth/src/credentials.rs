//! Token storage for the current session
//!
//! Holds exactly one access/refresh pair. The durable form is a JSON file with
//! two keys (`access_token`, `refresh_token`); all writes use temp-file +
//! rename so a crash never leaves a half-written pair on disk. A tokio Mutex
//! serializes writers, and readers clone the pair under the same lock, so no
//! caller ever observes a new access token next to a stale refresh token.
//!
//! This store is the only place tokens live between operations.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};

/// An access token and the refresh token issued alongside it.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }
}

/// On-disk shape. Both fields are optional only so that a damaged or
/// hand-edited file can be detected and treated as "no session".
///
/// Field names are the storage keys `ACCESS_TOKEN_KEY` and `REFRESH_TOKEN_KEY`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StoredTokens {
    fn from_pair(pair: &CredentialPair) -> Self {
        Self {
            access_token: Some(pair.access.expose().clone()),
            refresh_token: Some(pair.refresh.expose().clone()),
        }
    }

    fn into_pair(self, path: &Path) -> Option<CredentialPair> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            (None, None) => None,
            (Some(_), None) => {
                warn!(path = %path.display(), missing = REFRESH_TOKEN_KEY, "token file holds only half a credential pair, ignoring it");
                None
            }
            (None, Some(_)) => {
                warn!(path = %path.display(), missing = ACCESS_TOKEN_KEY, "token file holds only half a credential pair, ignoring it");
                None
            }
        }
    }
}

pub struct TokenStore {
    path: Option<PathBuf>,
    state: Mutex<Option<CredentialPair>>,
}

impl TokenStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(None),
        }
    }

    /// Load the session from `path`.
    ///
    /// A missing file is a cold start: it is created as `{}` so later writes
    /// only ever replace an existing file.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let pair = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            let stored: StoredTokens = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing token file: {e}")))?;
            let pair = stored.into_pair(&path);
            info!(path = %path.display(), session = pair.is_some(), "loaded token file");
            pair
        } else {
            info!(path = %path.display(), "token file not found, starting without a session");
            write_atomic(&path, &StoredTokens::default()).await?;
            None
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(pair),
        })
    }

    /// Where the pair is persisted, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current pair.
    pub async fn get(&self) -> Option<CredentialPair> {
        self.state.lock().await.clone()
    }

    /// Replace both tokens at once.
    ///
    /// The in-memory pair only changes after the file write succeeded, so a
    /// failed write leaves the previous session intact on both sides.
    pub async fn set(&self, pair: CredentialPair) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(path) = &self.path {
            write_atomic(path, &StoredTokens::from_pair(&pair)).await?;
        }
        *state = Some(pair);
        debug!("stored credential pair");
        Ok(())
    }

    /// Drop both tokens.
    ///
    /// Memory is cleared before the file so that even a failed write cannot
    /// leave this process attaching the old token.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let had_session = state.take().is_some();
        if let Some(path) = &self.path {
            write_atomic(path, &StoredTokens::default()).await?;
        }
        debug!(had_session, "cleared credential pair");
        Ok(())
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_none()
    }
}

/// Write the token file atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &StoredTokens) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing tokens: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("token path has no parent directory".into())),
    };

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted tokens");
    Ok(())
}
