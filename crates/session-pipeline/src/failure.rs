//! Terminal authentication failures
//!
//! Every path that ends a session funnels through `AuthFailureHandler` so the
//! side effects happen in one place: clear the store, tell the user, go back
//! to the login entry point.

use std::sync::Arc;

use session_auth::TokenStore;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::hooks::{MessageLevel, SessionHooks};
use crate::metrics;

pub struct AuthFailureHandler {
    store: Arc<TokenStore>,
    hooks: Arc<dyn SessionHooks>,
}

impl AuthFailureHandler {
    pub fn new(store: Arc<TokenStore>, hooks: Arc<dyn SessionHooks>) -> Self {
        Self { store, hooks }
    }

    /// End the session because of `reason`.
    ///
    /// Safe to call repeatedly: clearing an empty store is a no-op and the
    /// redirect is skipped once the application is at the entry point.
    pub async fn on_auth_failure(&self, reason: &Error) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to persist cleared session");
        }

        let label = reason.reason();
        warn!(reason = label, error = %reason, "authentication failure, session cleared");
        metrics::record_auth_failure(label);

        self.hooks
            .show_message(MessageLevel::Error, &reason.user_message());
        if !self.hooks.at_entry_point() {
            self.hooks.go_to_entry_point();
        }
    }

    /// Administrative clear. No message, no navigation.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await.map_err(Error::from)?;
        info!("session reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingHooks;
    use session_auth::CredentialPair;

    async fn seeded_store() -> Arc<TokenStore> {
        let store = Arc::new(TokenStore::in_memory());
        store.set(CredentialPair::new("at_1", "rt_1")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn failure_clears_messages_and_redirects() {
        let store = seeded_store().await;
        let hooks = Arc::new(RecordingHooks::default());
        let handler = AuthFailureHandler::new(store.clone(), hooks.clone());

        handler.on_auth_failure(&Error::SessionExpired).await;

        assert!(store.is_empty().await);
        assert_eq!(
            hooks.messages(),
            vec![(
                MessageLevel::Error,
                Error::SessionExpired.user_message()
            )]
        );
        assert_eq!(hooks.redirects(), 1);
    }

    #[tokio::test]
    async fn redirect_skipped_at_entry_point() {
        let store = seeded_store().await;
        let hooks = Arc::new(RecordingHooks::default());
        let handler = AuthFailureHandler::new(store, hooks.clone());

        handler.on_auth_failure(&Error::AuthenticationFailed).await;
        handler.on_auth_failure(&Error::AuthenticationFailed).await;

        // The first redirect lands on the entry point, the second is skipped.
        assert_eq!(hooks.redirects(), 1);
        assert_eq!(hooks.messages().len(), 2);
    }

    #[tokio::test]
    async fn reset_is_silent() {
        let store = seeded_store().await;
        let hooks = Arc::new(RecordingHooks::default());
        let handler = AuthFailureHandler::new(store.clone(), hooks.clone());

        handler.reset().await.unwrap();

        assert!(store.is_empty().await);
        assert!(hooks.messages().is_empty());
        assert_eq!(hooks.redirects(), 0);
    }
}
