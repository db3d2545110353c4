//! Single-flight token refresh
//!
//! However many requests discover an expiring token or a 401 at the same
//! time, the backend sees one refresh call. The first caller opens a flight;
//! everyone else subscribes to it. When the flight settles, every subscriber
//! receives the same outcome and the flight is cleared, in that order, under
//! the flight lock.
//!
//! The exchange itself runs on a spawned task. A caller that gives up on its
//! future only drops its own receiver; the other subscribers still get an
//! answer and the new pair is still stored.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use session_auth::{RefreshPayload, TokenState, TokenStore, classify};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};
use transport::Transport;

use crate::error::{Error, Result};
use crate::failure::AuthFailureHandler;
use crate::metrics;

/// A refresh in progress and everyone waiting on it.
struct RefreshFlight {
    subscribers: Vec<oneshot::Sender<Result<String>>>,
}

pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    transport: Arc<dyn Transport>,
    failures: Arc<AuthFailureHandler>,
    payload: RefreshPayload,
    threshold: Duration,
    flight: Mutex<Option<RefreshFlight>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        transport: Arc<dyn Transport>,
        failures: Arc<AuthFailureHandler>,
        payload: RefreshPayload,
        threshold: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            failures,
            payload,
            threshold,
            flight: Mutex::new(None),
        }
    }

    /// Obtain a fresh access token, joining the running flight if there is one.
    pub async fn refresh(self: &Arc<Self>) -> Result<String> {
        let receiver = {
            let mut flight = self.flight.lock().await;
            self.subscribe(&mut flight)
        };
        Self::await_outcome(receiver).await
    }

    /// Like `refresh`, for a caller that decided to refresh after seeing
    /// `observed` in the store.
    ///
    /// Between that read and this call another flight may already have
    /// rotated the token. If so, and the stored token is comfortably valid,
    /// it is returned as-is instead of spending a second refresh on the same
    /// expiry.
    pub async fn refresh_stale(self: &Arc<Self>, observed: &str) -> Result<String> {
        let receiver = {
            let mut flight = self.flight.lock().await;
            if flight.is_none()
                && let Some(current) = self.rotated_since(observed).await
            {
                debug!("token already rotated by an earlier refresh");
                return Ok(current);
            }
            self.subscribe(&mut flight)
        };
        Self::await_outcome(receiver).await
    }

    /// Whether a flight is currently running.
    pub async fn in_flight(&self) -> bool {
        self.flight.lock().await.is_some()
    }

    async fn rotated_since(&self, observed: &str) -> Option<String> {
        let pair = self.store.get().await?;
        let current = pair.access.expose();
        let state = classify(Some(current), SystemTime::now(), self.threshold);
        (current != observed && state == TokenState::Valid).then(|| current.clone())
    }

    /// Join the running flight or open a new one. Caller holds the flight lock.
    fn subscribe(
        self: &Arc<Self>,
        flight: &mut Option<RefreshFlight>,
    ) -> oneshot::Receiver<Result<String>> {
        let (tx, rx) = oneshot::channel();
        match flight {
            Some(running) => {
                running.subscribers.push(tx);
                debug!(
                    subscribers = running.subscribers.len(),
                    "joined in-flight token refresh"
                );
                metrics::record_refresh_joined();
            }
            None => {
                *flight = Some(RefreshFlight {
                    subscribers: vec![tx],
                });
                debug!("starting token refresh");
                let this = Arc::clone(self);
                tokio::spawn(async move { this.fly().await });
            }
        }
        rx
    }

    async fn await_outcome(receiver: oneshot::Receiver<Result<String>>) -> Result<String> {
        receiver
            .await
            .unwrap_or_else(|_| Err(Error::RefreshFailed("refresh flight abandoned".into())))
    }

    async fn fly(self: Arc<Self>) {
        let outcome = self.exchange().await;

        match &outcome {
            Ok(_) => {
                info!("token refresh succeeded");
                metrics::record_refresh("success");
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, ending session");
                metrics::record_refresh("failure");
                self.failures.on_auth_failure(e).await;
            }
        }

        let mut flight = self.flight.lock().await;
        if let Some(settled) = flight.as_mut() {
            for subscriber in settled.subscribers.drain(..) {
                // A subscriber that stopped waiting is not an error.
                let _ = subscriber.send(outcome.clone());
            }
        }
        *flight = None;
    }

    /// Trade the stored refresh token for a new pair and store it.
    async fn exchange(&self) -> Result<String> {
        let refresh = match self.store.get().await {
            Some(pair) => pair.refresh.expose().clone(),
            None => return Err(Error::NoRefreshToken),
        };

        let pair = session_auth::refresh_token(self.transport.as_ref(), &refresh, self.payload)
            .await
            .map_err(Error::from)?;
        let access = pair.access_token.clone();

        self.store
            .set(pair.into())
            .await
            .map_err(|e| Error::RefreshFailed(format!("storing refreshed tokens: {e}")))?;
        Ok(access)
    }
}
