//! The authenticated request pipeline
//!
//! `RequestPipeline::execute` is the single entry point for backend calls.
//! Pre-send it decides whether the request needs a credential and which one;
//! post-receive it turns the response into a payload or a classified error,
//! retrying exactly once after a 401.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use session_auth::{
    CACHE_BUST_PARAM, Claims, DEFAULT_ALLOWLIST, DEFAULT_EXPIRING_THRESHOLD, RefreshPayload,
    TokenState, TokenStore, classify,
};
use tracing::{debug, info, instrument, warn};
use transport::{Method, RequestDescriptor, Transport, TransportResponse};

use crate::classify::http_error;
use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::failure::AuthFailureHandler;
use crate::hooks::{MessageLevel, SessionHooks};
use crate::metrics;
use crate::state::{RequestEvent, RequestState, advance};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Refresh ahead of expiry when less than this remains.
    pub expiring_threshold: Duration,
    /// Target substrings that never carry credentials.
    pub allowlist: Vec<String>,
    /// Append `_t=<unix millis>` to GET requests.
    pub cache_bust: bool,
    pub refresh_payload: RefreshPayload,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            expiring_threshold: DEFAULT_EXPIRING_THRESHOLD,
            allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            cache_bust: true,
            refresh_payload: RefreshPayload::default(),
        }
    }
}

pub struct RequestPipeline {
    store: Arc<TokenStore>,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn SessionHooks>,
    failures: Arc<AuthFailureHandler>,
    coordinator: Arc<RefreshCoordinator>,
    settings: PipelineSettings,
}

/// Lifecycle tracker for one execution.
struct Lifecycle(RequestState);

impl Lifecycle {
    fn step(&mut self, event: RequestEvent) -> Result<()> {
        self.0 = advance(self.0, event)?;
        Ok(())
    }
}

impl RequestPipeline {
    pub fn new(
        store: Arc<TokenStore>,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn SessionHooks>,
        settings: PipelineSettings,
    ) -> Self {
        let failures = Arc::new(AuthFailureHandler::new(store.clone(), hooks.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            failures.clone(),
            settings.refresh_payload,
            settings.expiring_threshold,
        ));
        Self {
            store,
            transport,
            hooks,
            failures,
            coordinator,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn failure_handler(&self) -> &Arc<AuthFailureHandler> {
        &self.failures
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Whether `target` is exempt from credential handling.
    pub fn is_allowlisted(&self, target: &str) -> bool {
        self.settings
            .allowlist
            .iter()
            .any(|pattern| target.contains(pattern.as_str()))
    }

    /// Send `request` and return the unwrapped business payload.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<serde_json::Value> {
        self.execute_as(request).await
    }

    /// Send `request` and decode the payload into `T`.
    ///
    /// Every failure except the authentication class is shown to the user
    /// here, once. Authentication failures were already reported by the
    /// failure handler.
    #[instrument(skip_all, fields(request_id = %request.id(), method = %request.method, target = %request.target))]
    pub async fn execute_as<T: DeserializeOwned>(&self, mut request: RequestDescriptor) -> Result<T> {
        let show_loading = request.show_loading;
        if show_loading {
            self.hooks.loading_started(&request.target);
        }

        let result = self.run(&mut request).await.and_then(|value| {
            serde_json::from_value(value).map_err(|e| Error::Decode(format!("unexpected payload: {e}")))
        });

        if show_loading {
            self.hooks.loading_finished(&request.target);
        }

        match &result {
            Ok(_) => {
                debug!(retried = request.retried(), "request succeeded");
                metrics::record_request("success");
            }
            Err(e) => {
                metrics::record_request(e.reason());
                if e.is_auth_failure() {
                    debug!(error = %e, "request ended by authentication failure");
                } else {
                    warn!(error = %e, "request failed");
                    self.hooks.show_message(MessageLevel::Error, &e.user_message());
                }
            }
        }
        result
    }

    pub async fn get(&self, target: &str) -> Result<serde_json::Value> {
        self.execute(RequestDescriptor::get(target)).await
    }

    pub async fn post(&self, target: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.execute(RequestDescriptor::post(target, body)).await
    }

    pub async fn put(&self, target: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.execute(RequestDescriptor::put(target, body)).await
    }

    pub async fn delete(&self, target: &str) -> Result<serde_json::Value> {
        self.execute(RequestDescriptor::delete(target)).await
    }

    async fn run(&self, request: &mut RequestDescriptor) -> Result<serde_json::Value> {
        let mut lifecycle = Lifecycle(RequestState::Draft);
        lifecycle.step(RequestEvent::Submit)?;

        let authenticated = match self.authorize(request).await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                let event = match e {
                    Error::NotAuthenticated | Error::SessionExpired => RequestEvent::Block,
                    _ => RequestEvent::Fail,
                };
                lifecycle.step(event)?;
                return Err(e);
            }
        };
        lifecycle.step(RequestEvent::Attach)?;
        self.bust_cache(request);

        loop {
            lifecycle.step(RequestEvent::Send)?;
            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    lifecycle.step(RequestEvent::Fail)?;
                    return Err(e.into());
                }
            };

            if authenticated && response.is_unauthorized() {
                if !request.mark_retried() {
                    lifecycle.step(RequestEvent::Fail)?;
                    let err = Error::AuthenticationFailed;
                    self.failures.on_auth_failure(&err).await;
                    return Err(err);
                }

                lifecycle.step(RequestEvent::Unauthorized)?;
                metrics::record_retry();
                debug!("unauthorized, refreshing before the single retry");

                let observed = request.bearer().map(str::to_owned);
                let refreshed = match observed {
                    Some(observed) => self.coordinator.refresh_stale(&observed).await,
                    None => self.coordinator.refresh().await,
                };
                let token = match refreshed {
                    Ok(token) => token,
                    Err(e) => {
                        lifecycle.step(RequestEvent::Fail)?;
                        return Err(e);
                    }
                };
                request.attach_bearer(&token)?;
                continue;
            }

            let result = settle(response);
            lifecycle.step(if result.is_ok() {
                RequestEvent::Succeed
            } else {
                RequestEvent::Fail
            })?;
            return result;
        }
    }

    /// Attach the bearer header when the request needs one. Returns whether
    /// credentials are in play for this request.
    async fn authorize(&self, request: &mut RequestDescriptor) -> Result<bool> {
        if !request.auth_required || self.is_allowlisted(&request.target) {
            debug!("credential-exempt target, passing through");
            return Ok(false);
        }

        let access = match self.store.get().await {
            Some(pair) => pair.access.expose().clone(),
            None => return Err(self.block(Error::NotAuthenticated).await),
        };

        let state = classify(Some(&access), SystemTime::now(), self.settings.expiring_threshold);
        let token = match state {
            TokenState::Absent => return Err(self.block(Error::NotAuthenticated).await),
            TokenState::Expired | TokenState::Invalid => {
                return Err(self.block(Error::SessionExpired).await);
            }
            TokenState::Expiring => {
                debug!("access token expiring, refreshing before send");
                self.coordinator.refresh_stale(&access).await?
            }
            TokenState::Valid => access,
        };

        request.attach_bearer(&token)?;
        Ok(true)
    }

    async fn block(&self, err: Error) -> Error {
        self.failures.on_auth_failure(&err).await;
        err
    }

    fn bust_cache(&self, request: &mut RequestDescriptor) {
        if !self.settings.cache_bust || request.method != Method::GET {
            return;
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        request.query.retain(|(key, _)| key != CACHE_BUST_PARAM);
        request
            .query
            .push((CACHE_BUST_PARAM.to_string(), millis.to_string()));
    }

    /// Exchange user credentials for a session.
    pub async fn login(&self, form: serde_json::Value) -> Result<()> {
        self.hooks.loading_started("login");
        let result = self.exchange_login(form).await;
        self.hooks.loading_finished("login");

        match &result {
            Ok(()) => {
                info!("logged in");
                self.hooks.show_message(MessageLevel::Success, "Logged in.");
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                self.hooks.show_message(MessageLevel::Error, &e.user_message());
            }
        }
        result
    }

    async fn exchange_login(&self, form: serde_json::Value) -> Result<()> {
        let pair = session_auth::login(self.transport.as_ref(), form)
            .await
            .map_err(|e| match e {
                session_auth::Error::Transport(t) => Error::Transport(t),
                session_auth::Error::Rejected { message, .. } => Error::Login(Some(message)),
                session_auth::Error::InvalidCredentials(detail)
                | session_auth::Error::TokenExchange(detail) => {
                    debug!(%detail, "login exchange failed without a backend message");
                    Error::Login(None)
                }
                other => Error::Store(other.to_string()),
            })?;
        self.store.set(pair.into()).await.map_err(Error::from)
    }

    /// End the session. The backend is told on a best-effort basis; local
    /// credentials are cleared regardless.
    pub async fn logout(&self) -> Result<()> {
        if let Some(pair) = self.store.get().await
            && let Err(e) = session_auth::logout(self.transport.as_ref(), pair.access.expose()).await
        {
            warn!(error = %e, "backend logout failed, clearing local session anyway");
        }

        self.store.clear().await.map_err(Error::from)?;
        info!("logged out");
        if !self.hooks.at_entry_point() {
            self.hooks.go_to_entry_point();
        }
        Ok(())
    }

    /// Force a refresh through the coordinator.
    pub async fn refresh(&self) -> Result<()> {
        self.coordinator.refresh().await.map(|_| ())
    }

    /// Administrative clear, without messages or navigation.
    pub async fn reset(&self) -> Result<()> {
        self.failures.reset().await
    }

    /// Classify the stored access token as of now.
    pub async fn token_state(&self) -> TokenState {
        let pair = self.store.get().await;
        classify(
            pair.as_ref().map(|p| p.access.expose().as_str()),
            SystemTime::now(),
            self.settings.expiring_threshold,
        )
    }

    /// Claims of the stored access token, if it decodes.
    pub async fn claims(&self) -> Option<Claims> {
        let pair = self.store.get().await?;
        Claims::decode(pair.access.expose()).ok()
    }
}

/// Turn a final response into the caller-facing payload.
fn settle(response: TransportResponse) -> Result<serde_json::Value> {
    if !response.is_success() {
        return Err(http_error(response.status, &response.body));
    }
    Ok(transport::unwrap_body(&response.body)?)
}
