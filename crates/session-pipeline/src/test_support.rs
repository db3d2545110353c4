//! Fakes shared by the pipeline tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use session_auth::REFRESH_PATH;
use transport::{RequestDescriptor, Transport, TransportError, TransportResponse};

use crate::hooks::{MessageLevel, SessionHooks};

type Reply = Result<TransportResponse, TransportError>;
type Backend = Box<dyn Fn(&RequestDescriptor) -> Reply + Send + Sync>;

static TOKEN_SERIAL: AtomicUsize = AtomicUsize::new(0);

/// A signed-looking token whose `exp` is `offset_secs` from now. Every call
/// yields a distinct token.
pub(crate) fn jwt(offset_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let serial = TOKEN_SERIAL.fetch_add(1, Ordering::Relaxed);
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({"sub": "E1001", "exp": now + offset_secs, "jti": serial}).to_string(),
    );
    format!("{header}.{payload}.sig")
}

/// Refresh/login success envelope.
pub(crate) fn issued(access: &str, refresh: &str) -> TransportResponse {
    TransportResponse::json(
        200,
        &serde_json::json!({
            "statusCode": 200,
            "message": "ok",
            "data": {"accessToken": access, "refreshToken": refresh}
        }),
    )
}

/// Business success envelope around `data`.
pub(crate) fn ok(data: serde_json::Value) -> TransportResponse {
    TransportResponse::json(
        200,
        &serde_json::json!({"statusCode": 200, "message": "ok", "data": data}),
    )
}

/// In-memory backend. Refresh calls get the scripted refresh reply (after an
/// optional delay); everything else goes to the backend closure.
pub(crate) struct ScriptedTransport {
    refresh_reply: Reply,
    refresh_delay: Duration,
    backend: Backend,
    refresh_calls: AtomicUsize,
    refresh_bodies: Mutex<Vec<Option<serde_json::Value>>>,
    sent: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            refresh_reply: Ok(TransportResponse::new(500, "refresh not scripted")),
            refresh_delay: Duration::ZERO,
            backend: Box::new(|_| Ok(ok(serde_json::Value::Null))),
            refresh_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn refresh_with(mut self, reply: Reply) -> Self {
        self.refresh_reply = reply;
        self
    }

    pub(crate) fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn backend(
        mut self,
        backend: impl Fn(&RequestDescriptor) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.backend = Box::new(backend);
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_body(&self) -> Option<serde_json::Value> {
        self.refresh_bodies.lock().unwrap().last().cloned().flatten()
    }

    /// Non-refresh requests, in send order.
    pub(crate) fn sent(&self) -> Vec<RequestDescriptor> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = transport::Result<TransportResponse>> + Send + 'a>> {
        if request.target == REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_bodies
                .lock()
                .unwrap()
                .push(request.body.clone());
            let reply = self.refresh_reply.clone();
            let delay = self.refresh_delay;
            return Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            });
        }

        self.sent.lock().unwrap().push(request.clone());
        let reply = (self.backend)(request);
        Box::pin(async move { reply })
    }
}

/// Hooks that remember every call. Navigating to the entry point puts the
/// application there.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    messages: Mutex<Vec<(MessageLevel, String)>>,
    loading_started: AtomicUsize,
    loading_finished: AtomicUsize,
    redirects: AtomicUsize,
    at_entry: AtomicBool,
}

impl RecordingHooks {
    pub(crate) fn messages(&self) -> Vec<(MessageLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }

    /// (started, finished)
    pub(crate) fn loading(&self) -> (usize, usize) {
        (
            self.loading_started.load(Ordering::SeqCst),
            self.loading_finished.load(Ordering::SeqCst),
        )
    }
}

impl SessionHooks for RecordingHooks {
    fn loading_started(&self, _reason: &str) {
        self.loading_started.fetch_add(1, Ordering::SeqCst);
    }

    fn loading_finished(&self, _reason: &str) {
        self.loading_finished.fetch_add(1, Ordering::SeqCst);
    }

    fn show_message(&self, level: MessageLevel, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }

    fn at_entry_point(&self) -> bool {
        self.at_entry.load(Ordering::SeqCst)
    }

    fn go_to_entry_point(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        self.at_entry.store(true, Ordering::SeqCst);
    }
}
