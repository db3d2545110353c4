//! sessionctl
//!
//! Command-line client for a backend that issues short-lived access tokens
//! paired with refresh tokens:
//! 1. `login` exchanges a user name and password for a token pair
//! 2. `request` sends any call through the authenticated pipeline
//! 3. `status` shows whether the stored token is valid, expiring or expired
//! 4. `refresh`, `logout` and `reset` manage the stored session

mod config;
mod hooks;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use session_auth::TokenStore;
use session_pipeline::{PipelineSettings, RequestPipeline, SessionHooks};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{HttpTransport, Method, RequestDescriptor};

use crate::config::Config;
use crate::hooks::ConsoleHooks;

/// Authenticated backend client
#[derive(Parser, Debug)]
#[command(name = "sessionctl")]
#[command(about = "Authenticated backend client with automatic token refresh", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $SESSIONCTL_CONFIG or ./sessionctl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print session counters in Prometheus text format to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and store the issued token pair
    Login {
        username: String,

        /// Read the password from this file instead of $SESSIONCTL_PASSWORD
        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// End the session on the backend and locally
    Logout,

    /// Show the state of the stored session
    Status,

    /// Send a request through the authenticated pipeline
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,

        /// Path relative to the backend base URL
        target: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,

        /// Send without credentials
        #[arg(long)]
        no_auth: bool,
    },

    /// Refresh the access token now
    Refresh,

    /// Clear the stored session without contacting the backend
    Reset,
}

fn parse_query_pair(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty query key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output on stderr and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    debug!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.backend.base_url,
        token_file = %config.session.token_file.display(),
        headers = config.headers.len(),
        "configuration loaded"
    );

    let hooks: Arc<dyn SessionHooks> = Arc::new(ConsoleHooks::new());
    let pipeline = build_pipeline(&config, hooks).await?;

    let outcome = execute(cli.command, &pipeline).await;

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }

    let output = outcome?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Wire the configured transport and token file into a pipeline.
async fn build_pipeline(config: &Config, hooks: Arc<dyn SessionHooks>) -> Result<RequestPipeline> {
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = HttpTransport::new(
        client,
        &config.backend.base_url,
        &config.transport_headers(),
        config.timeout(),
    )
    .context("invalid backend configuration")?;

    let store = TokenStore::load(config.session.token_file.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load token file {}",
                config.session.token_file.display()
            )
        })?;

    let settings: PipelineSettings = config.pipeline_settings();
    Ok(RequestPipeline::new(
        Arc::new(store),
        Arc::new(transport),
        hooks,
        settings,
    ))
}

/// Run one command. Returns what should be printed on stdout.
async fn execute(command: Commands, pipeline: &RequestPipeline) -> Result<String> {
    match command {
        Commands::Login {
            username,
            password_file,
        } => {
            let password = config::resolve_password(password_file.as_deref())?;
            pipeline
                .login(serde_json::json!({
                    "username": username,
                    "password": password.expose(),
                }))
                .await
                .context("login failed")?;
            let subject = pipeline
                .claims()
                .await
                .and_then(|c| c.sub)
                .unwrap_or(username);
            Ok(format!("logged in as {subject}"))
        }

        Commands::Logout => {
            pipeline.logout().await?;
            Ok("logged out".into())
        }

        Commands::Status => {
            let state = pipeline.token_state().await;
            let claims = pipeline.claims().await;
            let report = serde_json::json!({
                "state": state.label(),
                "subject": claims.as_ref().and_then(|c| c.sub.clone()),
                "expires_at": claims.as_ref().map(|c| c.exp),
                "roles": claims.as_ref().map(|c| c.roles()).unwrap_or_default(),
                "token_file": pipeline.store().path().map(|p| p.display().to_string()),
            });
            Ok(serde_json::to_string_pretty(&report)?)
        }

        Commands::Request {
            method,
            target,
            data,
            query,
            no_auth,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method {method}"))?;
            let mut request = RequestDescriptor::new(method, target);
            if let Some(data) = data {
                let body: serde_json::Value =
                    serde_json::from_str(&data).context("--data is not valid JSON")?;
                request = request.with_body(body);
            }
            for (key, value) in query {
                request = request.with_query(key, value);
            }
            if no_auth {
                request = request.without_auth();
            }

            let payload = pipeline.execute(request).await?;
            Ok(serde_json::to_string_pretty(&payload)?)
        }

        Commands::Refresh => {
            pipeline.refresh().await?;
            Ok(format!(
                "token refreshed ({})",
                pipeline.token_state().await.label()
            ))
        }

        Commands::Reset => {
            pipeline.reset().await?;
            Ok("session cleared".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tokio::net::TcpListener;

    /// What the mock backend currently accepts.
    struct MockBackend {
        accepted: Option<String>,
        refresh_token: Option<String>,
        /// `exp` offset, in seconds, of tokens issued at login.
        login_ttl: i64,
        refreshes: usize,
        serial: usize,
    }

    type Shared = Arc<Mutex<MockBackend>>;

    fn jwt(offset_secs: i64, serial: usize) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({
                "sub": "E1001",
                "exp": now + offset_secs,
                "roles": "admin,auditor",
                "jti": serial
            })
            .to_string(),
        );
        format!("{header}.{payload}.sig")
    }

    fn issue(backend: &mut MockBackend, ttl: i64) -> serde_json::Value {
        backend.serial += 1;
        let access = jwt(ttl, backend.serial);
        let refresh = format!("rt_{}", backend.serial);
        backend.accepted = Some(access.clone());
        backend.refresh_token = Some(refresh.clone());
        serde_json::json!({
            "statusCode": 200,
            "message": "ok",
            "data": {"accessToken": access, "refreshToken": refresh}
        })
    }

    async fn login(State(state): State<Shared>, Json(body): Json<serde_json::Value>) -> Response {
        if body["username"] != "E1001" || body["password"] != "pw" {
            return Json(serde_json::json!({"statusCode": 401, "message": "wrong password"}))
                .into_response();
        }
        let mut backend = state.lock().unwrap();
        let ttl = backend.login_ttl;
        Json(issue(&mut backend, ttl)).into_response()
    }

    async fn refresh(State(state): State<Shared>, Json(body): Json<serde_json::Value>) -> Response {
        let mut backend = state.lock().unwrap();
        if backend.refresh_token.as_deref() != body["refreshToken"].as_str() {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        backend.refreshes += 1;
        Json(issue(&mut backend, 3600)).into_response()
    }

    async fn logout(State(state): State<Shared>) -> Response {
        let mut backend = state.lock().unwrap();
        backend.accepted = None;
        backend.refresh_token = None;
        Json(serde_json::json!({"statusCode": 200})).into_response()
    }

    async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
        let backend = state.lock().unwrap();
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match (&backend.accepted, bearer) {
            (Some(accepted), Some(bearer)) if accepted == bearer => Json(serde_json::json!({
                "statusCode": 200,
                "data": {"empCode": "E1001", "empName": "Li Lei"}
            }))
            .into_response(),
            _ => StatusCode::UNAUTHORIZED.into_response(),
        }
    }

    /// Start the mock backend; returns its base URL and shared state.
    async fn start_backend(login_ttl: i64) -> (String, Shared) {
        let state: Shared = Arc::new(Mutex::new(MockBackend {
            accepted: None,
            refresh_token: None,
            login_ttl,
            refreshes: 0,
            serial: 0,
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = axum::Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/user/me", get(me))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), state)
    }

    struct Harness {
        pipeline: RequestPipeline,
        backend: Shared,
        dir: tempfile::TempDir,
    }

    async fn harness(login_ttl: i64) -> Harness {
        let (url, backend) = start_backend(login_ttl).await;
        let dir = tempfile::tempdir().unwrap();
        let config: Config = toml::from_str(&format!(
            r#"
[backend]
base_url = "{url}"
timeout_secs = 5

[session]
token_file = "{}"
"#,
            dir.path().join("tokens.json").display()
        ))
        .unwrap();
        config.validate().unwrap();

        let pipeline = build_pipeline(&config, Arc::new(ConsoleHooks::new()))
            .await
            .unwrap();
        Harness {
            pipeline,
            backend,
            dir,
        }
    }

    fn login_command(dir: &tempfile::TempDir, password: &str) -> Commands {
        let file = dir.path().join("password");
        std::fs::write(&file, password).unwrap();
        Commands::Login {
            username: "E1001".into(),
            password_file: Some(file),
        }
    }

    fn request_me() -> Commands {
        Commands::Request {
            method: "get".into(),
            target: "/api/user/me".into(),
            data: None,
            query: vec![],
            no_auth: false,
        }
    }

    #[tokio::test]
    async fn login_then_request() {
        let h = harness(3600).await;

        let out = execute(login_command(&h.dir, "pw"), &h.pipeline).await.unwrap();
        assert_eq!(out, "logged in as E1001");

        let out = execute(request_me(), &h.pipeline).await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["empCode"], "E1001");
        assert_eq!(h.backend.lock().unwrap().refreshes, 0);

        let stored = std::fs::read_to_string(h.dir.path().join("tokens.json")).unwrap();
        let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(
            stored["access_token"].as_str(),
            h.backend.lock().unwrap().accepted.as_deref()
        );
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let h = harness(3600).await;

        let err = execute(login_command(&h.dir, "nope"), &h.pipeline)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("wrong password"), "{err:#}");
        assert!(h.pipeline.store().is_empty().await);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_before_send() {
        // Login issues tokens that are already inside the refresh threshold.
        let h = harness(30).await;
        execute(login_command(&h.dir, "pw"), &h.pipeline).await.unwrap();

        let out = execute(request_me(), &h.pipeline).await.unwrap();

        assert!(out.contains("Li Lei"));
        assert_eq!(h.backend.lock().unwrap().refreshes, 1);
        let status = execute(Commands::Status, &h.pipeline).await.unwrap();
        let status: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(status["state"], "valid");
    }

    #[tokio::test]
    async fn revoked_token_is_retried_once_after_refresh() {
        let h = harness(3600).await;
        execute(login_command(&h.dir, "pw"), &h.pipeline).await.unwrap();

        // Backend forgets the access token but still honours the refresh token.
        h.backend.lock().unwrap().accepted = Some("revoked".into());

        let out = execute(request_me(), &h.pipeline).await.unwrap();
        assert!(out.contains("E1001"));
        assert_eq!(h.backend.lock().unwrap().refreshes, 1);
    }

    #[tokio::test]
    async fn revoked_session_ends_after_failed_refresh() {
        let h = harness(3600).await;
        execute(login_command(&h.dir, "pw"), &h.pipeline).await.unwrap();
        {
            let mut backend = h.backend.lock().unwrap();
            backend.accepted = Some("revoked".into());
            backend.refresh_token = None;
        }

        let err = execute(request_me(), &h.pipeline).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<session_pipeline::Error>(),
            Some(session_pipeline::Error::RefreshFailed(_))
        ));
        assert!(h.pipeline.store().is_empty().await);
    }

    #[tokio::test]
    async fn status_reports_claims_and_reset_clears() {
        let h = harness(3600).await;
        execute(login_command(&h.dir, "pw"), &h.pipeline).await.unwrap();

        let status = execute(Commands::Status, &h.pipeline).await.unwrap();
        let status: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(status["state"], "valid");
        assert_eq!(status["subject"], "E1001");
        assert_eq!(status["roles"], serde_json::json!(["admin", "auditor"]));

        let out = execute(Commands::Reset, &h.pipeline).await.unwrap();
        assert_eq!(out, "session cleared");
        let status = execute(Commands::Status, &h.pipeline).await.unwrap();
        let status: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(status["state"], "absent");
        assert!(status["subject"].is_null());
    }

    #[tokio::test]
    async fn explicit_refresh_and_logout() {
        let h = harness(3600).await;
        execute(login_command(&h.dir, "pw"), &h.pipeline).await.unwrap();

        let out = execute(Commands::Refresh, &h.pipeline).await.unwrap();
        assert_eq!(out, "token refreshed (valid)");
        assert_eq!(h.backend.lock().unwrap().refreshes, 1);

        let out = execute(Commands::Logout, &h.pipeline).await.unwrap();
        assert_eq!(out, "logged out");
        assert!(h.backend.lock().unwrap().accepted.is_none());
        assert!(h.pipeline.store().is_empty().await);
    }

    #[tokio::test]
    async fn request_without_session_is_blocked() {
        let h = harness(3600).await;

        let err = execute(request_me(), &h.pipeline).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<session_pipeline::Error>(),
            Some(session_pipeline::Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn invalid_request_arguments_are_reported() {
        let h = harness(3600).await;

        let bad_json = Commands::Request {
            method: "POST".into(),
            target: "/api/user".into(),
            data: Some("{not json".into()),
            query: vec![],
            no_auth: false,
        };
        assert!(execute(bad_json, &h.pipeline).await.is_err());

        let bad_method = Commands::Request {
            method: "GE T".into(),
            target: "/api/user".into(),
            data: None,
            query: vec![],
            no_auth: false,
        };
        assert!(execute(bad_method, &h.pipeline).await.is_err());
    }

    #[test]
    fn query_pairs_parse() {
        assert_eq!(
            parse_query_pair("pageIndex=1").unwrap(),
            ("pageIndex".to_string(), "1".to_string())
        );
        assert_eq!(
            parse_query_pair("name=a=b").unwrap(),
            ("name".to_string(), "a=b".to_string())
        );
        assert!(parse_query_pair("novalue").is_err());
        assert!(parse_query_pair("=1").is_err());
    }

    #[test]
    fn cli_parses_request_subcommand() {
        let cli = Cli::parse_from([
            "sessionctl",
            "--config",
            "/etc/sessionctl.toml",
            "request",
            "GET",
            "/api/user",
            "--query",
            "pageIndex=1",
            "-q",
            "pageSize=20",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sessionctl.toml")));
        match cli.command {
            Commands::Request { method, target, query, no_auth, .. } => {
                assert_eq!(method, "GET");
                assert_eq!(target, "/api/user");
                assert_eq!(query.len(), 2);
                assert!(!no_auth);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
