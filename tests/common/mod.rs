//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use captcha_authz::cache::MemoryStore;
use captcha_authz::clock::ManualClock;
use captcha_authz::config::AuthzConfig;
use captcha_authz::engine::{DecisionEngine, FailureMode};
use captcha_authz::http::HttpServer;
use captcha_authz::lifecycle::Shutdown;
use captcha_authz::verdict::{Verdict, VerdictClient, VerdictError};

type Script = dyn Fn(&str) -> Result<Verdict, VerdictError> + Send + Sync;

/// Verdict client driven by a closure, counting every call.
pub struct ScriptedClient {
    script: Box<Script>,
    calls: AtomicUsize,
    delay: Duration,
    gate: Option<Arc<Notify>>,
}

impl ScriptedClient {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str) -> Result<Verdict, VerdictError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            gate: None,
        }
    }

    /// Accepts every token with score 0.9.
    pub fn accepting() -> Self {
        Self::new(|_| Ok(Verdict::accepted(Some(0.9), Some("authz".into()))))
    }

    /// Fails every call with a transport error.
    pub fn failing() -> Self {
        Self::new(|_| Err(VerdictError::Transport("connection refused".into())))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Block every call until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerdictClient for ScriptedClient {
    async fn validate(&self, token: &str) -> Result<Verdict, VerdictError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(token)
    }
}

/// Defaults with the given failure mode, breaker threshold 5 and recovery 60s.
pub fn test_config(failure_mode: FailureMode) -> AuthzConfig {
    let mut config = AuthzConfig::default();
    config.failure_mode = failure_mode;
    config.verdict.mock_mode = true;
    config.verdict.timeout_secs = 1;
    config.breaker.failure_threshold = 5;
    config.breaker.recovery_secs = 60;
    config.breaker.half_open_max_requests = 1;
    config.observability.metrics_enabled = false;
    config
}

/// Engine over an in-memory store and a manual clock.
pub fn engine_with(
    config: &AuthzConfig,
    client: Arc<ScriptedClient>,
    clock: &ManualClock,
) -> Arc<DecisionEngine> {
    Arc::new(DecisionEngine::new(
        config,
        client,
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
    ))
}

/// Serve `engine` on an ephemeral port. Returns its address.
pub async fn start_service(
    config: AuthzConfig,
    engine: Arc<DecisionEngine>,
    shutdown: &Shutdown,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, engine);
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    addr
}

/// Fake assessments API answering every POST with `status` and `body`.
pub async fn start_assessment_api(status: u16, body: serde_json::Value) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status = StatusCode::from_u16(status).unwrap();

    let app = Router::new().route(
        "/v1/projects/{project}/assessments",
        post(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
