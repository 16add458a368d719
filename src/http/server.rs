//! HTTP server setup and handlers.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (timeout, request ID, tracing)
//! - Serve `POST /authz`, `GET /health` and `GET /metrics`
//! - Answer Envoy HTTP check requests on every other path
//! - Stop accepting connections on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AuthzConfig;
use crate::engine::DecisionEngine;
use crate::http::request::{self, MakeRequestUuid};
use crate::http::response;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
}

/// HTTP front end of the authorization service.
pub struct HttpServer {
    router: Router,
    config: AuthzConfig,
}

impl HttpServer {
    pub fn new(config: AuthzConfig, engine: Arc<DecisionEngine>) -> Self {
        let router = build_router(engine, config.listener.request_timeout());
        Self { router, config }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            failure_mode = self.config.failure_mode.as_str(),
            mock_mode = self.config.verdict.mock_mode,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(engine: Arc<DecisionEngine>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/authz", post(authz_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(check_handler)
        .with_state(AppState { engine })
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Direct authorization endpoint.
async fn authz_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = request::extract_token(&headers) else {
        return response::missing_token();
    };

    let decision = state.engine.authorize(token).await;
    tracing::debug!(
        request_id = %request::request_id(&headers),
        status = %decision.status,
        "Served /authz"
    );
    response::authz(&decision)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.health())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.metrics())
}

/// Envoy HTTP ext_authz check. Envoy forwards the original method, path and headers.
async fn check_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request_id = request::request_id(&headers);
    let received = request::describe(&method, &headers, &uri);

    if method == Method::OPTIONS {
        tracing::debug!(request_id = %request_id, received = %received, "Check allowed (preflight)");
        return response::check_allowed(None, &received);
    }

    let Some(token) = request::extract_token(&headers) else {
        tracing::info!(request_id = %request_id, received = %received, "Check denied, no token");
        return response::check_missing_token(&received);
    };

    let decision = state.engine.authorize(token).await;
    if decision.allowed {
        tracing::debug!(request_id = %request_id, status = %decision.status, "Check allowed");
        response::check_allowed(Some(&decision), &received)
    } else {
        tracing::info!(request_id = %request_id, status = %decision.status, "Check denied");
        response::check_denied(&decision, state.engine.breaker_state(), &received)
    }
}
