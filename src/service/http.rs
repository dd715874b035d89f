//! HTTP surface
//!
//! JSON endpoints for the battle loop (next pair, submit, preview) plus
//! ranking, statistics, history, health and Prometheus metrics. The rating
//! core is synchronous, so handlers run it on the blocking pool.

use crate::error::{BattleError, ErrorKind, Result};
use crate::metrics::{encode_metrics, metrics_content_type};
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::{ItemId, Outcome};
use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// History entries returned when the caller gives no limit
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Body of `POST /duel` and `POST /duel/preview`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelRequest {
    pub left_id: ItemId,
    pub right_id: ItemId,
    /// `left`, `right`, `draw` or `skip`. Parsed by the handler so unknown
    /// values are reported as invalid outcomes.
    pub outcome: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Error response carrying the failure kind
pub struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self(error)
    }
}

/// HTTP status for each failure kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidOutcome => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InsufficientData => StatusCode::CONFLICT,
        ErrorKind::StoreFailure | ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::InvalidOutcome => "invalid_outcome",
        ErrorKind::InsufficientData => "insufficient_data",
        ErrorKind::StoreFailure => "store_failure",
        ErrorKind::Configuration => "configuration",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = BattleError::kind_of(&self.0);
        let status = status_for(kind);

        if status.is_server_error() {
            error!("Request failed: {:#}", self.0);
        }

        (
            status,
            Json(json!({
                "error": kind_label(kind),
                "message": format!("{:#}", self.0),
            })),
        )
            .into_response()
    }
}

/// Run a core operation off the async runtime and count the request
async fn run_blocking<T, F>(
    state: &Arc<AppState>,
    route: &'static str,
    operation: F,
) -> std::result::Result<Json<T>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T> + Send + 'static,
{
    let app = state.clone();
    let result = tokio::task::spawn_blocking(move || operation(&app))
        .await
        .context("Blocking task failed")
        .and_then(|inner| inner);

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(BattleError::kind_of(e)),
    };
    state.metrics().record_http_request(route, status.as_u16());

    result.map(Json).map_err(ApiError)
}

/// Build the router with every endpoint
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/match/next", get(next_match_handler))
        .route("/duel", post(duel_handler))
        .route("/duel/preview", post(preview_handler))
        .route("/ranking", get(ranking_handler))
        .route("/stats", get(stats_handler))
        .route("/history", get(history_handler))
        .with_state(state)
}

/// Root endpoint handler - shows service information
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": state.config().service.name,
        "version": crate::VERSION,
        "endpoints": [
            "GET /health",
            "GET /health/live",
            "GET /metrics",
            "GET /match/next",
            "POST /duel",
            "POST /duel/preview",
            "GET /ranking?limit=",
            "GET /stats",
            "GET /history?limit="
        ]
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    debug!("Health check requested");

    let app = state.clone();
    match tokio::task::spawn_blocking(move || HealthCheck::check(&app)).await {
        Ok(health) => {
            let status = match health.status {
                HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            };
            state.metrics().record_http_request("/health", status.as_u16());
            (status, Json(health)).into_response()
        }
        Err(e) => {
            error!("Health check task failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
                .into_response()
        }
    }
}

/// Liveness only: is the service accepting work, without touching the store
async fn liveness_handler(State(state): State<Arc<AppState>>) -> Response {
    let status = HealthCheck::liveness_check(&state);
    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    state.metrics().record_http_request("/health/live", code.as_u16());
    (code, Json(json!({ "status": status }))).into_response()
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    state.metrics().update_uptime(state.uptime());

    match encode_metrics(&state.metrics()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics_content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

async fn next_match_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run_blocking(&state, "/match/next", |app| app.next_match()).await
}

async fn duel_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DuelRequest>,
) -> impl IntoResponse {
    run_blocking(&state, "/duel", move |app| {
        let outcome: Outcome = request.outcome.parse()?;
        app.submit_duel(request.left_id, request.right_id, outcome)
    })
    .await
}

async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DuelRequest>,
) -> impl IntoResponse {
    run_blocking(&state, "/duel/preview", move |app| {
        let outcome: Outcome = request.outcome.parse()?;
        app.preview_duel(request.left_id, request.right_id, outcome)
    })
    .await
}

async fn ranking_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    run_blocking(&state, "/ranking", move |app| app.ranking(query.limit)).await
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run_blocking(&state, "/stats", |app| app.stats()).await
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    run_blocking(&state, "/history", move |app| app.history(limit)).await
}

/// HTTP server with broadcast-driven graceful shutdown
pub struct HttpServer {
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { state, shutdown_tx }
    }

    /// Serve until [`HttpServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = self
            .state
            .config()
            .bind_address()
            .parse()
            .context("Invalid HTTP server address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("HTTP server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping HTTP server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidOutcome), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorKind::InsufficientData), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::StoreFailure), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::Configuration), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_response_status() {
        let response = ApiError(BattleError::InsufficientData { available: 1 }.into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ApiError(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
