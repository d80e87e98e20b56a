use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::core::AlertRecord;
use crate::core::state::PipelineState;
use crate::queue::RecordQueue;

/// Alert filter applied when the caller does not supply one.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Read-only view handed to the query handlers. Snapshots of the caches
/// keep requests fast and independent of the pipeline loops.
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<PipelineState>,
    pub queue: Arc<dyn RecordQueue>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/alerts", get(get_alerts))
        .route("/logs", get(get_logs))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the query API; blocks until the server exits.
pub async fn serve(addr: SocketAddr, state: ApiState) {
    tracing::info!("Query API listening on {addr}");
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await
        .expect("query API server failed");
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub threshold: f64,
    pub alerts: Vec<AlertRecord>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enqueued_total: u64,
    pub processed_total: u64,
    pub cached_alerts: usize,
    /// `null` when the queue store is unreachable.
    pub queue_depth: Option<usize>,
}

/// Client-visible validation error.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let threshold = query.threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError {
            error: format!("threshold must be within [0.0, 1.0], got {threshold}"),
        });
    }

    let alerts = state
        .pipeline
        .alerts
        .snapshot()
        .into_iter()
        .filter(|alert| alert.risk_score >= threshold)
        .collect();
    Ok(Json(AlertsResponse { threshold, alerts }))
}

async fn get_logs(State(state): State<ApiState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.pipeline.logs.snapshot(),
    })
}

async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let queue_depth = state.queue.depth().await.ok();
    Json(StatusResponse {
        enqueued_total: state.pipeline.enqueued(),
        processed_total: state.pipeline.processed(),
        cached_alerts: state.pipeline.alerts.len(),
        queue_depth,
    })
}
