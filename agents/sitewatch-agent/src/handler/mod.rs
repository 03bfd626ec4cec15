//! HTTP surface for the sitewatch agent
//!
//! Read-only status endpoints plus a manual cycle trigger, all sharing the
//! scheduler's `Monitor` so a triggered cycle never overlaps a scheduled one.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sitewatch_core::{CycleSummary, Incident, IncidentReport, Monitor, MonitorError};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::telemetry::SitewatchMetrics;

const DEFAULT_INCIDENT_LIMIT: usize = 50;
const DEFAULT_REPORT_DAYS: i64 = 7;

/// Application state
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub metrics: Arc<SitewatchMetrics>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, metrics: Arc<SitewatchMetrics>) -> Self {
        Self { monitor, metrics }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/incidents", get(list_incidents))
        .route("/api/v1/report", get(report))
        .route("/api/v1/cycle", post(trigger_cycle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        site_url: state.monitor.config().site_url.clone(),
        cycle_running: state.monitor.is_running(),
    })
}

/// Prometheus text exposition
async fn metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let body = state
        .metrics
        .encode_text()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "MetricsError", e, None))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Most recent incidents, newest last
async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IncidentsQuery>,
) -> Json<IncidentsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_INCIDENT_LIMIT);
    let incidents = state.monitor.incident_log().load_recent(limit);
    Json(IncidentsResponse {
        count: incidents.len(),
        incidents,
    })
}

async fn report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<IncidentReport>, (StatusCode, Json<ApiError>)> {
    let days = query.days.unwrap_or(DEFAULT_REPORT_DAYS);
    if days <= 0 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "InvalidInput",
            "days must be positive",
            None,
        ));
    }

    let incidents = state.monitor.incident_log().load_all();
    let history = state.monitor.history();
    Ok(Json(IncidentReport::generate(
        &incidents,
        &history,
        days,
        Utc::now(),
    )))
}

/// Run one cycle now and return its summary
async fn trigger_cycle(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CycleSummary>>, (StatusCode, Json<ApiError>)> {
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, "Manual cycle requested");

    let result = state.monitor.run_cycle().await;
    state.metrics.observe_cycle(&result);

    match result {
        Ok(summary) => Ok(Json(ApiResponse {
            success: !summary.has_incidents(),
            data: summary,
            request_id,
        })),
        Err(e @ MonitorError::CycleInProgress) => Err(api_error(
            StatusCode::CONFLICT,
            "CycleInProgress",
            e,
            Some(request_id),
        )),
        Err(e) => {
            tracing::error!(%request_id, error = %e, "Manual cycle failed");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                e,
                Some(request_id),
            ))
        }
    }
}

fn api_error(
    status: StatusCode,
    error: &str,
    message: impl ToString,
    request_id: Option<Uuid>,
) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message: message.to_string(),
            request_id,
        }),
    )
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub site_url: String,
    pub cycle_running: bool,
}

#[derive(Debug, Deserialize)]
pub struct IncidentsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncidentsResponse {
    pub count: usize,
    pub incidents: Vec<Incident>,
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub request_id: Uuid,
}

/// API error
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub request_id: Option<Uuid>,
}
