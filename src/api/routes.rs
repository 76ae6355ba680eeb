use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::OpenApi;

use crate::api::dto::*;
use crate::config::Config;
use crate::orchestrator::compression_engine::RecommendationReport;
use crate::orchestrator::strategies::CompressionError;
use crate::orchestrator::{CompressionOrchestrator, CompressionStatus, ImportanceReport, SummaryReport};
use crate::storage::metrics_store::CompressionStats;
use crate::storage::StoreError;

const DEFAULT_STATS_DAYS: i64 = 7;
const DEFAULT_PERFORMANCE_HOURS: i64 = 24;
const DEFAULT_ALERT_HOURS: i64 = 1;
const MAX_WINDOW_HOURS: i64 = 24 * 365;
const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub orchestrator: Arc<CompressionOrchestrator>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: status.as_u16(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    if let StoreError::InvalidWindow(_) = e {
        return error_response(StatusCode::BAD_REQUEST, e);
    }
    tracing::error!("Compression store error: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
}

/// Look-back window from a query param, defaulted and bounded to `1..=max`.
fn window(value: Option<i64>, default: i64, max: i64, name: &str) -> Result<i64, ApiError> {
    let value = value.unwrap_or(default);
    if (1..=max).contains(&value) {
        Ok(value)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("{} must be between 1 and {}, got {}", name, max, value),
        ))
    }
}

fn compression_error(e: CompressionError) -> ApiError {
    let status = match &e {
        CompressionError::Generation(_) | CompressionError::GenerationTimeout(_) => StatusCode::BAD_GATEWAY,
        CompressionError::EmptySummary | CompressionError::NoSummaryProduced(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CompressionError::EmptyOutput(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e)
}

#[utoipa::path(
    post,
    path = "/api/v1/compression/compress",
    request_body = CompressRequest,
    responses(
        (status = 200, description = "Compressed or unchanged messages with metadata", body = CompressResponse)
    )
)]
pub async fn compress(
    State(state): State<AppState>,
    Json(req): Json<CompressRequest>,
) -> Json<CompressResponse> {
    let (messages, metadata) = state.orchestrator.compress_context(req.into()).await;
    Json(CompressResponse { messages, metadata })
}

#[utoipa::path(
    post,
    path = "/api/v1/compression/recommendations",
    request_body = MessagesRequest,
    responses(
        (status = 200, description = "Trigger decision and per-strategy evaluation", body = serde_json::Value)
    )
)]
pub async fn recommendations(
    State(state): State<AppState>,
    Json(req): Json<MessagesRequest>,
) -> Json<RecommendationReport> {
    Json(
        state
            .orchestrator
            .recommendations(&req.messages, req.model_name, req.max_context_tokens)
            .await,
    )
}

#[utoipa::path(
    post,
    path = "/api/v1/compression/analyze",
    request_body = MessagesRequest,
    responses(
        (status = 200, description = "Per-message importance and conversation insights", body = serde_json::Value)
    )
)]
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<MessagesRequest>,
) -> Json<ImportanceReport> {
    Json(state.orchestrator.analyze_importance(&req.messages))
}

#[utoipa::path(
    post,
    path = "/api/v1/compression/summarize",
    request_body = MessagesRequest,
    responses(
        (status = 200, description = "Summary of the older messages", body = serde_json::Value),
        (status = 422, description = "No summary could be produced", body = ErrorResponse),
        (status = 502, description = "Generator backend failed", body = ErrorResponse)
    )
)]
pub async fn summarize(
    State(state): State<AppState>,
    Json(req): Json<MessagesRequest>,
) -> Result<Json<SummaryReport>, ApiError> {
    state
        .orchestrator
        .summarize_messages(req.messages, req.model_name)
        .await
        .map(Json)
        .map_err(compression_error)
}

#[utoipa::path(
    get,
    path = "/api/v1/compression/status",
    params(("conversation_id" = Option<String>, Query, description = "Restrict statistics to one conversation")),
    responses(
        (status = 200, description = "Configuration and recent statistics", body = serde_json::Value)
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Json<CompressionStatus> {
    Json(state.orchestrator.compression_status(params.conversation_id).await)
}

#[utoipa::path(
    get,
    path = "/api/v1/compression/stats",
    params(
        ("conversation_id" = Option<String>, Query, description = "Restrict to one conversation"),
        ("days" = Option<i64>, Query, description = "Look-back window in days, 1 to 365")
    ),
    responses(
        (status = 200, description = "Compression statistics", body = serde_json::Value),
        (status = 400, description = "Window out of range", body = ErrorResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<CompressionStats>, ApiError> {
    let days = window(params.days, DEFAULT_STATS_DAYS, MAX_WINDOW_DAYS, "days")?;
    state
        .orchestrator
        .compression_stats(params.conversation_id, days)
        .await
        .map(Json)
        .map_err(store_error)
}

#[utoipa::path(
    get,
    path = "/api/v1/compression/performance",
    params(
        ("strategy" = Option<String>, Query, description = "Also report this strategy alone"),
        ("hours" = Option<i64>, Query, description = "Look-back window in hours, 1 to 8760")
    ),
    responses(
        (status = 200, description = "Performance summary", body = serde_json::Value),
        (status = 400, description = "Window out of range", body = ErrorResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn performance(
    State(state): State<AppState>,
    Query(params): Query<StrategyParams>,
) -> Result<Json<PerformanceResponse>, ApiError> {
    let hours = window(params.hours, DEFAULT_PERFORMANCE_HOURS, MAX_WINDOW_HOURS, "hours")?;
    let monitor = state.orchestrator.monitor();

    let summary = monitor.performance_summary(hours).await.map_err(store_error)?;
    let strategy = match params.strategy {
        Some(name) => {
            let metrics = monitor.strategy_metrics(&name, hours).await.map_err(store_error)?;
            Some(StrategyPerformance { name, metrics })
        }
        None => None,
    };

    Ok(Json(PerformanceResponse { summary, strategy }))
}

#[utoipa::path(
    get,
    path = "/api/v1/compression/alerts",
    params(("hours" = Option<i64>, Query, description = "Look-back window in hours, 1 to 8760")),
    responses(
        (status = 200, description = "Active performance alerts", body = AlertsResponse),
        (status = 400, description = "Window out of range", body = ErrorResponse)
    )
)]
pub async fn alerts(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let period_hours = window(params.hours, DEFAULT_ALERT_HOURS, MAX_WINDOW_HOURS, "hours")?;
    let alerts = state
        .orchestrator
        .monitor()
        .check_performance_alerts(period_hours)
        .await;
    Ok(Json(AlertsResponse { period_hours, alerts }))
}

#[utoipa::path(
    get,
    path = "/api/v1/compression/optimizations",
    responses(
        (status = 200, description = "Tuning recommendations from the last day", body = OptimizationsResponse)
    )
)]
pub async fn optimizations(State(state): State<AppState>) -> Json<OptimizationsResponse> {
    let recommendations = state
        .orchestrator
        .monitor()
        .optimization_recommendations()
        .await;
    Json(OptimizationsResponse { recommendations })
}

#[utoipa::path(
    post,
    path = "/api/v1/compression/cache/cleanup",
    responses(
        (status = 200, description = "Expired cache entries removed", body = CleanupResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn cleanup_cache(State(state): State<AppState>) -> Result<Json<CleanupResponse>, ApiError> {
    let removed_entries = state.orchestrator.cleanup_cache().await.map_err(store_error)?;
    Ok(Json(CleanupResponse { removed_entries }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.config.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generator_url: config.ollama_url.clone(),
        compression_enabled: config.compression.enabled,
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        compress,
        recommendations,
        analyze,
        summarize,
        status,
        stats,
        performance,
        alerts,
        optimizations,
        cleanup_cache,
        health
    ),
    components(schemas(
        CompressRequest,
        MessagesRequest,
        CompressResponse,
        AlertsResponse,
        OptimizationsResponse,
        CleanupResponse,
        HealthResponse,
        ErrorResponse
    ))
)]
pub struct ApiDoc;

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/compression/compress", post(compress))
        .route("/api/v1/compression/recommendations", post(recommendations))
        .route("/api/v1/compression/analyze", post(analyze))
        .route("/api/v1/compression/summarize", post(summarize))
        .route("/api/v1/compression/status", get(status))
        .route("/api/v1/compression/stats", get(stats))
        .route("/api/v1/compression/performance", get(performance))
        .route("/api/v1/compression/alerts", get(alerts))
        .route("/api/v1/compression/optimizations", get(optimizations))
        .route("/api/v1/compression/cache/cleanup", post(cleanup_cache))
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi))
        .with_state(state)
}
