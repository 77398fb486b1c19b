//! HTTP API: health probes, Prometheus metrics, model lifecycle and
//! prediction endpoints.

use ai_lib::error::PredictError;
use ai_lib::health::{ComponentStatus, HealthRegistry};
use ai_lib::models::ModelName;
use ai_lib::observability::ServiceMetrics;
use ai_lib::serve::{
    CreditAnalysisParams, InferenceService, LiquidityForecastParams, PredictionParams,
    PriceForecastParams, RecommendationParams,
};
use ai_lib::training::RetrainScheduler;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub scheduler: Arc<RetrainScheduler>,
    pub inference: Arc<InferenceService>,
}

/// Health check response - 200 while operational, 503 once unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Readiness check response - 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Per-model loaded state and last successful retrain.
async fn model_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.model_status().await)
}

/// Operator-triggered retrain, bypassing the schedule.
async fn force_retrain(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Response {
    let Some(name) = ModelName::parse(&model) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown model: {model}") })),
        )
            .into_response();
    };

    let success = state.scheduler.force_retrain(name).await;
    info!(model = %name, success = success, "Forced retrain requested via API");
    (
        StatusCode::OK,
        Json(json!({ "model": name, "success": success })),
    )
        .into_response()
}

fn prediction_response(
    result: Result<ai_lib::model::PredictionEnvelope, PredictError>,
) -> Response {
    match result {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(e) => {
            let status = match &e {
                PredictError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PredictError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                PredictError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn predict_price(
    State(state): State<Arc<AppState>>,
    Json(params): Json<PriceForecastParams>,
) -> Response {
    prediction_response(
        state
            .inference
            .serve_prediction(PredictionParams::Price(params))
            .await,
    )
}

async fn predict_liquidity(
    State(state): State<Arc<AppState>>,
    Json(params): Json<LiquidityForecastParams>,
) -> Response {
    prediction_response(
        state
            .inference
            .serve_prediction(PredictionParams::Liquidity(params))
            .await,
    )
}

async fn analyze_credit(
    State(state): State<Arc<AppState>>,
    Json(params): Json<CreditAnalysisParams>,
) -> Response {
    prediction_response(
        state
            .inference
            .serve_prediction(PredictionParams::Credit(params))
            .await,
    )
}

async fn recommend(
    State(state): State<Arc<AppState>>,
    Json(params): Json<RecommendationParams>,
) -> Response {
    prediction_response(
        state
            .inference
            .serve_prediction(PredictionParams::Recommendations(params))
            .await,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/models/status", get(model_status))
        .route("/v1/models/:model/retrain", post(force_retrain))
        .route("/v1/predictions/price", post(predict_price))
        .route("/v1/predictions/liquidity", post(predict_liquidity))
        .route("/v1/analysis/credit", post(analyze_credit))
        .route("/v1/recommendations", post(recommend))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{port}");
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
