//! Request handlers

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::feature_schema::FeatureInfo;
use crate::metrics::MetricsSnapshot;
use crate::types::batch::BatchResponse;
use crate::types::prediction::SingleScoreResponse;
use crate::types::record::RawRecord;
use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
    timestamp: i64,
}

#[derive(Serialize)]
pub struct FeaturesResponse {
    features: Vec<FeatureInfo>,
}

#[derive(Serialize)]
pub struct TemplateResponse {
    columns: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    model: String,
    threshold: f64,
    baseline: f64,
    #[serde(flatten)]
    metrics: MetricsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.service.model_name().to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Score one company given as a JSON object of feature name to value
pub async fn predict_single(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<SingleScoreResponse>> {
    let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("request body must be a JSON object: {}", e)))?;

    let record = state
        .service
        .assess(Uuid::new_v4().to_string(), RawRecord::from(fields))
        .await?;

    Ok(Json(record.to_response()))
}

/// Audit a CSV portfolio
pub async fn predict_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<BatchResponse>> {
    let result = state.auditor.audit_csv(&body, &state.cancel).await?;
    Ok(Json(result.to_response()))
}

pub async fn features(State(state): State<AppState>) -> Json<FeaturesResponse> {
    Json(FeaturesResponse {
        features: state.service.schema().catalogue(),
    })
}

pub async fn template(State(state): State<AppState>) -> Json<TemplateResponse> {
    Json(TemplateResponse {
        columns: state.service.schema().feature_names().to_vec(),
    })
}

pub async fn template_csv(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let template = state.service.schema().csv_template()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"bankruptcy_template.csv\"",
            ),
        ],
        template,
    ))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let service = &state.service;
    Json(StatsResponse {
        model: service.model_name().to_string(),
        threshold: service.threshold(),
        baseline: service.baseline(),
        metrics: service.metrics().snapshot(),
    })
}
