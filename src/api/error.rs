//! HTTP error mapping

use crate::error::{AssessmentError, BatchError, ScoringError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// A single-record assessment failed
    Assessment(AssessmentError),

    /// A batch was rejected or cancelled
    Batch(BatchError),

    /// The request body could not be interpreted
    BadRequest(String),

    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Assessment(AssessmentError::Schema(_)) => StatusCode::BAD_REQUEST,
            ApiError::Assessment(AssessmentError::Scoring(ScoringError::Timeout { .. })) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Assessment(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Batch(BatchError::MalformedInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Batch(BatchError::Cancelled { .. }) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Assessment(e) => e.kind(),
            ApiError::Batch(BatchError::MalformedInput(_)) | ApiError::BadRequest(_) => {
                "malformed_input"
            }
            ApiError::Batch(BatchError::Cancelled { .. }) => "cancelled",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Assessment(e) => e.to_string(),
            ApiError::Batch(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };
        if let ApiError::Assessment(e) = &self {
            if status.is_server_error() {
                tracing::error!(kind = e.kind(), "Request failed: {}", message);
            }
        }

        let mut body = json!({
            "error": message,
            "kind": self.kind(),
            "status": status.as_u16(),
        });
        if let ApiError::Assessment(e) = &self {
            if let Some(feature) = e.feature() {
                body["feature"] = json!(feature);
            }
        }

        (status, Json(body)).into_response()
    }
}

impl From<AssessmentError> for ApiError {
    fn from(err: AssessmentError) -> Self {
        ApiError::Assessment(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        ApiError::Batch(err)
    }
}
