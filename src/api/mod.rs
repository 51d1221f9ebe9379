//! HTTP surface for the risk pipeline.
//!
//! ```text
//! POST /api/predict/single   JSON record   -> probability, label, impacts
//! POST /api/predict/batch    CSV body      -> audit results and summary
//! GET  /api/features                       -> feature catalogue
//! GET  /api/template[.csv]                 -> required columns
//! GET  /api/stats                          -> metrics snapshot
//! GET  /health
//! ```

pub mod error;
pub mod handlers;

use crate::batch::{BatchAuditor, BatchCancel};
use crate::service::AssessmentService;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};

/// Largest accepted request body (CSV uploads)
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: AssessmentService,
    pub auditor: BatchAuditor,
    /// Triggered on shutdown to stop scheduling batch rows
    pub cancel: BatchCancel,
}

impl AppState {
    pub fn new(service: AssessmentService, auditor: BatchAuditor) -> Self {
        Self {
            service,
            auditor,
            cancel: BatchCancel::new(),
        }
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/predict/single", post(handlers::predict_single))
        .route("/api/predict/batch", post(handlers::predict_batch))
        .route("/api/features", get(handlers::features))
        .route("/api/template", get(handlers::template))
        .route("/api/template.csv", get(handlers::template_csv))
        .route("/api/stats", get(handlers::stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
