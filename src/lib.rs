//! Bankruptcy Risk Pipeline Library
//!
//! Scores companies for bankruptcy risk from financial ratios, decomposes
//! each probability into additive per-feature contributions, and audits
//! whole portfolios concurrently with per-row failure isolation.

pub mod api;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod explain;
pub mod feature_schema;
pub mod metrics;
pub mod models;
pub mod service;
pub mod types;

pub use batch::{BatchAuditor, BatchCancel};
pub use classifier::ThresholdClassifier;
pub use config::AppConfig;
pub use error::{
    AssessmentError, BatchError, ConfigError, ExplainabilityError, SchemaError, ScoringError,
};
pub use explain::Explainer;
pub use feature_schema::FeatureSchema;
pub use models::inference::{RiskModel, RiskScorer};
pub use service::AssessmentService;
pub use types::{
    batch::BatchResult, prediction::ClassificationLabel, prediction::PredictionRecord,
    record::RawRecord,
};
