//! Type definitions for the risk pipeline

pub mod batch;
pub mod prediction;
pub mod record;

pub use batch::{BatchRecord, BatchResponse, BatchResult, RowFailure, Summary};
pub use prediction::{
    AttributionSet, ClassificationLabel, FeatureImpact, PredictionRecord, ScoreResult,
    SingleScoreResponse,
};
pub use record::{FeatureVector, RangeWarning, RawRecord, RawValue};
