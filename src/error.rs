//! Error taxonomy for the risk pipeline.
//!
//! Per-record errors (`SchemaError`, `ScoringError`, `ExplainabilityError`)
//! are wrapped by `AssessmentError` and never abort a batch. `BatchError`
//! rejects a whole batch before any row runs. `ConfigError` is fatal at startup.

use thiserror::Error;

/// Record validation failures. Client-correctable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("missing required feature '{feature}'")]
    MissingFeature { feature: String },

    #[error("feature '{feature}' has invalid value '{value}': expected a finite number")]
    InvalidValue { feature: String, value: String },

    #[error("row could not be read: {reason}")]
    MalformedRow { reason: String },
}

/// Failures of the underlying model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("model failure: {0}")]
    ModelFailure(String),

    #[error("scoring timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Failures while decomposing a probability into feature contributions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExplainabilityError {
    #[error("attribution failure: {0}")]
    AttributionFailure(String),
}

/// Invalid configuration or model artifact. Raised at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("invalid model artifact: {0}")]
    Model(String),
}

/// Whole-batch failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("malformed batch input: {0}")]
    MalformedInput(String),

    #[error("batch cancelled after {completed} of {total} rows")]
    Cancelled { completed: usize, total: usize },
}

/// Any failure of a single-record assessment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssessmentError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Explainability(#[from] ExplainabilityError),
}

impl AssessmentError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AssessmentError::Schema(SchemaError::MissingFeature { .. }) => "missing_feature",
            AssessmentError::Schema(SchemaError::InvalidValue { .. }) => "invalid_value",
            AssessmentError::Schema(SchemaError::MalformedRow { .. }) => "malformed_row",
            AssessmentError::Scoring(ScoringError::ModelFailure(_)) => "model_failure",
            AssessmentError::Scoring(ScoringError::Timeout { .. }) => "timeout",
            AssessmentError::Explainability(_) => "attribution_failure",
        }
    }

    /// Offending feature name, when the error concerns one.
    pub fn feature(&self) -> Option<&str> {
        match self {
            AssessmentError::Schema(SchemaError::MissingFeature { feature })
            | AssessmentError::Schema(SchemaError::InvalidValue { feature, .. }) => {
                Some(feature.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assessment_error_kind_and_feature() {
        let err: AssessmentError = SchemaError::MissingFeature {
            feature: "Net worth/Assets".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "missing_feature");
        assert_eq!(err.feature(), Some("Net worth/Assets"));
        assert_eq!(err.to_string(), "missing required feature 'Net worth/Assets'");

        let err: AssessmentError = ScoringError::Timeout { timeout_ms: 250 }.into();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.feature(), None);
    }
}
