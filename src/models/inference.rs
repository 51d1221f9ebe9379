//! Risk scoring over an injected, pre-trained model

use crate::error::ScoringError;
use crate::types::prediction::ScoreResult;
use crate::types::record::FeatureVector;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error};

/// A pre-trained classifier: numeric vector in, high-risk probability out.
///
/// Implementations must be pure: the same input always yields the same output.
pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;

    /// Number of inputs, in canonical feature order
    fn feature_count(&self) -> usize;

    /// Probability of the high-risk class
    fn predict_proba(&self, features: &[f64]) -> Result<f64>;
}

/// Guards a `RiskModel` so that every probability it hands out is in [0, 1].
#[derive(Clone)]
pub struct RiskScorer {
    model: Arc<dyn RiskModel>,
}

impl RiskScorer {
    pub fn new(model: Arc<dyn RiskModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn feature_count(&self) -> usize {
        self.model.feature_count()
    }

    /// Score a validated feature vector
    pub fn score(&self, vector: &FeatureVector) -> Result<ScoreResult, ScoringError> {
        let probability = self.score_values(vector.values())?;
        debug!(model = %self.model.name(), probability, "Scored feature vector");
        Ok(ScoreResult { probability })
    }

    /// Score a raw value slice in canonical order
    pub fn score_values(&self, values: &[f64]) -> Result<f64, ScoringError> {
        if values.len() != self.model.feature_count() {
            return Err(ScoringError::ModelFailure(format!(
                "dimension mismatch: model '{}' expects {} features, got {}",
                self.model.name(),
                self.model.feature_count(),
                values.len()
            )));
        }

        let probability = self.model.predict_proba(values).map_err(|e| {
            error!(model = %self.model.name(), error = %e, "Model inference failed");
            ScoringError::ModelFailure(e.to_string())
        })?;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::ModelFailure(format!(
                "model '{}' returned {} which is not a probability",
                self.model.name(),
                probability
            )));
        }

        Ok(probability)
    }
}

impl std::fmt::Debug for RiskScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskScorer")
            .field("model", &self.model.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f64);

    impl RiskModel for Constant {
        fn name(&self) -> &str {
            "constant"
        }
        fn feature_count(&self) -> usize {
            2
        }
        fn predict_proba(&self, _features: &[f64]) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl RiskModel for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn feature_count(&self) -> usize {
            2
        }
        fn predict_proba(&self, _features: &[f64]) -> Result<f64> {
            anyhow::bail!("session poisoned")
        }
    }

    #[test]
    fn test_score_values_passes_probability_through() {
        let scorer = RiskScorer::new(Arc::new(Constant(0.3)));
        assert_eq!(scorer.score_values(&[0.1, 0.2]).unwrap(), 0.3);
    }

    #[test]
    fn test_dimension_mismatch_is_model_failure() {
        let scorer = RiskScorer::new(Arc::new(Constant(0.3)));
        let err = scorer.score_values(&[0.1]).unwrap_err();
        assert!(matches!(err, ScoringError::ModelFailure(msg) if msg.contains("dimension mismatch")));
    }

    #[test]
    fn test_out_of_range_output_is_model_failure() {
        for bad in [1.5, -0.1, f64::NAN] {
            let scorer = RiskScorer::new(Arc::new(Constant(bad)));
            assert!(matches!(
                scorer.score_values(&[0.1, 0.2]),
                Err(ScoringError::ModelFailure(_))
            ));
        }
    }

    #[test]
    fn test_model_error_is_model_failure() {
        let scorer = RiskScorer::new(Arc::new(Failing));
        let err = scorer.score_values(&[0.1, 0.2]).unwrap_err();
        assert_eq!(err, ScoringError::ModelFailure("session poisoned".into()));
    }
}
