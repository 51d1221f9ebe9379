//! Prediction data structures

use crate::types::record::{FeatureVector, RangeWarning};
use serde::{Deserialize, Serialize};

/// Binary risk status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationLabel {
    #[serde(rename = "HIGH RISK")]
    HighRisk,
    #[serde(rename = "Stable")]
    Stable,
}

impl ClassificationLabel {
    pub fn is_high_risk(self) -> bool {
        matches!(self, ClassificationLabel::HighRisk)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClassificationLabel::HighRisk => "HIGH RISK",
            ClassificationLabel::Stable => "Stable",
        }
    }
}

impl std::fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model output for one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreResult {
    /// Probability (0.0 - 1.0) that the company is high-risk
    pub probability: f64,
}

/// One feature's signed contribution to `probability - baseline`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImpact {
    pub feature: String,
    pub value: f64,
    pub impact: f64,
}

/// Additive decomposition of a probability.
///
/// Sorted by descending |impact|, ties in canonical feature order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionSet {
    pub baseline: f64,
    pub impacts: Vec<FeatureImpact>,
}

impl AttributionSet {
    /// Sum of all contributions
    pub fn total_impact(&self) -> f64 {
        self.impacts.iter().map(|i| i.impact).sum()
    }

    /// `baseline + Σ impact`, which should reproduce the probability
    pub fn reconstructed(&self) -> f64 {
        self.baseline + self.total_impact()
    }

    pub fn impact_of(&self, feature: &str) -> Option<f64> {
        self.impacts
            .iter()
            .find(|i| i.feature == feature)
            .map(|i| i.impact)
    }

    pub fn len(&self) -> usize {
        self.impacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impacts.is_empty()
    }
}

/// Everything the engine knows about one assessed company
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    /// Request id (single mode) or row index (batch mode)
    pub id: String,
    /// External identifier, e.g. a company name column
    pub identifier: Option<String>,
    pub features: FeatureVector,
    pub score: ScoreResult,
    pub attribution: AttributionSet,
    pub label: ClassificationLabel,
    pub threshold: f64,
}

impl PredictionRecord {
    pub fn probability(&self) -> f64 {
        self.score.probability
    }

    pub fn warnings(&self) -> &[RangeWarning] {
        self.features.warnings()
    }

    /// Convert to the single-scoring response body
    pub fn to_response(&self) -> SingleScoreResponse {
        SingleScoreResponse {
            probability: self.score.probability,
            is_high_risk: self.label.is_high_risk(),
            threshold: self.threshold,
            baseline: self.attribution.baseline,
            feature_impacts: self.attribution.impacts.clone(),
            warnings: self.warnings().iter().map(ToString::to_string).collect(),
        }
    }
}

/// Response body for single-record scoring
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleScoreResponse {
    pub probability: f64,
    pub is_high_risk: bool,
    pub threshold: f64,
    pub baseline: f64,
    pub feature_impacts: Vec<FeatureImpact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_wire_names() {
        assert_eq!(
            serde_json::to_string(&ClassificationLabel::HighRisk).unwrap(),
            r#""HIGH RISK""#
        );
        assert_eq!(
            serde_json::to_string(&ClassificationLabel::Stable).unwrap(),
            r#""Stable""#
        );
        let parsed: ClassificationLabel = serde_json::from_str(r#""HIGH RISK""#).unwrap();
        assert!(parsed.is_high_risk());
    }

    #[test]
    fn test_attribution_reconstruction() {
        let set = AttributionSet {
            baseline: 0.25,
            impacts: vec![
                FeatureImpact {
                    feature: "a".into(),
                    value: 0.9,
                    impact: 0.5,
                },
                FeatureImpact {
                    feature: "b".into(),
                    value: 0.1,
                    impact: -0.125,
                },
            ],
        };

        assert_eq!(set.total_impact(), 0.375);
        assert_eq!(set.reconstructed(), 0.625);
        assert_eq!(set.impact_of("b"), Some(-0.125));
    }
}
