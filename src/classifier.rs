//! Threshold classification of risk probabilities

use crate::error::ConfigError;
use crate::types::prediction::ClassificationLabel;

/// Maps a probability to a status label against a configured cutoff.
///
/// The boundary is inclusive on the high-risk side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdClassifier {
    threshold: f64,
}

impl ThresholdClassifier {
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn classify(&self, probability: f64) -> ClassificationLabel {
        if probability >= self.threshold {
            ClassificationLabel::HighRisk
        } else {
            ClassificationLabel::Stable
        }
    }
}

/// One-shot classification with threshold validation
pub fn classify(probability: f64, threshold: f64) -> Result<ClassificationLabel, ConfigError> {
    Ok(ThresholdClassifier::new(threshold)?.classify(probability))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_around_threshold() {
        let classifier = ThresholdClassifier::new(0.4).unwrap();

        assert_eq!(classifier.classify(0.1), ClassificationLabel::Stable);
        assert_eq!(classifier.classify(0.39999), ClassificationLabel::Stable);
        assert_eq!(classifier.classify(0.4), ClassificationLabel::HighRisk);
        assert_eq!(classifier.classify(0.95), ClassificationLabel::HighRisk);
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(ThresholdClassifier::new(0.0).is_ok());
        assert!(ThresholdClassifier::new(1.0).is_ok());
        assert_eq!(
            ThresholdClassifier::new(1.2),
            Err(ConfigError::InvalidThreshold(1.2))
        );
        assert!(ThresholdClassifier::new(-0.01).is_err());
        assert!(ThresholdClassifier::new(f64::NAN).is_err());
    }

    #[test]
    fn test_extreme_thresholds() {
        assert_eq!(classify(0.0, 0.0).unwrap(), ClassificationLabel::HighRisk);
        assert_eq!(classify(0.999, 1.0).unwrap(), ClassificationLabel::Stable);
        assert_eq!(classify(1.0, 1.0).unwrap(), ClassificationLabel::HighRisk);
    }
}
