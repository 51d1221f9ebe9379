//! Additive feature attributions for a scored probability.
//!
//! Contributions are Shapley values of the model relative to the reference
//! profile: a feature outside a coalition takes its reference value. The
//! baseline is the model's probability at the reference profile, so
//! `baseline + Σ impact == probability` up to floating-point rounding.
//!
//! Small schemas are enumerated exactly over all 2^n coalitions. Larger ones
//! fall back to permutation sampling with a fixed seed; every permutation
//! walks from the reference to the input one feature at a time, so the
//! per-permutation contributions telescope and additivity is preserved.

use crate::config::ExplainConfig;
use crate::error::{ConfigError, ExplainabilityError};
use crate::models::inference::RiskScorer;
use crate::types::prediction::{AttributionSet, FeatureImpact, ScoreResult};
use crate::types::record::FeatureVector;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

/// Declared and computed baselines must agree this closely
const BASELINE_AGREEMENT: f64 = 1e-3;

/// How an attribution set was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionMethod {
    Exact,
    Sampled { permutations: usize },
}

/// Decomposes probabilities into per-feature contributions.
#[derive(Debug, Clone)]
pub struct Explainer {
    scorer: RiskScorer,
    reference: Vec<f64>,
    baseline: f64,
    settings: ExplainConfig,
}

impl Explainer {
    /// Build an explainer and fix its baseline by scoring the reference profile.
    ///
    /// Fails when the reference cannot be scored or disagrees with a declared
    /// baseline.
    pub fn new(
        scorer: RiskScorer,
        reference: Vec<f64>,
        declared_baseline: Option<f64>,
        settings: ExplainConfig,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        if reference.is_empty() {
            return Err(ConfigError::Model("reference profile is empty".into()));
        }
        let baseline = scorer
            .score_values(&reference)
            .map_err(|e| ConfigError::Model(format!("reference profile cannot be scored: {}", e)))?;

        if let Some(declared) = declared_baseline {
            if (declared - baseline).abs() > BASELINE_AGREEMENT {
                return Err(ConfigError::Model(format!(
                    "declared baseline {} does not match model output {} at the reference profile",
                    declared, baseline
                )));
            }
        }

        debug!(baseline, features = reference.len(), "Explainer ready");

        Ok(Self {
            scorer,
            reference,
            baseline,
            settings,
        })
    }

    /// Probability at the reference profile
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    pub fn tolerance(&self) -> f64 {
        self.settings.tolerance
    }

    pub fn method_for(&self, feature_count: usize) -> AttributionMethod {
        if feature_count <= self.settings.exact_max_features {
            AttributionMethod::Exact
        } else {
            AttributionMethod::Sampled {
                permutations: self.settings.permutations,
            }
        }
    }

    /// Attribute `score.probability - baseline` to the features of `vector`.
    ///
    /// Output is sorted by descending |impact|, ties in canonical order.
    pub fn explain(
        &self,
        vector: &FeatureVector,
        score: &ScoreResult,
    ) -> Result<AttributionSet, ExplainabilityError> {
        let x = vector.values();
        if x.is_empty() {
            return Err(ExplainabilityError::AttributionFailure(
                "feature vector is empty".into(),
            ));
        }
        if x.len() != self.reference.len() {
            return Err(ExplainabilityError::AttributionFailure(format!(
                "vector has {} features but the reference profile has {}",
                x.len(),
                self.reference.len()
            )));
        }

        let method = self.method_for(x.len());
        let mut contributions = match method {
            AttributionMethod::Exact => self.exact(x)?,
            AttributionMethod::Sampled { permutations } => self.sampled(x, permutations)?,
        };

        for (i, c) in contributions.iter_mut().enumerate() {
            if x[i] == self.reference[i] {
                *c = 0.0;
            } else if !c.is_finite() {
                return Err(ExplainabilityError::AttributionFailure(format!(
                    "non-finite contribution for '{}'",
                    vector.names()[i]
                )));
            }
        }

        let residual = self.baseline + contributions.iter().sum::<f64>() - score.probability;
        if residual.abs() > self.settings.tolerance {
            warn!(
                residual,
                tolerance = self.settings.tolerance,
                "Attributions do not reproduce the probability"
            );
            return Err(ExplainabilityError::AttributionFailure(format!(
                "attributions miss the probability by {:e} (tolerance {:e})",
                residual, self.settings.tolerance
            )));
        }

        let mut ranked: Vec<(usize, f64)> = contributions.into_iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| b.abs().total_cmp(&a.abs()).then(ia.cmp(ib)));

        let impacts = ranked
            .into_iter()
            .map(|(i, impact)| FeatureImpact {
                feature: vector.names()[i].clone(),
                value: x[i],
                impact,
            })
            .collect();

        debug!(?method, residual, "Attribution complete");

        Ok(AttributionSet {
            baseline: self.baseline,
            impacts,
        })
    }

    fn evaluate(&self, values: &[f64]) -> Result<f64, ExplainabilityError> {
        self.scorer.score_values(values).map_err(|e| {
            ExplainabilityError::AttributionFailure(format!("coalition could not be scored: {}", e))
        })
    }

    /// Exact Shapley values over every coalition.
    fn exact(&self, x: &[f64]) -> Result<Vec<f64>, ExplainabilityError> {
        let n = x.len();
        let coalitions = 1usize << n;

        let mut values = Vec::with_capacity(coalitions);
        let mut z = self.reference.clone();
        for mask in 0..coalitions {
            for i in 0..n {
                z[i] = if mask & (1 << i) != 0 {
                    x[i]
                } else {
                    self.reference[i]
                };
            }
            values.push(self.evaluate(&z)?);
        }

        let weights = shapley_weights(n);
        let mut phi = vec![0.0; n];
        for (i, p) in phi.iter_mut().enumerate() {
            if x[i] == self.reference[i] {
                continue;
            }
            let bit = 1usize << i;
            *p = (0..coalitions)
                .filter(|mask| mask & bit == 0)
                .map(|mask| weights[mask.count_ones() as usize] * (values[mask | bit] - values[mask]))
                .sum();
        }

        Ok(phi)
    }

    /// Permutation-sampled Shapley values with a fixed seed.
    fn sampled(&self, x: &[f64], permutations: usize) -> Result<Vec<f64>, ExplainabilityError> {
        let n = x.len();
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let mut order: Vec<usize> = (0..n).collect();
        let mut phi = vec![0.0; n];

        for _ in 0..permutations {
            order.shuffle(&mut rng);
            let mut z = self.reference.clone();
            let mut previous = self.baseline;
            for &j in &order {
                if x[j] == self.reference[j] {
                    continue;
                }
                z[j] = x[j];
                let current = self.evaluate(&z)?;
                phi[j] += current - previous;
                previous = current;
            }
        }

        let scale = permutations as f64;
        Ok(phi.into_iter().map(|p| p / scale).collect())
    }
}

/// `w[s] = s! (n-s-1)! / n!` for coalitions of size `s` not containing the feature.
fn shapley_weights(n: usize) -> Vec<f64> {
    // 1 / (n * C(n-1, s))
    let mut weights = Vec::with_capacity(n);
    let mut binom = 1.0_f64;
    for s in 0..n {
        if s > 0 {
            binom = binom * (n - s) as f64 / s as f64;
        }
        weights.push(1.0 / (n as f64 * binom));
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inference::RiskModel;
    use std::sync::Arc;

    /// p = clamp(0.1 + 0.2·x0 + 0.3·x0·x1 + 0.1·x2)
    struct Interacting;

    impl RiskModel for Interacting {
        fn name(&self) -> &str {
            "interacting"
        }
        fn feature_count(&self) -> usize {
            3
        }
        fn predict_proba(&self, x: &[f64]) -> anyhow::Result<f64> {
            Ok((0.1 + 0.2 * x[0] + 0.3 * x[0] * x[1] + 0.1 * x[2]).clamp(0.0, 1.0))
        }
    }

    fn schema_vector(values: Vec<f64>) -> FeatureVector {
        let names: Arc<[String]> = vec!["a".to_string(), "b".to_string(), "c".to_string()].into();
        FeatureVector::new(names, values, Vec::new())
    }

    fn explainer(settings: ExplainConfig) -> (RiskScorer, Explainer) {
        let scorer = RiskScorer::new(Arc::new(Interacting));
        let explainer = Explainer::new(scorer.clone(), vec![0.0, 0.0, 0.0], None, settings).unwrap();
        (scorer, explainer)
    }

    #[test]
    fn test_shapley_weights_sum_to_one_per_feature() {
        for n in 1..10 {
            let w = shapley_weights(n);
            // Σ_s C(n-1, s) · w[s] = 1
            let mut binom = 1.0;
            let mut total = 0.0;
            for (s, weight) in w.iter().enumerate() {
                if s > 0 {
                    binom = binom * (n - s) as f64 / s as f64;
                }
                total += binom * weight;
            }
            assert!((total - 1.0).abs() < 1e-12, "n={} total={}", n, total);
        }
    }

    #[test]
    fn test_exact_shapley_splits_interaction_evenly() {
        let (scorer, explainer) = explainer(ExplainConfig::default());
        let vector = schema_vector(vec![1.0, 1.0, 1.0]);
        let score = scorer.score(&vector).unwrap();

        let set = explainer.explain(&vector, &score).unwrap();

        // a: 0.2 + 0.15, b: 0.15, c: 0.1
        assert!((set.impact_of("a").unwrap() - 0.35).abs() < 1e-12);
        assert!((set.impact_of("b").unwrap() - 0.15).abs() < 1e-12);
        assert!((set.impact_of("c").unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(set.impacts[0].feature, "a");
        assert!((set.reconstructed() - score.probability).abs() < 1e-12);
    }

    #[test]
    fn test_reference_valued_feature_is_exactly_zero() {
        let (scorer, explainer) = explainer(ExplainConfig::default());
        let vector = schema_vector(vec![0.7, 0.0, 0.4]);
        let score = scorer.score(&vector).unwrap();

        let set = explainer.explain(&vector, &score).unwrap();
        assert_eq!(set.impact_of("b"), Some(0.0));
    }

    #[test]
    fn test_sampled_attributions_are_additive_and_deterministic() {
        let settings = ExplainConfig {
            exact_max_features: 2,
            permutations: 64,
            ..ExplainConfig::default()
        };
        let (scorer, explainer) = explainer(settings);
        assert_eq!(
            explainer.method_for(3),
            AttributionMethod::Sampled { permutations: 64 }
        );

        let vector = schema_vector(vec![0.9, 0.0, 0.3]);
        let score = scorer.score(&vector).unwrap();

        let first = explainer.explain(&vector, &score).unwrap();
        let second = explainer.explain(&vector, &score).unwrap();

        assert_eq!(first, second);
        assert!((first.reconstructed() - score.probability).abs() < 1e-9);
        assert_eq!(first.impact_of("b"), Some(0.0));
    }

    #[test]
    fn test_mismatched_score_is_attribution_failure() {
        let (scorer, explainer) = explainer(ExplainConfig::default());
        let vector = schema_vector(vec![1.0, 1.0, 1.0]);
        let mut score = scorer.score(&vector).unwrap();
        score.probability -= 0.2;

        let err = explainer.explain(&vector, &score).unwrap_err();
        assert!(matches!(err, ExplainabilityError::AttributionFailure(_)));
    }

    #[test]
    fn test_declared_baseline_must_match() {
        let scorer = RiskScorer::new(Arc::new(Interacting));
        let result = Explainer::new(scorer, vec![0.0; 3], Some(0.5), ExplainConfig::default());
        assert!(matches!(result, Err(ConfigError::Model(_))));
    }
}
