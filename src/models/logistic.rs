//! Standardized logistic-regression risk model

use crate::error::ConfigError;
use crate::models::inference::RiskModel;
use anyhow::Result;

/// The sigmoid is 0 or 1 in f64 well before this
const MAX_LOG_ODDS: f64 = 1e3;

/// Logistic regression over standardized inputs: `σ(b + Σ wᵢ (xᵢ - μᵢ) / sᵢ)`.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    name: String,
    scaler_mean: Vec<f64>,
    scaler_scale: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticModel {
    pub fn new(
        name: String,
        scaler_mean: Vec<f64>,
        scaler_scale: Vec<f64>,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, ConfigError> {
        let n = coefficients.len();
        if n == 0 {
            return Err(ConfigError::Model("logistic model has no coefficients".into()));
        }
        if scaler_mean.len() != n || scaler_scale.len() != n {
            return Err(ConfigError::Model(format!(
                "scaler has {} means and {} scales for {} coefficients",
                scaler_mean.len(),
                scaler_scale.len(),
                n
            )));
        }
        if let Some(i) = scaler_scale.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(ConfigError::Model(format!(
                "scaler scale at index {} must be positive and finite",
                i
            )));
        }
        let all_finite = scaler_mean
            .iter()
            .chain(coefficients.iter())
            .chain(std::iter::once(&intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ConfigError::Model(
                "logistic model parameters must be finite".into(),
            ));
        }

        Ok(Self {
            name,
            scaler_mean,
            scaler_scale,
            coefficients,
            intercept,
        })
    }

    /// Linear predictor (log-odds), saturated to `±MAX_LOG_ODDS`.
    ///
    /// Each term is saturated on its own so that huge inputs of opposite
    /// sign cannot meet as `inf - inf`.
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(&self.scaler_mean)
            .zip(&self.scaler_scale)
            .zip(features)
            .filter(|(((w, _), _), _)| **w != 0.0)
            .fold(self.intercept, |acc, (((w, mu), s), x)| {
                let term = (w * ((x - mu) / s)).clamp(-MAX_LOG_ODDS, MAX_LOG_ODDS);
                acc + term
            })
            .clamp(-MAX_LOG_ODDS, MAX_LOG_ODDS)
    }
}

/// Numerically stable logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl RiskModel for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_count(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            anyhow::bail!(
                "expected {} features, got {}",
                self.coefficients.len(),
                features.len()
            );
        }
        Ok(sigmoid(self.decision_function(features)))
    }
}
