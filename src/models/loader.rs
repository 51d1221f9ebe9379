//! Model artifact loader

use crate::error::ConfigError;
use crate::models::inference::RiskModel;
use crate::models::logistic::LogisticModel;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Artifact shipped with the crate, used when no model path is configured and in tests
pub const BUNDLED_MODEL: &str = include_str!("../../models/financial_risk_model.json");

/// One model input as declared by the artifact
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    /// Reference (training mean) value, the zero-point for attributions
    pub reference: f64,
    #[serde(default = "default_min")]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
}

fn default_min() -> f64 {
    0.0
}

fn default_max() -> f64 {
    1.0
}

/// Model parameters, tagged by backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSpec {
    /// Standardized logistic regression
    Logistic {
        scaler_mean: Vec<f64>,
        scaler_scale: Vec<f64>,
        coefficients: Vec<f64>,
        intercept: f64,
    },
    /// ONNX graph, path relative to the artifact file
    Onnx { path: String },
}

/// On-disk model description
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub features: Vec<FeatureSpec>,
    /// Declared expected probability at the reference profile
    #[serde(default)]
    pub baseline_probability: Option<f64>,
    pub model: ModelSpec,
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse model artifact")
    }

    /// Structural checks that do not need the model itself
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.features.is_empty() {
            return Err(ConfigError::Model("artifact declares no features".into()));
        }

        let mut seen = HashSet::new();
        for spec in &self.features {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::Model("feature with empty name".into()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::Model(format!(
                    "duplicate feature '{}'",
                    spec.name
                )));
            }
            if !spec.reference.is_finite() {
                return Err(ConfigError::Model(format!(
                    "feature '{}' has a non-finite reference value",
                    spec.name
                )));
            }
            if !(spec.min <= spec.max) {
                return Err(ConfigError::Model(format!(
                    "feature '{}' has min {} above max {}",
                    spec.name, spec.min, spec.max
                )));
            }
        }

        if let Some(baseline) = self.baseline_probability {
            if !(0.0..=1.0).contains(&baseline) {
                return Err(ConfigError::Model(format!(
                    "baseline probability {} is outside [0, 1]",
                    baseline
                )));
            }
        }

        Ok(())
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }
}

/// Model plus the metadata the engine needs around it
#[derive(Clone)]
pub struct LoadedModel {
    pub name: String,
    pub version: String,
    pub features: Vec<FeatureSpec>,
    pub declared_baseline: Option<f64>,
    pub model: Arc<dyn RiskModel>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("features", &self.features.len())
            .field("declared_baseline", &self.declared_baseline)
            .finish()
    }
}

impl LoadedModel {
    /// Reference values in canonical feature order
    pub fn reference(&self) -> Vec<f64> {
        self.features.iter().map(|f| f.reference).collect()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }
}

/// Loader for model artifacts
pub struct ModelLoader {
    /// Threads for the ONNX backend
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load an artifact file from disk
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading model artifact");

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {:?}", path))?;
        let artifact = ModelArtifact::from_json(&json)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        self.build(artifact, base_dir)
            .with_context(|| format!("Failed to load model from {:?}", path))
    }

    /// Load the artifact compiled into the crate
    pub fn load_bundled(&self) -> Result<LoadedModel> {
        let artifact = ModelArtifact::from_json(BUNDLED_MODEL)?;
        self.build(artifact, Path::new("."))
    }

    /// Turn a parsed artifact into a ready model
    pub fn build(&self, artifact: ModelArtifact, base_dir: &Path) -> Result<LoadedModel> {
        artifact.validate()?;

        let model: Arc<dyn RiskModel> = match &artifact.model {
            ModelSpec::Logistic {
                scaler_mean,
                scaler_scale,
                coefficients,
                intercept,
            } => Arc::new(LogisticModel::new(
                artifact.name.clone(),
                scaler_mean.clone(),
                scaler_scale.clone(),
                coefficients.clone(),
                *intercept,
            )?),
            ModelSpec::Onnx { path } => self.load_onnx(&artifact, &base_dir.join(path))?,
        };

        if model.feature_count() != artifact.features.len() {
            return Err(ConfigError::Model(format!(
                "model expects {} inputs but artifact declares {} features",
                model.feature_count(),
                artifact.features.len()
            ))
            .into());
        }

        info!(
            model = %artifact.name,
            version = %artifact.version,
            features = artifact.features.len(),
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: artifact.name,
            version: artifact.version,
            features: artifact.features,
            declared_baseline: artifact.baseline_probability,
            model,
        })
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, artifact: &ModelArtifact, path: &Path) -> Result<Arc<dyn RiskModel>> {
        let model = crate::models::onnx::OnnxModel::load(
            path,
            &artifact.name,
            artifact.features.len(),
            self.onnx_threads,
        )?;
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, artifact: &ModelArtifact, path: &Path) -> Result<Arc<dyn RiskModel>> {
        let _ = self.onnx_threads;
        Err(ConfigError::Model(format!(
            "model '{}' at {:?} needs the 'onnx' feature, which this build lacks",
            artifact.name, path
        ))
        .into())
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_artifact_loads() {
        let loaded = ModelLoader::new().load_bundled().unwrap();

        assert_eq!(loaded.features.len(), 5);
        assert_eq!(loaded.features[0].name, "Borrowing dependency");
        assert_eq!(loaded.model.feature_count(), 5);
        assert!(loaded.declared_baseline.is_some());
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let json = r#"{
            "name": "dup",
            "features": [
                { "name": "a", "reference": 0.5 },
                { "name": "a", "reference": 0.5 }
            ],
            "model": { "type": "logistic", "scaler_mean": [0, 0], "scaler_scale": [1, 1],
                       "coefficients": [1, 1], "intercept": 0 }
        }"#;
        let artifact = ModelArtifact::from_json(json).unwrap();
        let err = artifact.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate feature 'a'"));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let json = r#"{
            "name": "short",
            "features": [
                { "name": "a", "reference": 0.5 },
                { "name": "b", "reference": 0.5 }
            ],
            "model": { "type": "logistic", "scaler_mean": [0], "scaler_scale": [1],
                       "coefficients": [1], "intercept": 0 }
        }"#;
        let artifact = ModelArtifact::from_json(json).unwrap();
        assert!(ModelLoader::new().build(artifact, Path::new(".")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, BUNDLED_MODEL).unwrap();

        let loaded = ModelLoader::new().load_model(&path).unwrap();
        assert_eq!(loaded.name, "financial_risk_logreg");
        assert_eq!(loaded.reference().len(), 5);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = ModelLoader::new().load_model("/nonexistent/model.json");
        assert!(result.is_err());
    }
}
