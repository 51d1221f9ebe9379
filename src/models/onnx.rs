//! ONNX Runtime backed risk model (`onnx` feature)

use crate::models::inference::RiskModel;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Classifier exported to ONNX with a `[1, n]` float input and a
/// probability tensor output (export with `zipmap=False`).
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    feature_count: usize,
}

impl OnnxModel {
    pub fn load(path: &Path, name: &str, feature_count: usize, threads: usize) -> Result<Self> {
        ort::init().commit()?;

        info!(model = %name, path = %path.display(), threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(model = %name, input = %input_name, output = %output_name, "ONNX model ready");

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            feature_count,
        })
    }

    /// Positive-class probability from a `[batch, classes]` or `[classes]` tensor
    fn positive_class(dims: &[i64], data: &[f32]) -> Option<f64> {
        let classes = *dims.last()?;
        match classes {
            c if c >= 2 => data.get(1).map(|&v| v as f64),
            1 => data.first().map(|&v| v as f64),
            _ => None,
        }
    }
}

impl RiskModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        let shape = vec![1_i64, features.len() as i64];
        let data: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs
            .get(&self.output_name)
            .with_context(|| format!("Output '{}' missing", self.output_name))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let prob = Self::positive_class(&dims, data)
            .with_context(|| format!("Unexpected output shape {:?}", dims))?;
        debug!(model = %self.name, prob, "Extracted probability");
        Ok(prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_class_from_two_class_tensor() {
        assert_eq!(OnnxModel::positive_class(&[1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(OnnxModel::positive_class(&[1, 1], &[0.5]), Some(0.5));
        assert_eq!(OnnxModel::positive_class(&[], &[]), None);
    }
}
