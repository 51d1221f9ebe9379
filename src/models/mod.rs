//! Model loading and inference

pub mod inference;
pub mod loader;
pub mod logistic;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use inference::{RiskModel, RiskScorer};
pub use loader::{FeatureSpec, LoadedModel, ModelArtifact, ModelLoader};
pub use logistic::LogisticModel;
