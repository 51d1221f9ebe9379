//! Configuration management for the risk pipeline

use crate::error::ConfigError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub explain: ExplainConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the model artifact JSON; empty uses the bundled model
    #[serde(default)]
    pub path: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            onnx_threads: default_onnx_threads(),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Probabilities at or above this are high-risk
    pub threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        // Below 0.5 to account for the low bankruptcy base rate
        Self { threshold: 0.40 }
    }
}

/// Attribution settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExplainConfig {
    /// Exact enumeration up to this many features, sampling above
    #[serde(default = "default_exact_max_features")]
    pub exact_max_features: usize,
    /// Permutations drawn when sampling
    #[serde(default = "default_permutations")]
    pub permutations: usize,
    /// Sampling seed
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Maximum |baseline + Σ impact − probability|
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_exact_max_features() -> usize {
    12
}

fn default_permutations() -> usize {
    256
}

fn default_seed() -> u64 {
    42
}

fn default_tolerance() -> f64 {
    1e-6
}

/// Exact enumeration is 2^n model calls; cap it.
pub const MAX_EXACT_FEATURES: usize = 20;

impl ExplainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exact_max_features > MAX_EXACT_FEATURES {
            return Err(ConfigError::InvalidSetting {
                key: "explain.exact_max_features".into(),
                reason: format!("must be at most {}", MAX_EXACT_FEATURES),
            });
        }
        if self.permutations == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "explain.permutations".into(),
                reason: "must be positive".into(),
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::InvalidSetting {
                key: "explain.tolerance".into(),
                reason: "must be positive and finite".into(),
            });
        }
        Ok(())
    }
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            exact_max_features: default_exact_max_features(),
            permutations: default_permutations(),
            seed: default_seed(),
            tolerance: default_tolerance(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent batch workers; 0 picks twice the available parallelism
    pub workers: usize,
    /// Per-record timeout in milliseconds
    pub timeout_ms: u64,
}

impl PipelineConfig {
    /// Worker count with the automatic default resolved
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(4)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout_ms: 2000,
        }
    }
}

/// Batch input configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Header names recognised as an identifier column (case-insensitive)
    pub identifier_columns: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            identifier_columns: vec![
                "id".to_string(),
                "company".to_string(),
                "company_id".to_string(),
                "name".to_string(),
            ],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `RISK__SECTION__KEY`
    /// environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("RISK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.detection.threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.pipeline.timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "pipeline.timeout_ms".into(),
                reason: "must be positive".into(),
            });
        }
        self.explain.validate()?;
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidSetting {
                key: "logging.format".into(),
                reason: format!("unknown format '{}'", self.logging.format),
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            detection: DetectionConfig::default(),
            explain: ExplainConfig::default(),
            pipeline: PipelineConfig::default(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
