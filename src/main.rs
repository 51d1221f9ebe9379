//! Bankruptcy Risk Pipeline - Main Entry Point
//!
//! Loads the model artifact, wires the assessment service and batch auditor,
//! and serves the HTTP API until interrupted.

use anyhow::{Context, Result};
use bankruptcy_risk_pipeline::{
    api::{create_router, AppState},
    batch::BatchAuditor,
    config::{AppConfig, LoggingConfig},
    metrics::{AuditMetrics, MetricsReporter},
    models::ModelLoader,
    service::AssessmentService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first so the log level can come from it
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/config.toml"));
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_logging(&config.logging)?;

    info!("Starting Bankruptcy Risk Pipeline");
    info!(
        "Detection threshold: {:.2}, workers: {}, timeout: {} ms",
        config.detection.threshold,
        config.pipeline.effective_workers(),
        config.pipeline.timeout_ms
    );

    // Load the model artifact
    let loader = ModelLoader::with_threads(config.model.onnx_threads);
    let model = if config.model.path.is_empty() {
        loader.load_bundled()?
    } else {
        loader.load_model(&config.model.path)?
    };
    info!(
        "Model '{}' v{} loaded ({} features)",
        model.name,
        model.version,
        model.features.len()
    );

    // Initialize metrics and components
    let metrics = Arc::new(AuditMetrics::new());
    let service = AssessmentService::new(&model, &config, metrics.clone())?;
    info!(baseline = service.baseline(), "Assessment service ready");

    let auditor = BatchAuditor::new(service.clone(), &config);
    let state = AppState::new(service, auditor);
    let cancel = state.cancel.clone();

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let app = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, cancelling in-flight batches");
            }
            cancel.cancel();
        })
        .await
        .context("Server error")?;

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "bankruptcy_risk_pipeline={},tower_http={}",
            logging.level, logging.level
        ))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
