//! Offline portfolio audit
//!
//! Runs the batch pipeline over a CSV file and prints the JSON audit.
//!
//! Usage: audit_csv <portfolio.csv> [config.toml]

use anyhow::{Context, Result};
use bankruptcy_risk_pipeline::{
    batch::{BatchAuditor, BatchCancel},
    config::AppConfig,
    metrics::AuditMetrics,
    models::ModelLoader,
    service::AssessmentService,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("audit_csv=info".parse()?)
                .add_directive("bankruptcy_risk_pipeline=warn".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let input = args
        .get(1)
        .context("usage: audit_csv <portfolio.csv> [config.toml]")?;
    let config = match args.get(2) {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::default(),
    };

    let loader = ModelLoader::with_threads(config.model.onnx_threads);
    let model = if config.model.path.is_empty() {
        loader.load_bundled()?
    } else {
        loader.load_model(&config.model.path)?
    };

    let metrics = Arc::new(AuditMetrics::new());
    let service = AssessmentService::new(&model, &config, metrics)?;
    let auditor = BatchAuditor::new(service, &config);

    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input))?;
    info!(file = %input, bytes = bytes.len(), "Auditing portfolio");

    let cancel = BatchCancel::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = auditor.audit_csv(&bytes, &cancel).await?;
    info!(
        submitted = result.summary.total_submitted,
        high_risk = result.summary.high_risk,
        failed = result.summary.failed,
        "Audit complete"
    );

    println!("{}", serde_json::to_string_pretty(&result.to_response())?);
    Ok(())
}
