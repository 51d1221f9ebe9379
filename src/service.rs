//! Single-record assessment: schema → scorer → explainer → classifier.

use crate::classifier::ThresholdClassifier;
use crate::config::AppConfig;
use crate::error::{AssessmentError, ConfigError, ScoringError};
use crate::explain::Explainer;
use crate::feature_schema::FeatureSchema;
use crate::metrics::AuditMetrics;
use crate::models::inference::RiskScorer;
use crate::models::loader::LoadedModel;
use crate::types::prediction::PredictionRecord;
use crate::types::record::RawRecord;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error};

/// Who gets to record a record's outcome: the worker or the timeout
const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Stateless assessment service. Cheap to clone; clones share the model.
#[derive(Clone)]
pub struct AssessmentService {
    inner: Arc<Inner>,
}

struct Inner {
    schema: FeatureSchema,
    scorer: RiskScorer,
    explainer: Explainer,
    classifier: ThresholdClassifier,
    timeout: Duration,
    metrics: Arc<AuditMetrics>,
}

impl AssessmentService {
    /// Wire the pipeline for a loaded model
    pub fn new(
        model: &LoadedModel,
        config: &AppConfig,
        metrics: Arc<AuditMetrics>,
    ) -> Result<Self, ConfigError> {
        let schema = FeatureSchema::from_model(model);
        let scorer = RiskScorer::new(model.model.clone());
        let explainer = Explainer::new(
            scorer.clone(),
            model.reference(),
            model.declared_baseline,
            config.explain.clone(),
        )?;
        let classifier = ThresholdClassifier::new(config.detection.threshold)?;

        Ok(Self::from_parts(
            schema,
            scorer,
            explainer,
            classifier,
            config.pipeline.timeout(),
            metrics,
        ))
    }

    pub fn from_parts(
        schema: FeatureSchema,
        scorer: RiskScorer,
        explainer: Explainer,
        classifier: ThresholdClassifier,
        timeout: Duration,
        metrics: Arc<AuditMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                schema,
                scorer,
                explainer,
                classifier,
                timeout,
                metrics,
            }),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.inner.schema
    }

    pub fn threshold(&self) -> f64 {
        self.inner.classifier.threshold()
    }

    pub fn baseline(&self) -> f64 {
        self.inner.explainer.baseline()
    }

    pub fn model_name(&self) -> &str {
        self.inner.scorer.model_name()
    }

    pub fn metrics(&self) -> &Arc<AuditMetrics> {
        &self.inner.metrics
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Run the full pipeline on the calling thread.
    ///
    /// Either every stage succeeds and a complete record is returned, or the
    /// first failing stage's error is.
    pub fn assess_blocking(
        &self,
        id: &str,
        raw: &RawRecord,
    ) -> Result<PredictionRecord, AssessmentError> {
        let start = Instant::now();
        let result = self.run_stages(id, raw);
        self.record_outcome(id, &result, start.elapsed());
        result
    }

    fn run_stages(&self, id: &str, raw: &RawRecord) -> Result<PredictionRecord, AssessmentError> {
        let inner = &self.inner;
        let features = inner.schema.validate(raw)?;
        let score = inner.scorer.score(&features)?;
        let attribution = inner.explainer.explain(&features, &score)?;
        let label = inner.classifier.classify(score.probability);

        Ok(PredictionRecord {
            id: id.to_string(),
            identifier: raw.identifier().map(str::to_string),
            features,
            score,
            attribution,
            label,
            threshold: inner.classifier.threshold(),
        })
    }

    fn record_outcome(
        &self,
        id: &str,
        result: &Result<PredictionRecord, AssessmentError>,
        elapsed: Duration,
    ) {
        match result {
            Ok(record) => {
                self.inner.metrics.record_assessment(
                    elapsed,
                    record.probability(),
                    record.label.is_high_risk(),
                );
                debug!(
                    id = %id,
                    probability = record.probability(),
                    label = %record.label,
                    processing_time_us = elapsed.as_micros() as u64,
                    "Record assessed"
                );
            }
            Err(e) => {
                self.inner.metrics.record_failure(e.kind());
                match e {
                    AssessmentError::Schema(_) => {
                        debug!(id = %id, error = %e, "Record rejected by schema")
                    }
                    _ => error!(id = %id, error = %e, "Assessment failed"),
                }
            }
        }
    }

    /// Run the pipeline on the blocking pool, bounded by the configured timeout.
    pub async fn assess(
        &self,
        id: String,
        raw: RawRecord,
    ) -> Result<PredictionRecord, AssessmentError> {
        self.assess_with_permit(id, raw, None).await
    }

    /// Like `assess`, holding `permit` until the blocking work itself ends.
    ///
    /// A timed-out record keeps computing in the background; the permit stays
    /// taken until it stops, and only one of the timeout and the late result
    /// is counted in the metrics.
    pub async fn assess_with_permit(
        &self,
        id: String,
        raw: RawRecord,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<PredictionRecord, AssessmentError> {
        let service = self.clone();
        let state = Arc::new(AtomicU8::new(RUNNING));
        let task_state = state.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let start = Instant::now();
            let result = service.run_stages(&id, &raw);
            if task_state
                .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                service.record_outcome(&id, &result, start.elapsed());
            } else {
                debug!(id = %id, "Discarding result of timed-out assessment");
            }
            result
        });

        match tokio::time::timeout(self.inner.timeout, &mut task).await {
            Ok(joined) => self.settle(joined),
            Err(_) => {
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Finished as the timer fired; its outcome is already recorded
                    return self.settle(task.await);
                }
                let err: AssessmentError = ScoringError::Timeout {
                    timeout_ms: self.inner.timeout.as_millis() as u64,
                }
                .into();
                self.inner.metrics.record_failure(err.kind());
                error!(error = %err, "Scoring timed out");
                Err(err)
            }
        }
    }

    fn settle(
        &self,
        joined: Result<Result<PredictionRecord, AssessmentError>, tokio::task::JoinError>,
    ) -> Result<PredictionRecord, AssessmentError> {
        joined.unwrap_or_else(|join_error| {
            let err: AssessmentError =
                ScoringError::ModelFailure(format!("scoring task failed: {}", join_error)).into();
            self.inner.metrics.record_failure(err.kind());
            error!(error = %err, "Scoring task aborted");
            Err(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::models::ModelLoader;
    use crate::types::prediction::ClassificationLabel;

    fn service() -> AssessmentService {
        let model = ModelLoader::new().load_bundled().unwrap();
        AssessmentService::new(&model, &AppConfig::default(), Arc::new(AuditMetrics::new()))
            .unwrap()
    }

    fn distressed() -> RawRecord {
        [
            ("Borrowing dependency", 0.9),
            ("Liability to Equity", 0.85),
            ("Continuous interest rate (after tax)", 0.1),
            ("Net worth/Assets", 0.05),
            ("Persistent EPS in the Last Four Seasons", 0.05),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_distressed_company_is_high_risk() {
        let service = service();
        let record = service.assess_blocking("req-1", &distressed()).unwrap();

        assert_eq!(record.label, ClassificationLabel::HighRisk);
        assert_eq!(record.threshold, 0.40);
        assert_eq!(record.attribution.len(), 5);
        assert!((record.attribution.reconstructed() - record.probability()).abs() <= 1e-6);
        assert_eq!(service.metrics().snapshot().assessments, 1);
    }

    #[test]
    fn test_schema_failure_short_circuits() {
        let service = service();
        let mut raw = distressed();
        raw.remove("Borrowing dependency");

        let err = service.assess_blocking("req-2", &raw).unwrap_err();
        assert_eq!(
            err,
            AssessmentError::Schema(SchemaError::MissingFeature {
                feature: "Borrowing dependency".into()
            })
        );
        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.assessments, 0);
        assert_eq!(snapshot.failures.get("missing_feature"), Some(&1));
    }

    #[test]
    fn test_identifier_is_carried() {
        let service = service();
        let raw = distressed().with_identifier("Acme Corp");
        let record = service.assess_blocking("7", &raw).unwrap();
        assert_eq!(record.identifier.as_deref(), Some("Acme Corp"));
        assert_eq!(record.id, "7");
    }

    #[tokio::test]
    async fn test_async_assess_matches_blocking() {
        let service = service();
        let blocking = service.assess_blocking("a", &distressed()).unwrap();
        let asynchronous = service.assess("a".into(), distressed()).await.unwrap();

        assert_eq!(blocking.probability().to_bits(), asynchronous.probability().to_bits());
        assert_eq!(blocking.attribution, asynchronous.attribution);
    }
}
