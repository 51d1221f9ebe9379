//! Batch portfolio audits.
//!
//! Rows are scored independently by a bounded pool of tasks. Each row's task
//! handle is kept at the row's position, so results are assembled in input
//! order no matter which row finishes first. A failing row becomes a failure
//! descriptor; only a structurally unusable input rejects the whole batch.

use crate::config::AppConfig;
use crate::error::{AssessmentError, BatchError, ScoringError, SchemaError};
use crate::service::AssessmentService;
use crate::types::batch::{BatchRecord, BatchResult, RowFailure};
use crate::types::prediction::PredictionRecord;
use crate::types::record::{RawRecord, RawValue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Cancellation handle for batches in flight.
///
/// Rows already running finish; rows not yet scheduled are dropped and the
/// batch returns `BatchError::Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct BatchCancel {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl BatchCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One input row with its 1-based index
#[derive(Debug, Clone)]
pub struct BatchRow {
    pub row: usize,
    /// The parsed record, or why the row could not be read
    pub record: Result<RawRecord, SchemaError>,
}

/// Applies the assessment service across a portfolio.
#[derive(Clone)]
pub struct BatchAuditor {
    service: AssessmentService,
    workers: usize,
    identifier_columns: Vec<String>,
}

impl BatchAuditor {
    pub fn new(service: AssessmentService, config: &AppConfig) -> Self {
        Self {
            service,
            workers: config.pipeline.effective_workers().max(1),
            identifier_columns: config.batch.identifier_columns.clone(),
        }
    }

    /// Override the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn service(&self) -> &AssessmentService {
        &self.service
    }

    /// Parse CSV text into rows.
    ///
    /// Rejects the input when it has no header, no data rows, a header
    /// naming none of the required features, or a required feature named
    /// twice. Everything else is left to per-row validation.
    pub fn parse_csv(&self, input: &[u8]) -> Result<Vec<BatchRow>, BatchError> {
        let schema = self.service.schema();
        let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| BatchError::MalformedInput(format!("unreadable header row: {}", e)))?
            .clone();

        if headers.iter().all(str::is_empty) {
            return Err(BatchError::MalformedInput("missing header row".into()));
        }
        if !headers.iter().any(|h| schema.contains(h)) {
            return Err(BatchError::MalformedInput(format!(
                "header names none of the required columns ({})",
                schema.feature_names().join(", ")
            )));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = headers
            .iter()
            .filter(|h| schema.contains(h))
            .find(|h| !seen.insert(*h))
        {
            return Err(BatchError::MalformedInput(format!(
                "required column '{}' appears more than once",
                duplicate
            )));
        }

        let id_column = headers.iter().position(|h| {
            !schema.contains(h)
                && self
                    .identifier_columns
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(h))
        });

        let rows: Vec<BatchRow> = reader
            .records()
            .enumerate()
            .map(|(i, result)| {
                let record = result
                    .map(|fields| {
                        let mut raw = RawRecord::new();
                        for (name, value) in headers.iter().zip(fields.iter()) {
                            raw.insert(name, RawValue::Text(value.to_string()));
                        }
                        match id_column.and_then(|c| fields.get(c)) {
                            Some(id) if !id.is_empty() => raw.with_identifier(id),
                            _ => raw,
                        }
                    })
                    .map_err(|e| SchemaError::MalformedRow {
                        reason: e.to_string(),
                    });
                BatchRow { row: i + 1, record }
            })
            .collect();

        if rows.is_empty() {
            return Err(BatchError::MalformedInput("no data rows".into()));
        }

        debug!(
            rows = rows.len(),
            columns = headers.len(),
            identifier_column = ?id_column.and_then(|c| headers.get(c)),
            "Parsed batch input"
        );
        Ok(rows)
    }

    /// Audit a CSV upload
    pub async fn audit_csv(
        &self,
        input: &[u8],
        cancel: &BatchCancel,
    ) -> Result<BatchResult, BatchError> {
        let rows = self.parse_csv(input)?;
        self.run(rows, cancel).await
    }

    /// Audit already-structured records, numbered from 1 in the given order
    pub async fn audit_records(
        &self,
        records: Vec<RawRecord>,
        cancel: &BatchCancel,
    ) -> Result<BatchResult, BatchError> {
        if records.is_empty() {
            return Err(BatchError::MalformedInput("no records submitted".into()));
        }
        let schema = self.service.schema();
        let recognisable = records
            .iter()
            .any(|r| schema.feature_names().iter().any(|n| r.get(n).is_some()));
        if !recognisable {
            return Err(BatchError::MalformedInput(
                "no record carries any required feature".into(),
            ));
        }

        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| BatchRow {
                row: i + 1,
                record: Ok(record),
            })
            .collect();
        self.run(rows, cancel).await
    }

    /// Score every row with at most `workers` in flight.
    pub async fn run(
        &self,
        rows: Vec<BatchRow>,
        cancel: &BatchCancel,
    ) -> Result<BatchResult, BatchError> {
        let total = rows.len();
        if total == 0 {
            return Err(BatchError::MalformedInput("no data rows".into()));
        }

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut slots = Vec::with_capacity(total);
        let mut cancelled = false;

        info!(rows = total, workers = self.workers, "Starting batch audit");

        for BatchRow { row, record } in rows {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                cancelled = true;
                break;
            };

            let service = self.service.clone();
            // The permit follows the record onto the blocking pool and is
            // released only when scoring stops, timed out or not
            let handle = tokio::spawn(async move {
                match record {
                    Ok(raw) => {
                        service
                            .assess_with_permit(row.to_string(), raw, Some(permit))
                            .await
                    }
                    Err(e) => {
                        drop(permit);
                        let err = AssessmentError::from(e);
                        service.metrics().record_failure(err.kind());
                        Err(err)
                    }
                }
            });
            slots.push((row, handle));
        }

        let outcomes: Vec<(usize, Result<PredictionRecord, AssessmentError>)> =
            futures::future::join_all(slots.into_iter().map(|(row, handle)| async move {
                let outcome = handle.await.unwrap_or_else(|e| {
                    Err(ScoringError::ModelFailure(format!("row task failed: {}", e)).into())
                });
                (row, outcome)
            }))
            .await;

        if cancelled {
            warn!(
                completed = outcomes.len(),
                total,
                "Batch cancelled, unscheduled rows dropped"
            );
            return Err(BatchError::Cancelled {
                completed: outcomes.len(),
                total,
            });
        }

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (row, outcome) in outcomes {
            match outcome {
                Ok(record) => records.push(BatchRecord { row, record }),
                Err(error) => failures.push(RowFailure { row, error }),
            }
        }

        let result = BatchResult::new(records, failures);
        self.service.metrics().record_batch();

        info!(
            audit_id = %result.audit_id,
            submitted = result.summary.total_submitted,
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            high_risk = result.summary.high_risk,
            mean_probability = result.summary.mean_probability,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch audit complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AuditMetrics;
    use crate::models::ModelLoader;

    fn auditor() -> BatchAuditor {
        let model = ModelLoader::new().load_bundled().unwrap();
        let config = AppConfig::default();
        let service =
            AssessmentService::new(&model, &config, Arc::new(AuditMetrics::new())).unwrap();
        BatchAuditor::new(service, &config).with_workers(4)
    }

    const HEADER: &str = "Company,Borrowing dependency,Continuous interest rate (after tax),Net worth/Assets,Persistent EPS in the Last Four Seasons,Liability to Equity";

    #[test]
    fn test_parse_csv_with_identifier() {
        let csv = format!("{}\nAcme,0.9,0.1,0.05,0.05,0.85\n,0.37,0.78,0.89,0.23,0.28\n", HEADER);
        let rows = auditor().parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        let first = rows[0].record.as_ref().unwrap();
        assert_eq!(first.identifier(), Some("Acme"));
        assert_eq!(
            first.get("Net worth/Assets"),
            Some(&RawValue::Text("0.05".into()))
        );
        assert_eq!(rows[1].record.as_ref().unwrap().identifier(), None);
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = auditor().parse_csv(b"").unwrap_err();
        assert!(matches!(err, BatchError::MalformedInput(_)));
    }

    #[test]
    fn test_header_only_rejected() {
        let err = auditor().parse_csv(HEADER.as_bytes()).unwrap_err();
        assert_eq!(err, BatchError::MalformedInput("no data rows".into()));
    }

    #[test]
    fn test_headerless_data_rejected() {
        let err = auditor()
            .parse_csv(b"0.9,0.1,0.05,0.05,0.85\n0.3,0.7,0.8,0.2,0.2\n")
            .unwrap_err();
        assert!(matches!(err, BatchError::MalformedInput(msg) if msg.contains("none of the required")));
    }

    #[test]
    fn test_duplicate_required_column_rejected() {
        let csv = format!("{},Net worth/Assets\nA,0.9,0.1,0.05,0.05,0.85,abc\n", HEADER);
        let err = auditor().parse_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            BatchError::MalformedInput(
                "required column 'Net worth/Assets' appears more than once".into()
            )
        );
    }

    #[test]
    fn test_repeated_extra_column_is_allowed() {
        let csv = format!("{},Notes,Notes\nA,0.9,0.1,0.05,0.05,0.85,x,y\n", HEADER);
        assert_eq!(auditor().parse_csv(csv.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn test_short_row_is_kept_for_row_validation() {
        let csv = format!("{}\nShort,0.9,0.1\n", HEADER);
        let rows = auditor().parse_csv(csv.as_bytes()).unwrap();
        let record = rows[0].record.as_ref().unwrap();
        assert!(record.get("Liability to Equity").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = BatchCancel::new();
        cancel.cancel();
        let csv = format!("{}\nA,0.9,0.1,0.05,0.05,0.85\n", HEADER);

        let err = auditor().audit_csv(csv.as_bytes(), &cancel).await.unwrap_err();
        assert_eq!(err, BatchError::Cancelled { completed: 0, total: 1 });
    }

    #[tokio::test]
    async fn test_audit_records_rejects_unrecognisable_input() {
        let records = vec![RawRecord::new().with("Revenue", 10.0)];
        let err = auditor()
            .audit_records(records, &BatchCancel::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::MalformedInput(_)));
    }
}
