//! Batch audit results and their wire form

use crate::error::AssessmentError;
use crate::types::prediction::{ClassificationLabel, PredictionRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A successfully scored row
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    /// 1-based data row index
    pub row: usize,
    pub record: PredictionRecord,
}

/// A row that could not be scored
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    /// 1-based data row index
    pub row: usize,
    pub error: AssessmentError,
}

/// Portfolio statistics over successfully scored rows
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub total_submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub high_risk: usize,
    pub stable: usize,
    /// Mean probability over succeeded rows; 0.0 when none succeeded
    pub mean_probability: f64,
}

impl Summary {
    /// Recompute from the final outcome lists.
    pub fn compute(records: &[BatchRecord], failures: &[RowFailure]) -> Self {
        let high_risk = records
            .iter()
            .filter(|r| r.record.label == ClassificationLabel::HighRisk)
            .count();
        let succeeded = records.len();
        let mean_probability = if succeeded > 0 {
            records.iter().map(|r| r.record.probability()).sum::<f64>() / succeeded as f64
        } else {
            0.0
        };

        Self {
            total_submitted: succeeded + failures.len(),
            succeeded,
            failed: failures.len(),
            high_risk,
            stable: succeeded - high_risk,
            mean_probability,
        }
    }
}

/// Outcome of a batch audit, successes and failures both in row order
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub audit_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub records: Vec<BatchRecord>,
    pub failures: Vec<RowFailure>,
    pub summary: Summary,
}

impl BatchResult {
    pub fn new(records: Vec<BatchRecord>, failures: Vec<RowFailure>) -> Self {
        let summary = Summary::compute(&records, &failures);
        Self {
            audit_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            records,
            failures,
            summary,
        }
    }

    /// Row indices of failed rows
    pub fn failed_rows(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.row).collect()
    }

    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            audit_id: self.audit_id,
            completed_at: self.completed_at,
            results: self
                .records
                .iter()
                .map(|r| BatchRowResponse {
                    id: r.row,
                    identifier: r.record.identifier.clone(),
                    risk_score: r.record.probability(),
                    status: r.record.label,
                    data: r.record.features.clone(),
                })
                .collect(),
            failures: self
                .failures
                .iter()
                .map(|f| RowFailureResponse {
                    row: f.row,
                    kind: f.error.kind(),
                    feature: f.error.feature().map(str::to_string),
                    reason: f.error.to_string(),
                })
                .collect(),
            summary: SummaryResponse {
                total_companies: self.summary.succeeded,
                high_risk_count: self.summary.high_risk,
                stable_count: self.summary.stable,
                average_risk: self.summary.mean_probability,
                total_submitted: self.summary.total_submitted,
                failed_count: self.summary.failed,
            },
        }
    }
}

/// Response body for batch scoring
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub audit_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<BatchRowResponse>,
    pub failures: Vec<RowFailureResponse>,
    pub summary: SummaryResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRowResponse {
    pub id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub risk_score: f64,
    pub status: ClassificationLabel,
    pub data: crate::types::record::FeatureVector,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailureResponse {
    pub row: usize,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    /// Number of successfully scored companies (= `results.len()`)
    pub total_companies: usize,
    pub high_risk_count: usize,
    pub stable_count: usize,
    pub average_risk: f64,
    pub total_submitted: usize,
    pub failed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    #[test]
    fn test_summary_of_empty_batch() {
        let failures = vec![RowFailure {
            row: 1,
            error: SchemaError::MissingFeature {
                feature: "Liability to Equity".into(),
            }
            .into(),
        }];

        let summary = Summary::compute(&[], &failures);
        assert_eq!(summary.total_submitted, 1);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.mean_probability, 0.0);
    }

    #[test]
    fn test_failure_response_carries_feature() {
        let result = BatchResult::new(
            Vec::new(),
            vec![RowFailure {
                row: 3,
                error: SchemaError::InvalidValue {
                    feature: "Net worth/Assets".into(),
                    value: "n/a".into(),
                }
                .into(),
            }],
        );

        let json = serde_json::to_value(result.to_response()).unwrap();
        assert_eq!(json["failures"][0]["row"], 3);
        assert_eq!(json["failures"][0]["kind"], "invalid_value");
        assert_eq!(json["failures"][0]["feature"], "Net worth/Assets");
        assert_eq!(json["summary"]["totalCompanies"], 0);
        assert_eq!(json["summary"]["failedCount"], 1);
    }
}
