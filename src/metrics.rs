//! Performance metrics and statistics tracking for the risk pipeline.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by the service and the batch pipeline
pub struct AuditMetrics {
    /// Successful single-record assessments
    pub assessments: AtomicU64,
    /// Assessments classified high-risk
    pub high_risk: AtomicU64,
    /// Batches completed (including ones with row failures)
    pub batches: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<BTreeMap<&'static str, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl AuditMetrics {
    pub fn new() -> Self {
        Self {
            assessments: AtomicU64::new(0),
            high_risk: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            failures_by_kind: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful assessment
    pub fn record_assessment(&self, processing_time: Duration, probability: f64, high_risk: bool) {
        self.assessments.fetch_add(1, Ordering::Relaxed);
        if high_risk {
            self.high_risk.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = ((probability * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed assessment by error kind
    pub fn record_failure(&self, kind: &'static str) {
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let sorted = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => {
                let mut sorted = times.clone();
                sorted.sort_unstable();
                sorted
            }
            _ => return ProcessingStats::default(),
        };

        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (assessments per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.assessments.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    pub fn get_failures_by_kind(&self) -> BTreeMap<&'static str, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            assessments: self.assessments.load(Ordering::Relaxed),
            high_risk: self.high_risk.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            failures: self.get_failures_by_kind(),
            throughput: self.get_throughput(),
            processing: self.get_processing_stats(),
            score_distribution: self.get_score_distribution(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let failed: u64 = snapshot.failures.values().sum();

        info!(
            assessments = snapshot.assessments,
            high_risk = snapshot.high_risk,
            failed,
            batches = snapshot.batches,
            throughput = format!("{:.1}/s", snapshot.throughput),
            "Risk pipeline metrics"
        );
        info!(
            mean_us = snapshot.processing.mean_us,
            p50_us = snapshot.processing.p50_us,
            p95_us = snapshot.processing.p95_us,
            p99_us = snapshot.processing.p99_us,
            "Assessment latency"
        );
        for (kind, count) in &snapshot.failures {
            info!(kind = %kind, count, "Failures by kind");
        }

        let total: u64 = snapshot.score_distribution.iter().sum();
        for (i, &count) in snapshot.score_distribution.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "  {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for AuditMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub assessments: u64,
    pub high_risk: u64,
    pub batches: u64,
    pub failures: BTreeMap<&'static str, u64>,
    pub throughput: f64,
    pub processing: ProcessingStats,
    pub score_distribution: [u64; 10],
}

/// Periodic metrics summary in the log
pub struct MetricsReporter {
    metrics: Arc<AuditMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<AuditMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = AuditMetrics::new();

        metrics.record_assessment(Duration::from_micros(100), 0.05, false);
        metrics.record_assessment(Duration::from_micros(300), 0.97, true);
        metrics.record_failure("missing_feature");
        metrics.record_failure("missing_feature");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.assessments, 2);
        assert_eq!(snapshot.high_risk, 1);
        assert_eq!(snapshot.failures.get("missing_feature"), Some(&2));
        assert_eq!(snapshot.score_distribution[0], 1);
        assert_eq!(snapshot.score_distribution[9], 1);
        assert_eq!(snapshot.processing.max_us, 300);
    }

    #[test]
    fn test_probability_one_lands_in_last_bucket() {
        let metrics = AuditMetrics::new();
        metrics.record_assessment(Duration::from_micros(1), 1.0, true);
        assert_eq!(metrics.get_score_distribution()[9], 1);
    }

    #[test]
    fn test_empty_stats() {
        let stats = AuditMetrics::new().get_processing_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean_us, 0);
    }
}
