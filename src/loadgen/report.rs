//! Per-iteration samples, the run summary and threshold checks.

use serde::Serialize;
use std::time::Duration;

use super::scenario::RequestKind;

/// Outcome of one iteration.
#[derive(Debug, Clone)]
pub struct Sample {
    pub kind: RequestKind,
    /// `None` when the request never produced a response.
    pub status: Option<u16>,
    pub latency: Duration,
    /// Status matched and latency stayed under budget.
    pub passed: bool,
}

/// Aggregated result of a load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub total_requests: usize,
    pub failed_checks: usize,
    pub transport_errors: usize,
    pub error_rate: f64,
    pub p95_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub avg_rps: f64,
    pub elapsed_secs: f64,
}

/// Nearest-rank percentile of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl LoadReport {
    pub fn from_samples(samples: &[Sample], elapsed: Duration) -> Self {
        let total = samples.len();
        let failed = samples.iter().filter(|s| !s.passed).count();
        let transport_errors = samples.iter().filter(|s| s.status.is_none()).count();

        let mut latencies: Vec<f64> = samples
            .iter()
            .map(|s| s.latency.as_nanos() as f64 / 1_000_000.0)
            .collect();
        latencies.sort_by(f64::total_cmp);

        let ratio = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        let elapsed_secs = elapsed.as_secs_f64();

        Self {
            total_requests: total,
            failed_checks: failed,
            transport_errors,
            error_rate: ratio(failed),
            p95_latency_ms: percentile(&latencies, 95.0),
            avg_latency_ms: if total == 0 {
                0.0
            } else {
                latencies.iter().sum::<f64>() / total as f64
            },
            avg_rps: if elapsed_secs > 0.0 {
                total as f64 / elapsed_secs
            } else {
                0.0
            },
            elapsed_secs,
        }
    }
}

/// Pass/fail limits for a run.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub p95_latency: Duration,
    pub max_error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            p95_latency: Duration::from_millis(500),
            max_error_rate: 0.1,
        }
    }
}

impl Thresholds {
    /// Human-readable description of every breached threshold.
    pub fn breaches(&self, report: &LoadReport) -> Vec<String> {
        let mut out = Vec::new();
        let p95_limit = self.p95_latency.as_secs_f64() * 1000.0;

        if report.p95_latency_ms >= p95_limit {
            out.push(format!(
                "p95 latency {:.2}ms is not below {:.0}ms",
                report.p95_latency_ms, p95_limit
            ));
        }
        if report.error_rate >= self.max_error_rate {
            out.push(format!(
                "error rate {:.2}% is not below {:.2}%",
                report.error_rate * 100.0,
                self.max_error_rate * 100.0
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: u64, passed: bool) -> Sample {
        Sample {
            kind: RequestKind::Normal,
            status: Some(200),
            latency: Duration::from_millis(ms),
            passed,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 95.0), 95.0);
        assert_eq!(percentile(&values, 100.0), 100.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn test_report_aggregates() {
        let mut samples: Vec<Sample> = (1..=20).map(|ms| sample(ms * 10, true)).collect();
        samples[0].passed = false;
        samples[1].status = None;
        samples[1].passed = false;

        let report = LoadReport::from_samples(&samples, Duration::from_secs(2));
        assert_eq!(report.total_requests, 20);
        assert_eq!(report.failed_checks, 2);
        assert_eq!(report.transport_errors, 1);
        assert_eq!(report.error_rate, 0.1);
        assert_eq!(report.p95_latency_ms, 190.0);
        assert_eq!(report.avg_rps, 10.0);
    }

    #[test]
    fn test_empty_report() {
        let report = LoadReport::from_samples(&[], Duration::ZERO);
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.error_rate, 0.0);
        assert_eq!(report.avg_rps, 0.0);
    }

    #[test]
    fn test_threshold_breaches() {
        let thresholds = Thresholds::default();
        let fast: Vec<Sample> = (0..10).map(|_| sample(20, true)).collect();
        let report = LoadReport::from_samples(&fast, Duration::from_secs(1));
        assert!(thresholds.breaches(&report).is_empty());

        let slow: Vec<Sample> = (0..10).map(|_| sample(800, false)).collect();
        let report = LoadReport::from_samples(&slow, Duration::from_secs(1));
        assert_eq!(thresholds.breaches(&report).len(), 2);
    }
}
