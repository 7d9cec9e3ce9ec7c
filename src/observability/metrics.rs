//! Service metrics and their exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, route, status code
//! - `http_request_duration_seconds` (histogram): latency by method, route
//! - `inflight_requests` (gauge): requests currently being processed
//! - `http_errors_total` (counter): responses with status >= 400
//! - `chaos_mode_active` (gauge): 0=off, 1=on, 2=slow
//! - `process_*`: default process metrics, see [`ProcessCollector`]
//!
//! Label names and bucket boundaries are shared with existing dashboards and
//! alert rules; changing them breaks those.

use std::time::Duration;

use super::process::ProcessCollector;
use super::registry::{Counter, Gauge, Histogram, MetricsError, Registry};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Latency buckets in seconds.
pub const DURATION_BUCKETS: [f64; 7] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// All service instruments, registered in one registry.
pub struct ServiceMetrics {
    registry: Registry,
    pub http_requests_total: Counter,
    pub http_request_duration_seconds: Histogram,
    pub inflight_requests: Gauge,
    pub http_errors_total: Counter,
    pub chaos_mode_active: Gauge,
}

impl ServiceMetrics {
    /// Build and register every instrument, including process metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let http_requests_total = Counter::new(
            "http_requests_total",
            "Total number of HTTP requests",
            &["method", "route", "code"],
        );
        let http_request_duration_seconds = Histogram::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            &["method", "route"],
            &DURATION_BUCKETS,
        )?;
        let inflight_requests = Gauge::live(
            "inflight_requests",
            "Number of requests currently being processed",
        );
        let http_errors_total = Counter::new(
            "http_errors_total",
            "Total number of HTTP errors",
            &["method", "route", "code"],
        );
        let chaos_mode_active = Gauge::live(
            "chaos_mode_active",
            "Whether chaos mode is active (0=off, 1=on, 2=slow)",
        );

        registry.register(http_requests_total.clone())?;
        registry.register(http_request_duration_seconds.clone())?;
        registry.register(inflight_requests.clone())?;
        registry.register(http_errors_total.clone())?;
        registry.register(chaos_mode_active.clone())?;
        registry.register(ProcessCollector::new())?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            inflight_requests,
            http_errors_total,
            chaos_mode_active,
        })
    }

    /// Record a finished request.
    pub fn record_request(
        &self,
        method: &str,
        route: &str,
        status: u16,
        elapsed: Duration,
    ) -> Result<(), MetricsError> {
        let code = status.to_string();
        let labels = [("method", method), ("route", route), ("code", code.as_str())];

        self.http_requests_total.inc(&labels)?;
        self.http_request_duration_seconds
            .observe(&[("method", method), ("route", route)], elapsed.as_secs_f64())?;
        if status >= 400 {
            self.http_errors_total.inc(&labels)?;
        }
        Ok(())
    }

    /// Render the exposition text for a scrape.
    pub fn render(&self) -> Result<String, MetricsError> {
        self.registry.render()
    }

    /// Drop recorded request series. Intended for test isolation.
    ///
    /// `inflight_requests` and `chaos_mode_active` track live state and keep
    /// their values.
    pub fn reset(&self) {
        self.registry.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request_counts_success() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics
            .record_request("GET", "/test", 200, Duration::from_millis(500))
            .unwrap();

        let out = metrics.render().unwrap();
        assert!(out.contains(
            "http_requests_total{method=\"GET\",route=\"/test\",code=\"200\"} 1\n"
        ));
        assert!(out.contains(
            "http_request_duration_seconds_bucket{method=\"GET\",route=\"/test\",le=\"0.5\"} 1\n"
        ));
        assert!(out.contains(
            "http_request_duration_seconds_bucket{method=\"GET\",route=\"/test\",le=\"0.25\"} 0\n"
        ));
        assert!(!out.contains("http_errors_total{"));
    }

    #[test]
    fn test_record_request_counts_errors() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics
            .record_request("GET", "/test", 500, Duration::from_millis(10))
            .unwrap();
        metrics
            .record_request("GET", "/test", 404, Duration::from_millis(10))
            .unwrap();

        let out = metrics.render().unwrap();
        assert!(out.contains("http_errors_total{method=\"GET\",route=\"/test\",code=\"500\"} 1\n"));
        assert!(out.contains("http_errors_total{method=\"GET\",route=\"/test\",code=\"404\"} 1\n"));
    }

    #[test]
    fn test_gauges_render_without_labels() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.inflight_requests.inc();
        metrics.inflight_requests.inc();
        metrics.inflight_requests.dec();
        metrics.chaos_mode_active.set(0.0);
        metrics.chaos_mode_active.set(1.0);
        metrics.chaos_mode_active.set(2.0);

        let out = metrics.render().unwrap();
        assert!(out.contains("inflight_requests 1\n"));
        assert!(out.contains("chaos_mode_active 2\n"));
    }

    #[test]
    fn test_render_includes_help_type_and_process_metrics() {
        let metrics = ServiceMetrics::new().unwrap();
        let out = metrics.render().unwrap();

        assert!(out.contains("# HELP http_requests_total Total number of HTTP requests\n"));
        assert!(out.contains("# TYPE http_requests_total counter\n"));
        assert!(out.contains("# TYPE http_request_duration_seconds histogram\n"));
        assert!(out.contains("process_start_time_seconds"));
    }

    #[test]
    fn test_reset_clears_series() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics
            .record_request("GET", "/", 500, Duration::from_millis(1))
            .unwrap();

        metrics.reset();
        let out = metrics.render().unwrap();
        assert!(!out.contains("http_requests_total{"));
        assert!(!out.contains("http_errors_total{"));
        assert!(!out.contains("http_request_duration_seconds_count{"));
    }

    #[test]
    fn test_reset_keeps_live_gauges() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.inflight_requests.set(4.0);
        metrics.chaos_mode_active.set(2.0);

        metrics.reset();
        let out = metrics.render().unwrap();
        assert!(out.contains("inflight_requests 4\n"));
        assert!(out.contains("chaos_mode_active 2\n"));
    }
}
