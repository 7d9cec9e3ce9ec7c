//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! http middleware / chaos state
//!     → metrics.rs (service instruments)
//!     → registry.rs (counters, gauges, histograms)
//!     → process.rs (default process metrics, sampled at scrape)
//!
//! GET /metrics
//!     → ServiceMetrics::render → text exposition
//! ```
//!
//! # Design Decisions
//! - One registry per `ServiceMetrics`, built explicitly and shared via `Arc`
//! - Updates are single indivisible operations; no cross-call transactions
//! - Structured logging through `tracing` (logging.rs)

pub mod logging;
pub mod metrics;
pub mod process;
pub mod registry;

pub use metrics::ServiceMetrics;
pub use registry::{Collector, Counter, Gauge, Histogram, HistogramSnapshot, MetricsError, Registry};
