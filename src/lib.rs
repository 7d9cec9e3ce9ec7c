//! OpsPulse: a small HTTP service instrumented with Prometheus metrics and
//! a chaos-mode switch, plus a load generator that drives traffic at it.

pub mod chaos;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod loadgen;
pub mod observability;

pub use chaos::{ChaosMode, ChaosState};
pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::ServiceMetrics;
