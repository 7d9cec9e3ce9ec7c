//! Load generator.
//!
//! # Data Flow
//! ```text
//! LoadPlan (scenario.rs: stages, traffic mix)
//!     → LoadRunner (runner.rs: setup → ramped virtual users → teardown)
//!     → Sample per iteration
//!     → LoadReport + Thresholds (report.rs)
//! ```
//!
//! The default plan ramps to 500 virtual users over nine minutes with 80%
//! normal traffic, 5% simulated errors and 15% `/chaos/slow` toggles.

pub mod report;
pub mod runner;
pub mod scenario;

pub use report::{LoadReport, Sample, Thresholds};
pub use runner::{LoadError, LoadRunner};
pub use scenario::{LoadPlan, PlanError, RequestKind, Stage, TrafficMix};
