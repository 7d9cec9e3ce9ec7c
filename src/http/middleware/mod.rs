//! Request middleware.
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId
//!     → instrumentation (in-flight, latency, counters)
//!     → timeout → catch-panic
//!     → chaos delay → handler
//! ```
//!
//! Instrumentation sits outside the timeout and panic layers so that 408s
//! and recovered panics are counted like any other response.

pub mod chaos_delay;
pub mod instrumentation;

pub use chaos_delay::chaos_delay;
pub use instrumentation::{track_metrics, InflightGuard};
