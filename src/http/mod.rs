//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/instrumentation.rs (in-flight, latency, counters)
//!     → handlers.rs (reads/writes chaos state, renders metrics)
//!     → error.rs (ApiError → JSON response)
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, routes, with_layers, AppState, HttpServer};
