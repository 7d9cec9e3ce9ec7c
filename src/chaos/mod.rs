//! Chaos mode state machine.
//!
//! # States
//! - `off`: default, service reports healthy
//! - `on`: health check reports unhealthy (500)
//! - `slow`: healthy; optionally delays requests (see `http::middleware`)
//!
//! # Transitions
//! ```text
//! any --set("off"|"on"|"slow")--> that mode
//! any --set(<other>)--> unchanged, InvalidMode
//! ```
//!
//! The `chaos_mode_active` gauge mirrors the mode's ordinal and is updated
//! under the same lock as the mode itself.

pub mod state;

pub use state::{ChaosError, ChaosMode, ChaosState, Transition};
