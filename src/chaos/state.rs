use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::observability::Gauge;

/// Accepted mode tokens, in the order they are advertised to clients.
pub const VALID_MODES: [&str; 3] = ["on", "off", "slow"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChaosMode {
    #[default]
    Off,
    On,
    Slow,
}

impl ChaosMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChaosMode::Off => "off",
            ChaosMode::On => "on",
            ChaosMode::Slow => "slow",
        }
    }

    /// Value exported through `chaos_mode_active`.
    pub fn ordinal(self) -> u8 {
        match self {
            ChaosMode::Off => 0,
            ChaosMode::On => 1,
            ChaosMode::Slow => 2,
        }
    }

    pub fn is_healthy(self) -> bool {
        self != ChaosMode::On
    }
}

impl fmt::Display for ChaosMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChaosError {
    #[error("invalid chaos mode `{0}`")]
    InvalidMode(String),
}

impl FromStr for ChaosMode {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ChaosMode::Off),
            "on" => Ok(ChaosMode::On),
            "slow" => Ok(ChaosMode::Slow),
            other => Err(ChaosError::InvalidMode(other.to_string())),
        }
    }
}

/// Result of a successful `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: ChaosMode,
    pub current: ChaosMode,
}

/// Shared chaos flag plus the gauge that exports it.
pub struct ChaosState {
    mode: Mutex<ChaosMode>,
    gauge: Gauge,
}

impl ChaosState {
    pub fn new(initial: ChaosMode, gauge: Gauge) -> Self {
        gauge.set(f64::from(initial.ordinal()));
        Self {
            mode: Mutex::new(initial),
            gauge,
        }
    }

    pub fn current(&self) -> ChaosMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse `token` and switch to it. Invalid tokens leave the state alone.
    pub fn set(&self, token: &str) -> Result<Transition, ChaosError> {
        let next: ChaosMode = token.parse()?;
        Ok(self.set_mode(next))
    }

    pub fn set_mode(&self, next: ChaosMode) -> Transition {
        let mut mode = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *mode, next);
        self.gauge.set(f64::from(next.ordinal()));

        if previous != next {
            tracing::info!(previous = %previous, current = %next, "Chaos mode changed");
        }
        Transition {
            previous,
            current: next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (ChaosState, Gauge) {
        let gauge = Gauge::new("chaos_mode_active", "Chaos");
        (ChaosState::new(ChaosMode::Off, gauge.clone()), gauge)
    }

    #[test]
    fn test_defaults_to_off() {
        let (chaos, gauge) = state();
        assert_eq!(chaos.current(), ChaosMode::Off);
        assert_eq!(gauge.get(), 0.0);
    }

    #[test]
    fn test_transitions_update_gauge_and_report_previous() {
        let (chaos, gauge) = state();

        let t = chaos.set("on").unwrap();
        assert_eq!(t.previous, ChaosMode::Off);
        assert_eq!(t.current, ChaosMode::On);
        assert_eq!(gauge.get(), 1.0);

        let t = chaos.set("slow").unwrap();
        assert_eq!(t.previous, ChaosMode::On);
        assert_eq!(gauge.get(), 2.0);
        assert!(chaos.current().is_healthy());
    }

    #[test]
    fn test_invalid_token_leaves_state_unchanged() {
        let (chaos, gauge) = state();
        chaos.set("on").unwrap();

        let err = chaos.set("banana").unwrap_err();
        assert_eq!(err, ChaosError::InvalidMode("banana".to_string()));
        assert_eq!(chaos.current(), ChaosMode::On);
        assert_eq!(gauge.get(), 1.0);

        // Tokens are case-sensitive.
        assert!(chaos.set("ON").is_err());
    }

    #[test]
    fn test_repeated_off_is_idempotent() {
        let (chaos, gauge) = state();
        for _ in 0..3 {
            let t = chaos.set("off").unwrap();
            assert_eq!(t.previous, ChaosMode::Off);
            assert_eq!(gauge.get(), 0.0);
        }
    }

    #[test]
    fn test_initial_mode_is_exported() {
        let gauge = Gauge::new("chaos_mode_active", "Chaos");
        let chaos = ChaosState::new(ChaosMode::Slow, gauge.clone());
        assert_eq!(chaos.current(), ChaosMode::Slow);
        assert_eq!(gauge.get(), 2.0);
    }
}
