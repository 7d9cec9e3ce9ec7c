//! Load plan: ramp stages and traffic mix.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// What a single iteration requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Normal,
    SimulatedError,
    ChaosSlow,
}

impl RequestKind {
    pub fn path(self) -> &'static str {
        match self {
            RequestKind::Normal => "/",
            RequestKind::SimulatedError => "/simulate-error",
            RequestKind::ChaosSlow => "/chaos/slow",
        }
    }

    pub fn expected_status(self) -> u16 {
        match self {
            RequestKind::SimulatedError => 500,
            RequestKind::Normal | RequestKind::ChaosSlow => 200,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("invalid stage `{0}`, expected <duration>:<target>, e.g. 30s:20")]
    InvalidStage(String),

    #[error("invalid duration `{0}`, expected e.g. 500ms, 30s, 2m")]
    InvalidDuration(String),

    #[error("traffic ratios must be in [0, 1] and sum to at most 1 (error={error}, chaos={chaos})")]
    InvalidMix { error: f64, chaos: f64 },
}

/// Share of iterations sent to each endpoint. The remainder is normal
/// traffic to `/`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficMix {
    error: f64,
    chaos: f64,
}

impl TrafficMix {
    pub fn new(error: f64, chaos: f64) -> Result<Self, PlanError> {
        let in_range = |r: f64| (0.0..=1.0).contains(&r);
        if !in_range(error) || !in_range(chaos) || error + chaos > 1.0 {
            return Err(PlanError::InvalidMix { error, chaos });
        }
        Ok(Self { error, chaos })
    }

    /// Map a uniform roll in `[0, 1)` onto a request kind.
    pub fn pick(&self, roll: f64) -> RequestKind {
        if roll < self.error {
            RequestKind::SimulatedError
        } else if roll < self.error + self.chaos {
            RequestKind::ChaosSlow
        } else {
            RequestKind::Normal
        }
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn chaos(&self) -> f64 {
        self.chaos
    }

    pub fn normal(&self) -> f64 {
        1.0 - self.error - self.chaos
    }
}

impl Default for TrafficMix {
    fn default() -> Self {
        Self {
            error: 0.05,
            chaos: 0.15,
        }
    }
}

impl fmt::Display for TrafficMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "normal={:.2} error={:.2} chaos={:.2}",
            self.normal(),
            self.error,
            self.chaos
        )
    }
}

/// Parse `500ms`, `30s`, `2m` or `1h`.
pub fn parse_duration(s: &str) -> Result<Duration, PlanError> {
    let invalid = || PlanError::InvalidDuration(s.to_string());
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().map_err(|_| invalid())?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(n)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    n.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Ramp from the previous stage's target to `target` virtual users over
/// `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub const fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .split_once(':')
            .ok_or_else(|| PlanError::InvalidStage(s.to_string()))?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| PlanError::InvalidStage(s.to_string()))?;
        Ok(Stage::new(parse_duration(duration)?, target))
    }
}

/// Full description of a load run.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub stages: Vec<Stage>,
    pub mix: TrafficMix,
    /// Pause between iterations of one virtual user.
    pub think_time: Duration,
    /// An iteration slower than this fails its check.
    pub latency_budget: Duration,
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            mix: TrafficMix::default(),
            think_time: Duration::from_millis(100),
            latency_budget: Duration::from_millis(1000),
        }
    }
}

/// 1m→50, 2m→100, 2m→500, 3m→500, 1m→0.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(60), 50),
        Stage::new(Duration::from_secs(120), 100),
        Stage::new(Duration::from_secs(120), 500),
        Stage::new(Duration::from_secs(180), 500),
        Stage::new(Duration::from_secs(60), 0),
    ]
}

impl LoadPlan {
    /// Sum of all stage durations, saturating at [`Duration::MAX`].
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    /// Index of the stage running at `elapsed`, or `None` once the plan is over.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut end = Duration::ZERO;
        for (i, stage) in self.stages.iter().enumerate() {
            end = end.saturating_add(stage.duration);
            if elapsed < end {
                return Some(i);
            }
        }
        None
    }

    /// Desired virtual users at `elapsed`, interpolated linearly within the
    /// current stage. `None` once every stage has finished.
    pub fn vus_at(&self, elapsed: Duration) -> Option<u32> {
        let mut start = Duration::ZERO;
        let mut from = 0u32;

        for stage in &self.stages {
            let end = start.saturating_add(stage.duration);
            if elapsed < end {
                let frac = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = f64::from(stage.target) - f64::from(from);
                return Some((f64::from(from) + delta * frac).round() as u32);
            }
            from = stage.target;
            start = end;
        }
        None
    }

    /// Largest virtual-user count any stage reaches.
    pub fn peak_vus(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_pick_boundaries() {
        let mix = TrafficMix::default();
        assert_eq!(mix.pick(0.0), RequestKind::SimulatedError);
        assert_eq!(mix.pick(0.049), RequestKind::SimulatedError);
        assert_eq!(mix.pick(0.05), RequestKind::ChaosSlow);
        assert_eq!(mix.pick(0.199), RequestKind::ChaosSlow);
        assert_eq!(mix.pick(0.2), RequestKind::Normal);
        assert_eq!(mix.pick(0.999), RequestKind::Normal);
    }

    #[test]
    fn test_mix_validation() {
        assert!(TrafficMix::new(0.5, 0.5).is_ok());
        assert!(TrafficMix::new(0.6, 0.5).is_err());
        assert!(TrafficMix::new(-0.1, 0.0).is_err());
        assert!(TrafficMix::new(0.0, 1.5).is_err());
    }

    #[test]
    fn test_request_kinds() {
        assert_eq!(RequestKind::SimulatedError.expected_status(), 500);
        assert_eq!(RequestKind::ChaosSlow.path(), "/chaos/slow");
        assert_eq!(RequestKind::Normal.expected_status(), 200);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert_eq!(
            parse_duration("999999999999999999h"),
            Err(PlanError::InvalidDuration("999999999999999999h".to_string()))
        );
        assert!(parse_duration("999999999999999999999s").is_err());
        assert!("999999999999999999m:1".parse::<Stage>().is_err());
    }

    #[test]
    fn test_huge_stages_saturate_instead_of_overflowing() {
        let plan = LoadPlan {
            stages: vec![
                Stage::new(Duration::MAX, 10),
                Stage::new(Duration::MAX, 0),
            ],
            ..LoadPlan::default()
        };

        assert_eq!(plan.total_duration(), Duration::MAX);
        assert_eq!(plan.stage_at(Duration::from_secs(60)), Some(0));
        assert_eq!(plan.vus_at(Duration::ZERO), Some(0));
        assert_eq!(plan.vus_at(Duration::from_secs(60)), Some(0));
    }

    #[test]
    fn test_parse_stage() {
        assert_eq!(
            "30s:20".parse::<Stage>(),
            Ok(Stage::new(Duration::from_secs(30), 20))
        );
        assert!("30s".parse::<Stage>().is_err());
        assert!("30s:many".parse::<Stage>().is_err());
    }

    #[test]
    fn test_vus_interpolate_within_stage() {
        let plan = LoadPlan {
            stages: vec![
                Stage::new(Duration::from_secs(10), 100),
                Stage::new(Duration::from_secs(10), 100),
                Stage::new(Duration::from_secs(10), 0),
            ],
            ..LoadPlan::default()
        };

        assert_eq!(plan.vus_at(Duration::ZERO), Some(0));
        assert_eq!(plan.vus_at(Duration::from_secs(5)), Some(50));
        assert_eq!(plan.vus_at(Duration::from_secs(15)), Some(100));
        assert_eq!(plan.vus_at(Duration::from_secs(25)), Some(50));
        assert_eq!(plan.vus_at(Duration::from_secs(30)), None);
        assert_eq!(plan.stage_at(Duration::from_secs(12)), Some(1));
        assert_eq!(plan.total_duration(), Duration::from_secs(30));
        assert_eq!(plan.peak_vus(), 100);
    }

    #[test]
    fn test_default_plan_matches_reference_profile() {
        let plan = LoadPlan::default();
        assert_eq!(plan.total_duration(), Duration::from_secs(540));
        assert_eq!(plan.peak_vus(), 500);
        assert_eq!(plan.think_time, Duration::from_millis(100));
    }
}
