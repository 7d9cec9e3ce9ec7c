//! Virtual-user scheduler.
//!
//! A controller ticks every [`RAMP_TICK`], computes the desired virtual-user
//! count from the plan and publishes it on a `watch` channel. Virtual user
//! `i` runs iterations while `i < desired` and parks otherwise. Dropping the
//! sender ends the run; each virtual user returns its samples.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;

use super::report::{LoadReport, Sample};
use super::scenario::{LoadPlan, RequestKind};
use crate::chaos::ChaosMode;

const RAMP_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("base URL must use http or https, got `{0}`")]
    UnsupportedScheme(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("virtual user task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Everything a virtual user needs for one iteration.
struct VuContext {
    client: reqwest::Client,
    base_url: String,
    plan: LoadPlan,
}

impl VuContext {
    async fn iteration(&self) -> Sample {
        let kind = self.plan.mix.pick(fastrand::f64());
        let url = format!("{}{}", self.base_url, kind.path());

        let start = Instant::now();
        let status = match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain so the connection can be reused.
                let _ = response.bytes().await;
                Some(status)
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Request failed");
                None
            }
        };
        let latency = start.elapsed();

        Sample {
            kind,
            status,
            latency,
            passed: status == Some(kind.expected_status()) && latency < self.plan.latency_budget,
        }
    }
}

async fn virtual_user(
    id: u32,
    mut desired: watch::Receiver<u32>,
    ctx: Arc<VuContext>,
) -> Vec<Sample> {
    let mut samples = Vec::new();
    loop {
        let target = *desired.borrow_and_update();
        if id >= target {
            if desired.changed().await.is_err() {
                return samples;
            }
            continue;
        }
        if desired.has_changed().is_err() {
            return samples;
        }

        samples.push(ctx.iteration().await);
        tokio::time::sleep(ctx.plan.think_time).await;
    }
}

/// Drives a [`LoadPlan`] against one OpsPulse instance.
pub struct LoadRunner {
    ctx: Arc<VuContext>,
}

impl LoadRunner {
    pub fn new(base_url: &str, plan: LoadPlan) -> Result<Self, LoadError> {
        let parsed = Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoadError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(plan.peak_vus() as usize)
            .build()?;

        Ok(Self {
            ctx: Arc::new(VuContext {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                plan,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.ctx.base_url
    }

    pub fn plan(&self) -> &LoadPlan {
        &self.ctx.plan
    }

    /// Switch the target's chaos mode. Returns whether it answered 200.
    pub async fn set_chaos(&self, mode: ChaosMode) -> Result<bool, LoadError> {
        let url = format!("{}/chaos/{}", self.ctx.base_url, mode);
        let response = self.ctx.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Put the target in `slow` mode before the run.
    pub async fn setup(&self) -> bool {
        match self.set_chaos(ChaosMode::Slow).await {
            Ok(true) => {
                tracing::info!("Chaos mode enabled (slow)");
                true
            }
            Ok(false) => {
                tracing::warn!("Failed to enable chaos mode");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enable chaos mode");
                false
            }
        }
    }

    /// Turn chaos mode back off after the run.
    pub async fn teardown(&self) -> bool {
        match self.set_chaos(ChaosMode::Off).await {
            Ok(true) => {
                tracing::info!("Chaos mode disabled");
                true
            }
            Ok(false) => {
                tracing::warn!("Failed to disable chaos mode");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to disable chaos mode");
                false
            }
        }
    }

    /// Execute every stage and aggregate the samples.
    pub async fn run(&self) -> Result<LoadReport, LoadError> {
        let plan = &self.ctx.plan;
        let (tx, rx) = watch::channel(0u32);
        let mut vus = JoinSet::new();
        let mut spawned = 0u32;
        let mut current_stage = None;

        let started = Instant::now();
        let mut ticker = tokio::time::interval(RAMP_TICK);

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            let Some(target) = plan.vus_at(elapsed) else {
                break;
            };

            let stage = plan.stage_at(elapsed);
            if stage != current_stage {
                if let Some(i) = stage {
                    tracing::info!(
                        stage = i + 1,
                        of = plan.stages.len(),
                        target = plan.stages[i].target,
                        duration_secs = plan.stages[i].duration.as_secs(),
                        "Entering stage"
                    );
                }
                current_stage = stage;
            }

            while spawned < target {
                vus.spawn(virtual_user(spawned, rx.clone(), Arc::clone(&self.ctx)));
                spawned += 1;
            }
            tx.send_if_modified(|desired| {
                if *desired != target {
                    *desired = target;
                    true
                } else {
                    false
                }
            });
        }

        drop(tx);
        let mut samples = Vec::new();
        while let Some(result) = vus.join_next().await {
            samples.extend(result?);
        }

        let report = LoadReport::from_samples(&samples, started.elapsed());
        tracing::info!(
            requests = report.total_requests,
            virtual_users = spawned,
            "Load run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_base_urls() {
        assert!(matches!(
            LoadRunner::new("not a url", LoadPlan::default()),
            Err(LoadError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            LoadRunner::new("ftp://localhost", LoadPlan::default()),
            Err(LoadError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let runner = LoadRunner::new("http://localhost:8080/", LoadPlan::default()).unwrap();
        assert_eq!(runner.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_virtual_user_exits_when_controller_drops() {
        let ctx = Arc::new(VuContext {
            client: reqwest::Client::new(),
            base_url: "http://127.0.0.1:9".to_string(),
            plan: LoadPlan::default(),
        });
        let (tx, rx) = watch::channel(0u32);
        let vu = tokio::spawn(virtual_user(0, rx, ctx));

        drop(tx);
        let samples = vu.await.unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_request_kind_paths_join_base() {
        let runner = LoadRunner::new("http://localhost:8080", LoadPlan::default()).unwrap();
        let url = format!("{}{}", runner.base_url(), RequestKind::SimulatedError.path());
        assert_eq!(url, "http://localhost:8080/simulate-error");
    }
}
