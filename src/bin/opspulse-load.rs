//! Load generator for OpsPulse.
//!
//! Ramps virtual users through a list of stages, mixing normal traffic,
//! simulated errors and chaos toggles, then checks latency and error-rate
//! thresholds. Exits non-zero when a threshold is breached.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

use opspulse::config::{LogFormat, ObservabilityConfig};
use opspulse::loadgen::{scenario, LoadPlan, LoadRunner, Stage, Thresholds, TrafficMix};
use opspulse::observability::logging;

#[derive(Parser)]
#[command(name = "opspulse-load")]
#[command(about = "Drive load against an OpsPulse instance", long_about = None)]
struct Cli {
    /// Base URL of the target service.
    #[arg(short, long, env = "BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Ramp stage as <duration>:<target VUs>; repeat for several stages.
    /// Defaults to 1m:50 2m:100 2m:500 3m:500 1m:0.
    #[arg(short, long = "stage")]
    stages: Vec<Stage>,

    /// Share of iterations hitting /simulate-error.
    #[arg(long, default_value_t = 0.05)]
    error_ratio: f64,

    /// Share of iterations hitting /chaos/slow.
    #[arg(long, default_value_t = 0.15)]
    chaos_ratio: f64,

    /// Pause between iterations of one virtual user.
    #[arg(long, default_value = "100ms", value_parser = scenario::parse_duration)]
    think_time: Duration,

    /// Iterations slower than this fail their check.
    #[arg(long, default_value = "1000ms", value_parser = scenario::parse_duration)]
    latency_budget: Duration,

    /// Fail the run when p95 latency is not below this.
    #[arg(long, default_value = "500ms", value_parser = scenario::parse_duration)]
    p95_threshold: Duration,

    /// Fail the run when the check failure rate is not below this.
    #[arg(long, default_value_t = 0.1)]
    max_error_rate: f64,

    /// Do not toggle chaos mode before and after the run.
    #[arg(long)]
    skip_setup: bool,

    /// Print the summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    logging::init(&ObservabilityConfig {
        log_level: "info".to_string(),
        log_format: LogFormat::Pretty,
    });

    let plan = LoadPlan {
        stages: if cli.stages.is_empty() {
            scenario::default_stages()
        } else {
            cli.stages
        },
        mix: TrafficMix::new(cli.error_ratio, cli.chaos_ratio)?,
        think_time: cli.think_time,
        latency_budget: cli.latency_budget,
    };
    let thresholds = Thresholds {
        p95_latency: cli.p95_threshold,
        max_error_rate: cli.max_error_rate,
    };

    let runner = LoadRunner::new(&cli.base_url, plan)?;
    tracing::info!(
        target_url = %runner.base_url(),
        traffic = %runner.plan().mix,
        duration_secs = runner.plan().total_duration().as_secs(),
        peak_vus = runner.plan().peak_vus(),
        "Starting OpsPulse load test"
    );

    if !cli.skip_setup {
        runner.setup().await;
    }
    let result = runner.run().await;
    if !cli.skip_setup {
        runner.teardown().await;
    }
    let report = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n--- Load Test Summary ---");
        println!("Total requests: {}", report.total_requests);
        println!("Error rate:     {:.2}%", report.error_rate * 100.0);
        println!("P95 latency:    {:.2}ms", report.p95_latency_ms);
        println!("Average RPS:    {:.2}", report.avg_rps);
        println!("-------------------------\n");
    }

    let breaches = thresholds.breaches(&report);
    if breaches.is_empty() {
        tracing::info!("All thresholds passed");
        Ok(ExitCode::SUCCESS)
    } else {
        for breach in &breaches {
            tracing::error!(threshold = %breach, "Threshold breached");
        }
        Ok(ExitCode::FAILURE)
    }
}
