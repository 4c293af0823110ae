//! The `loadrun run` command, from parsed arguments to process exit code.

use crate::orchestrator::Orchestrator;
use crate::plan::RunPlan;
use crate::report::Summary;
use crate::thresholds::evaluate_all;
use clap::Args;
use loadrun_client::PoolConfig;
use loadrun_common::{parse_duration, ConfigError, LoadRunError, RunOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_THRESHOLDS_FAILED: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 3;
pub const EXIT_SETUP_ERROR: i32 = 4;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the JSON workload definition
    pub script: PathBuf,

    /// Number of concurrent virtual users
    #[arg(long)]
    pub vus: Option<u32>,

    /// How long to run, e.g. 15s or 1m30s
    #[arg(long)]
    pub duration: Option<String>,

    /// Total iterations shared by all VUs
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Time VUs get to finish their current iteration once the run stops
    #[arg(long)]
    pub grace_period: Option<String>,

    /// Time limit for a run given only an iteration count
    #[arg(long)]
    pub max_duration: Option<String>,

    /// Fail if the request error rate exceeds this fraction
    #[arg(long)]
    pub max_error_rate: Option<f64>,

    /// Per-request timeout
    #[arg(long, default_value = "60s")]
    pub timeout: String,

    /// Idle keep-alive connections kept per host, per VU
    #[arg(long, default_value_t = 4)]
    pub max_idle_per_host: usize,
}

impl RunArgs {
    /// Arguments for `script` with every flag left at its default.
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            vus: None,
            duration: None,
            iterations: None,
            grace_period: None,
            max_duration: None,
            max_error_rate: None,
            timeout: "60s".to_string(),
            max_idle_per_host: 4,
        }
    }

    fn overrides(&self) -> RunOptions {
        RunOptions {
            vus: self.vus,
            duration: self.duration.clone(),
            iterations: self.iterations,
            grace_period: self.grace_period.clone(),
            max_duration: self.max_duration.clone(),
        }
    }

    fn prepare(&self) -> Result<(RunPlan, PoolConfig), ConfigError> {
        let plan = RunPlan::load(&self.script, self.overrides(), self.max_error_rate)?;
        let pool = PoolConfig {
            max_idle_per_host: self.max_idle_per_host,
            timeout: parse_duration(&self.timeout)?,
            ..PoolConfig::default()
        };
        Ok((plan, pool))
    }
}

/// Execute `args`, print the summary to `out` and return the exit code.
///
/// Configuration errors are reported on stderr and nothing is written to `out`.
pub async fn run(args: &RunArgs, shutdown: CancellationToken, out: &mut dyn Write) -> i32 {
    let (plan, pool) = match args.prepare() {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    info!(script = %args.script.display(), "loaded workload");
    let orchestrator = Orchestrator::new(plan.config.clone())
        .with_pool(pool)
        .with_shutdown(shutdown);

    let snapshot = match orchestrator.execute(Arc::new(plan.workload.clone())).await {
        Ok(snapshot) => snapshot,
        Err(LoadRunError::Config(e)) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG_ERROR;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_SETUP_ERROR;
        }
    };

    let thresholds = evaluate_all(&plan.thresholds, &snapshot);
    let summary = Summary { config: &plan.config, snapshot: &snapshot, thresholds: &thresholds };
    if let Err(e) = writeln!(out, "{summary}") {
        warn!(error = %e, "failed to write summary");
    }

    if summary.passed() {
        EXIT_OK
    } else {
        EXIT_THRESHOLDS_FAILED
    }
}
