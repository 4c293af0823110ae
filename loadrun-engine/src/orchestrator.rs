use crate::metrics::{Aggregator, MetricsSnapshot};
use crate::scheduler::Scheduler;
use crate::vu::{self, RunState, VirtualUser};
use crate::workload::Workload;
use loadrun_client::{HttpClient, PoolConfig, ResultSink};
use loadrun_common::{format_duration, LoadRunError, Result, RunConfig};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the orchestrator stopped the VUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    /// An iterations-only run hit its `max_duration`.
    MaxDurationElapsed,
    IterationsReached,
    Interrupted,
}

/// Spawns the VUs, decides when to stop them, and collects the final metrics.
pub struct Orchestrator {
    config: RunConfig,
    pool: PoolConfig,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: RunConfig) -> Self {
        Self { config, pool: PoolConfig::default(), shutdown: CancellationToken::new() }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Cancelling `shutdown` stops the run early, with the usual grace period.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `workload` to completion and return the final snapshot.
    ///
    /// Fails before any VU is started if the configuration is invalid or a
    /// VU's HTTP client cannot be built.
    pub async fn execute(&self, workload: Arc<dyn Workload>) -> Result<MetricsSnapshot> {
        self.config.validate()?;

        let metrics = Arc::new(Aggregator::new());
        let sink: Arc<dyn ResultSink> = metrics.clone();
        let vus = (1..=self.config.vus)
            .map(|id| {
                HttpClient::new(self.pool.clone(), sink.clone())
                    .map(|http| VirtualUser::new(id, http))
                    .map_err(|e| LoadRunError::ClientBuild(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            vus = self.config.vus,
            duration = ?self.config.duration.map(format_duration),
            iterations = ?self.config.iterations,
            "starting run"
        );

        let signal = self.shutdown.child_token();
        let scheduler = Scheduler::from_config(&self.config);
        let state = Arc::new(RunState::new(scheduler, metrics.clone(), signal.clone()));
        let deadline = scheduler.deadline(state.started_at).map(Instant::from_std);

        let handles: Vec<_> = vus
            .into_iter()
            .map(|vu| {
                let id = vu.id();
                (id, tokio::spawn(vu::run(vu, workload.clone(), state.clone())))
            })
            .collect();

        let reason = tokio::select! {
            _ = sleep_until(deadline) => {
                if self.config.duration.is_some() {
                    StopReason::DurationElapsed
                } else {
                    StopReason::MaxDurationElapsed
                }
            }
            _ = signal.cancelled() => {
                if self.shutdown.is_cancelled() {
                    StopReason::Interrupted
                } else if self.config.iterations.is_some_and(|n| state.counter.completed() >= n) {
                    StopReason::IterationsReached
                } else {
                    StopReason::DurationElapsed
                }
            }
        };
        signal.cancel();
        if reason == StopReason::MaxDurationElapsed {
            warn!(
                max_duration = %format_duration(self.config.max_duration),
                completed = state.counter.completed(),
                "iteration target not reached within max duration"
            );
        }
        info!(
            reason = ?reason,
            elapsed = %format_duration(state.started_at.elapsed()),
            "stopping VUs"
        );

        let grace_deadline = Instant::now().checked_add(self.config.grace_period);
        for (id, mut handle) in handles {
            let joined = match grace_deadline {
                Some(deadline) => timeout_at(deadline, &mut handle).await,
                None => Ok((&mut handle).await),
            };
            match joined {
                Ok(Ok(vu)) => debug!(vu = id, iterations = vu.iterations_completed(), "VU joined"),
                Ok(Err(e)) => warn!(vu = id, error = %e, "VU task failed"),
                Err(_) => {
                    handle.abort();
                    // Wait for the task to be dropped so its gauge guard has run.
                    let _ = handle.await;
                    metrics.record_forced_termination();
                    warn!(
                        vu = id,
                        grace_period = %format_duration(self.config.grace_period),
                        "VU did not stop within the grace period, aborting"
                    );
                }
            }
        }

        let elapsed = metrics.finish();
        info!(elapsed = %format_duration(elapsed), iterations = state.counter.completed(), "run finished");
        Ok(metrics.summary())
    }
}

/// Run `workload` under `config` with default pool settings.
pub async fn execute(config: RunConfig, workload: Arc<dyn Workload>) -> Result<MetricsSnapshot> {
    Orchestrator::new(config).execute(workload).await
}

/// Like [`execute`], but cancelling `external` stops the run early, still honoring the grace period.
pub async fn execute_with_shutdown(
    config: RunConfig,
    workload: Arc<dyn Workload>,
    external: CancellationToken,
) -> Result<MetricsSnapshot> {
    Orchestrator::new(config).with_shutdown(external).execute(workload).await
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
