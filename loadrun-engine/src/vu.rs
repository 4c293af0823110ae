use crate::metrics::Aggregator;
use crate::scheduler::{IterationCounter, Scheduler};
use crate::workload::{VuContext, Workload};
use futures::FutureExt;
use loadrun_client::HttpClient;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A simulated user. Owned by exactly one runner task.
pub struct VirtualUser {
    id: u32,
    iterations_completed: u64,
    http: HttpClient,
}

impl VirtualUser {
    pub fn new(id: u32, http: HttpClient) -> Self {
        Self { id, iterations_completed: 0, http }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn iterations_completed(&self) -> u64 {
        self.iterations_completed
    }
}

/// State every runner of one run shares.
pub struct RunState {
    pub scheduler: Scheduler,
    pub counter: IterationCounter,
    pub metrics: Arc<Aggregator>,
    pub signal: CancellationToken,
    pub started_at: Instant,
}

impl RunState {
    pub fn new(scheduler: Scheduler, metrics: Arc<Aggregator>, signal: CancellationToken) -> Self {
        let started_at = metrics.start();
        Self { scheduler, counter: IterationCounter::default(), metrics, signal, started_at }
    }

    fn stop_requested(&self) -> bool {
        self.signal.is_cancelled()
            || self.scheduler.should_stop(self.started_at.elapsed(), self.counter.completed())
    }
}

/// Keeps the active-VU gauge right even when the runner is aborted.
struct ActiveVu<'a>(&'a Aggregator);

impl<'a> ActiveVu<'a> {
    fn enter(metrics: &'a Aggregator) -> Self {
        metrics.vu_started();
        Self(metrics)
    }
}

impl Drop for ActiveVu<'_> {
    fn drop(&mut self) {
        self.0.vu_stopped();
    }
}

/// Loop `workload` until the run is stopped. Returns the VU with its final count.
///
/// Workload errors and panics are recorded and the loop moves on to the next
/// iteration.
pub async fn run(mut vu: VirtualUser, workload: Arc<dyn Workload>, state: Arc<RunState>) -> VirtualUser {
    let _active = ActiveVu::enter(&state.metrics);
    debug!(vu = vu.id, "VU started");

    while !state.stop_requested() && state.scheduler.try_claim(&state.counter) {
        let ctx = VuContext::new(vu.id, vu.iterations_completed, vu.http.clone());
        let iteration_start = Instant::now();

        match AssertUnwindSafe(workload.iteration(&ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(vu = vu.id, iteration = vu.iterations_completed, error = %e, "iteration failed");
                state.metrics.record_workload_error();
            }
            Err(panic) => {
                warn!(vu = vu.id, iteration = vu.iterations_completed, "workload panicked: {}", panic_message(&*panic));
                state.metrics.record_workload_error();
            }
        }

        state.metrics.record_iteration(iteration_start.elapsed());
        vu.iterations_completed += 1;
        let total = state.counter.complete_one();
        if state.scheduler.should_stop(state.started_at.elapsed(), total) {
            state.signal.cancel();
        }
    }

    debug!(vu = vu.id, iterations = vu.iterations_completed, "VU stopped");
    vu
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
