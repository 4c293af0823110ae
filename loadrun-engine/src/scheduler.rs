use loadrun_common::RunConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Decides when a run is over. Holds no mutable state and can be shared freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    duration: Option<Duration>,
    iterations: Option<u64>,
    /// Fallback time limit when `duration` is unset.
    max_duration: Option<Duration>,
}

impl Scheduler {
    pub fn new(duration: Option<Duration>, iterations: Option<u64>) -> Self {
        Self { duration, iterations, max_duration: None }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.duration, config.iterations).with_max_duration(config.max_duration)
    }

    fn time_limit(&self) -> Option<Duration> {
        self.duration.or(self.max_duration)
    }

    /// `true` once the duration has elapsed or the iteration target has been met,
    /// whichever comes first.
    pub fn should_stop(&self, elapsed: Duration, iterations_done: u64) -> bool {
        self.time_limit().is_some_and(|d| elapsed >= d)
            || self.iterations.is_some_and(|n| iterations_done >= n)
    }

    /// Instant at which the time limit fires for a run started at `start`.
    ///
    /// `None` when there is no time limit or it lies beyond what `Instant` can represent.
    pub fn deadline(&self, start: Instant) -> Option<Instant> {
        self.time_limit().and_then(|d| start.checked_add(d))
    }

    /// Reserve the right to start one more iteration.
    ///
    /// With an iteration target of `n`, exactly `n` claims ever succeed across all VUs.
    pub fn try_claim(&self, counter: &IterationCounter) -> bool {
        match self.iterations {
            None => {
                counter.claimed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(limit) => counter
                .claimed
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
                .is_ok(),
        }
    }
}

/// Run-wide iteration bookkeeping shared by every VU.
#[derive(Debug, Default)]
pub struct IterationCounter {
    claimed: AtomicU64,
    completed: AtomicU64,
}

impl IterationCounter {
    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Mark one iteration finished and return the new run-wide total.
    pub fn complete_one(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }
}
