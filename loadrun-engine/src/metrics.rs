use hdrhistogram::Histogram;
use loadrun_client::ResultSink;
use loadrun_common::{RequestError, RequestResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const DATA_RECEIVED: &str = "data_received";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const WORKLOAD_ERRORS: &str = "workload_errors";
pub const FORCED_TERMINATIONS: &str = "forced_terminations";
pub const VUS: &str = "vus";

/// Failure categories, indexed by [`failure_index`].
const FAILURE_KINDS: [&str; 6] = ["invalid_url", "connect", "timeout", "body", "other", "http_status"];

fn failure_index(error: Option<&RequestError>) -> usize {
    match error {
        Some(RequestError::InvalidUrl(_)) => 0,
        Some(RequestError::Connect(_)) => 1,
        Some(RequestError::Timeout(_)) => 2,
        Some(RequestError::Body(_)) => 3,
        Some(RequestError::Other(_)) => 4,
        None => 5,
    }
}

/// Aggregated value of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Monotonic count plus its per-second rate over the run.
    Counter { count: u64, rate: f64 },
    /// Fraction of `total` samples that were `hits`.
    Rate { hits: u64, total: u64, rate: f64 },
    Trend(TrendStats),
    Gauge { value: u64, max: u64 },
}

/// Distribution of a duration metric, in milliseconds.
#[derive(Clone)]
pub struct TrendStats {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub med_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    histogram: Histogram<u64>,
}

impl TrendStats {
    /// Value at percentile `p` (0–100), in milliseconds. 0 for an empty trend.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let quantile = (p / 100.0).clamp(0.0, 1.0);
        us_to_ms(self.histogram.value_at_quantile(quantile))
    }
}

impl fmt::Debug for TrendStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrendStats")
            .field("count", &self.count)
            .field("min_ms", &self.min_ms)
            .field("avg_ms", &self.avg_ms)
            .field("med_ms", &self.med_ms)
            .field("max_ms", &self.max_ms)
            .field("p90_ms", &self.p90_ms)
            .field("p95_ms", &self.p95_ms)
            .field("p99_ms", &self.p99_ms)
            .finish_non_exhaustive()
    }
}

impl PartialEq for TrendStats {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
            && self.sum_ms == other.sum_ms
            && self.min_ms == other.min_ms
            && self.max_ms == other.max_ms
            && self.med_ms == other.med_ms
            && self.p90_ms == other.p90_ms
            && self.p95_ms == other.p95_ms
            && self.p99_ms == other.p99_ms
    }
}

/// Read-only view of everything recorded during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Failed requests by cause; only non-zero entries are present.
    pub failures: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn request_count(&self) -> u64 {
        self.counter(HTTP_REQS)
    }

    /// Fraction of requests that failed; 0 when no request was made.
    pub fn error_rate(&self) -> f64 {
        match self.get(HTTP_REQ_FAILED) {
            Some(MetricValue::Rate { rate, .. }) => *rate,
            _ => 0.0,
        }
    }

    pub fn throughput_rps(&self) -> f64 {
        match self.get(HTTP_REQS) {
            Some(MetricValue::Counter { rate, .. }) => *rate,
            _ => 0.0,
        }
    }

    pub fn iterations(&self) -> u64 {
        self.counter(ITERATIONS)
    }

    pub fn workload_errors(&self) -> u64 {
        self.counter(WORKLOAD_ERRORS)
    }

    pub fn forced_terminations(&self) -> u64 {
        self.counter(FORCED_TERMINATIONS)
    }

    pub fn data_received(&self) -> u64 {
        self.counter(DATA_RECEIVED)
    }

    pub fn peak_vus(&self) -> u64 {
        match self.get(VUS) {
            Some(MetricValue::Gauge { max, .. }) => *max,
            _ => 0,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&TrendStats> {
        match self.get(name) {
            Some(MetricValue::Trend(stats)) => Some(stats),
            _ => None,
        }
    }

    fn counter(&self, name: &str) -> u64 {
        match self.get(name) {
            Some(MetricValue::Counter { count, .. }) => *count,
            _ => 0,
        }
    }
}

/// Streaming duration recorder. Counters are atomic; the histogram lock is held
/// only for the in-memory update.
struct Trend {
    count: AtomicU64,
    sum_us: AtomicU64,
    min_us: AtomicU64,
    max_us: AtomicU64,
    histogram: Mutex<Histogram<u64>>,
}

impl Trend {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            min_us: AtomicU64::new(u64::MAX),
            max_us: AtomicU64::new(0),
            histogram: Mutex::new(
                Histogram::new(3).expect("3 significant figures is a valid histogram precision"),
            ),
        }
    }

    fn record(&self, duration: Duration) {
        let us = duration.as_micros().min(u64::MAX as u128) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.min_us.fetch_min(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
        self.histogram
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .saturating_record(us);
    }

    fn stats(&self) -> TrendStats {
        let histogram = self
            .histogram
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let count = self.count.load(Ordering::Relaxed);
        let sum_ms = us_to_ms(self.sum_us.load(Ordering::Relaxed));
        let mut stats = TrendStats {
            count,
            sum_ms,
            min_ms: 0.0,
            max_ms: 0.0,
            avg_ms: 0.0,
            med_ms: 0.0,
            p90_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            histogram,
        };
        if count > 0 {
            stats.min_ms = us_to_ms(self.min_us.load(Ordering::Relaxed));
            stats.max_ms = us_to_ms(self.max_us.load(Ordering::Relaxed));
            stats.avg_ms = sum_ms / count as f64;
            stats.med_ms = stats.percentile(50.0);
            stats.p90_ms = stats.percentile(90.0);
            stats.p95_ms = stats.percentile(95.0);
            stats.p99_ms = stats.percentile(99.0);
        }
        stats
    }
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1_000.0
}

/// Run-wide metrics store, written concurrently by every VU.
pub struct Aggregator {
    started_at: OnceLock<Instant>,
    finished: OnceLock<Duration>,
    http_reqs: AtomicU64,
    http_req_failed: AtomicU64,
    data_received: AtomicU64,
    failures: [AtomicU64; FAILURE_KINDS.len()],
    req_duration: Trend,
    iterations: AtomicU64,
    iteration_duration: Trend,
    workload_errors: AtomicU64,
    forced_terminations: AtomicU64,
    active_vus: AtomicU64,
    peak_vus: AtomicU64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            started_at: OnceLock::new(),
            finished: OnceLock::new(),
            http_reqs: AtomicU64::new(0),
            http_req_failed: AtomicU64::new(0),
            data_received: AtomicU64::new(0),
            failures: Default::default(),
            req_duration: Trend::new(),
            iterations: AtomicU64::new(0),
            iteration_duration: Trend::new(),
            workload_errors: AtomicU64::new(0),
            forced_terminations: AtomicU64::new(0),
            active_vus: AtomicU64::new(0),
            peak_vus: AtomicU64::new(0),
        }
    }

    /// Start the run clock. Later calls return the first start instant.
    pub fn start(&self) -> Instant {
        *self.started_at.get_or_init(Instant::now)
    }

    /// Freeze the elapsed time so later snapshots are identical.
    pub fn finish(&self) -> Duration {
        let started_at = self.start();
        *self.finished.get_or_init(|| started_at.elapsed())
    }

    pub fn elapsed(&self) -> Duration {
        match (self.finished.get(), self.started_at.get()) {
            (Some(frozen), _) => *frozen,
            (None, Some(started_at)) => started_at.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// Record one request outcome.
    pub fn record(&self, result: &RequestResult) {
        self.http_reqs.fetch_add(1, Ordering::Relaxed);
        self.data_received.fetch_add(result.bytes_received, Ordering::Relaxed);
        self.req_duration.record(result.duration);
        if result.is_failed() {
            self.http_req_failed.fetch_add(1, Ordering::Relaxed);
            self.failures[failure_index(result.error.as_ref())].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_iteration(&self, duration: Duration) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.iteration_duration.record(duration);
    }

    pub fn record_workload_error(&self) {
        self.workload_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_termination(&self) {
        self.forced_terminations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn vu_started(&self) {
        let active = self.active_vus.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_vus.fetch_max(active, Ordering::AcqRel);
    }

    pub fn vu_stopped(&self) {
        self.active_vus.fetch_sub(1, Ordering::AcqRel);
    }

    /// Snapshot of all metrics. Rates are computed over the frozen elapsed time
    /// once [`Aggregator::finish`] has been called.
    pub fn summary(&self) -> MetricsSnapshot {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        let per_sec = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };
        let counter = |count: u64| MetricValue::Counter { count, rate: per_sec(count) };

        let reqs = self.http_reqs.load(Ordering::Relaxed);
        let failed = self.http_req_failed.load(Ordering::Relaxed);
        let fail_rate = if reqs > 0 { failed as f64 / reqs as f64 } else { 0.0 };

        let mut metrics = BTreeMap::new();
        metrics.insert(HTTP_REQS.to_string(), counter(reqs));
        metrics.insert(
            HTTP_REQ_FAILED.to_string(),
            MetricValue::Rate { hits: failed, total: reqs, rate: fail_rate },
        );
        metrics.insert(HTTP_REQ_DURATION.to_string(), MetricValue::Trend(self.req_duration.stats()));
        metrics.insert(DATA_RECEIVED.to_string(), counter(self.data_received.load(Ordering::Relaxed)));
        metrics.insert(ITERATIONS.to_string(), counter(self.iterations.load(Ordering::Relaxed)));
        metrics.insert(
            ITERATION_DURATION.to_string(),
            MetricValue::Trend(self.iteration_duration.stats()),
        );
        metrics.insert(WORKLOAD_ERRORS.to_string(), counter(self.workload_errors.load(Ordering::Relaxed)));
        metrics.insert(
            FORCED_TERMINATIONS.to_string(),
            counter(self.forced_terminations.load(Ordering::Relaxed)),
        );
        metrics.insert(
            VUS.to_string(),
            MetricValue::Gauge {
                value: self.active_vus.load(Ordering::Acquire),
                max: self.peak_vus.load(Ordering::Acquire),
            },
        );

        let failures = FAILURE_KINDS
            .iter()
            .zip(&self.failures)
            .filter_map(|(kind, count)| {
                let count = count.load(Ordering::Relaxed);
                (count > 0).then(|| (kind.to_string(), count))
            })
            .collect();

        MetricsSnapshot { elapsed, metrics, failures }
    }
}

impl ResultSink for Aggregator {
    fn record(&self, result: &RequestResult) {
        Aggregator::record(self, result);
    }
}
