use crate::metrics::{MetricsSnapshot, HTTP_REQ_DURATION, ITERATION_DURATION};
use crate::thresholds::ThresholdResult;
use loadrun_common::{format_duration, RunConfig};
use std::fmt;

/// End-of-run text report.
pub struct Summary<'a> {
    pub config: &'a RunConfig,
    pub snapshot: &'a MetricsSnapshot,
    pub thresholds: &'a [ThresholdResult],
}

impl Summary<'_> {
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;

        writeln!(f, "LoadRun Results")?;
        writeln!(f, "===============")?;
        writeln!(f, "VUs:                   {} (peak {})", self.config.vus, s.peak_vus())?;
        if let Some(duration) = self.config.duration {
            writeln!(f, "Duration:              {}", format_duration(duration))?;
        }
        if let Some(iterations) = self.config.iterations {
            writeln!(f, "Iterations (target):   {}", iterations)?;
        }
        writeln!(f, "Elapsed:               {:.1} s", s.elapsed.as_secs_f64())?;
        writeln!(f)?;
        writeln!(f, "Requests:              {}", s.request_count())?;
        writeln!(f, "Throughput:            {:.1} rps", s.throughput_rps())?;
        writeln!(f, "Data received:         {}", format_bytes(s.data_received()))?;
        writeln!(f, "Error rate:            {:.3}%", s.error_rate() * 100.0)?;
        for (kind, count) in &s.failures {
            writeln!(f, "  {:<20} {}", format!("{kind}:"), count)?;
        }
        if let Some(t) = s.trend(HTTP_REQ_DURATION) {
            writeln!(
                f,
                "Latency:               avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms",
                t.avg_ms, t.min_ms, t.med_ms, t.max_ms
            )?;
            writeln!(
                f,
                "                       p(90)={:.2}ms p(95)={:.2}ms p(99)={:.2}ms",
                t.p90_ms, t.p95_ms, t.p99_ms
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Iterations:            {}", s.iterations())?;
        if let Some(t) = s.trend(ITERATION_DURATION) {
            writeln!(f, "Iteration duration:    avg={:.2}ms p(95)={:.2}ms", t.avg_ms, t.p95_ms)?;
        }
        writeln!(f, "Workload errors:       {}", s.workload_errors())?;
        writeln!(f, "Forced terminations:   {}", s.forced_terminations())?;

        if !self.thresholds.is_empty() {
            writeln!(f)?;
            writeln!(f, "Thresholds:")?;
            for t in self.thresholds {
                let actual = t.actual.map_or_else(|| "n/a".to_string(), |a| format!("{a:.3}"));
                writeln!(
                    f,
                    "  {} {}: {}    [actual: {}]",
                    if t.passed { "✓" } else { "✗" },
                    t.metric,
                    t.expression,
                    actual
                )?;
            }
        }

        writeln!(f)?;
        write!(f, "Result: {}", if self.passed() { "PASS" } else { "FAIL" })
    }
}

fn format_bytes(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.1} GB", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.1} MB", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.1} kB", n as f64 / 1e3)
    } else {
        format!("{n} B")
    }
}
