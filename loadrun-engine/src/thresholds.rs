//! Pass/fail criteria evaluated against the final snapshot, e.g.
//! `http_req_duration: p(95)<500` or `http_req_failed: rate<0.01`.

use crate::metrics::{MetricValue, MetricsSnapshot};
use loadrun_common::ConfigError;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Count,
    Rate,
    Avg,
    Min,
    Max,
    Med,
    Value,
    Percentile(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(&self, actual: f64, expected: f64) -> bool {
        match self {
            Comparison::Lt => actual < expected,
            Comparison::Le => actual <= expected,
            Comparison::Gt => actual > expected,
            Comparison::Ge => actual >= expected,
            Comparison::Eq => actual == expected,
            Comparison::Ne => actual != expected,
        }
    }
}

/// One parsed threshold expression bound to a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    aggregate: Aggregate,
    comparison: Comparison,
    value: f64,
}

/// Outcome of evaluating one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric or aggregate does not exist.
    pub actual: Option<f64>,
    pub passed: bool,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Threshold(expression.to_string(), reason.to_string());

        let op_start = expression
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (lhs, rest) = expression.split_at(op_start);
        let (comparison, op_len) = match rest.as_bytes() {
            [b'<', b'=', ..] => (Comparison::Le, 2),
            [b'>', b'=', ..] => (Comparison::Ge, 2),
            [b'=', b'=', ..] => (Comparison::Eq, 2),
            [b'!', b'=', ..] => (Comparison::Ne, 2),
            [b'<', ..] => (Comparison::Lt, 1),
            [b'>', ..] => (Comparison::Gt, 1),
            _ => return Err(invalid("unknown comparison operator")),
        };

        let aggregate = parse_aggregate(lhs.trim()).ok_or_else(|| invalid("unknown aggregate"))?;
        let value: f64 = rest[op_len..]
            .trim()
            .parse()
            .map_err(|_| invalid("threshold value is not a number"))?;

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.to_string(),
            aggregate,
            comparison,
            value,
        })
    }

    pub fn aggregate(&self) -> Aggregate {
        self.aggregate
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdResult {
        let actual = snapshot
            .get(&self.metric)
            .and_then(|metric| aggregate_value(metric, self.aggregate));
        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            actual,
            passed: actual.is_some_and(|a| self.comparison.holds(a, self.value)),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression)
    }
}

fn parse_aggregate(name: &str) -> Option<Aggregate> {
    match name {
        "count" => Some(Aggregate::Count),
        "rate" => Some(Aggregate::Rate),
        "avg" => Some(Aggregate::Avg),
        "min" => Some(Aggregate::Min),
        "max" => Some(Aggregate::Max),
        "med" => Some(Aggregate::Med),
        "value" => Some(Aggregate::Value),
        _ => {
            let inner = name.strip_prefix("p(")?.strip_suffix(')')?;
            let p: f64 = inner.trim().parse().ok()?;
            (0.0..=100.0).contains(&p).then_some(Aggregate::Percentile(p))
        }
    }
}

fn aggregate_value(metric: &MetricValue, aggregate: Aggregate) -> Option<f64> {
    match (metric, aggregate) {
        (MetricValue::Counter { count, .. }, Aggregate::Count) => Some(*count as f64),
        (MetricValue::Counter { rate, .. }, Aggregate::Rate) => Some(*rate),
        (MetricValue::Rate { rate, .. }, Aggregate::Rate) => Some(*rate),
        (MetricValue::Rate { hits, .. }, Aggregate::Count) => Some(*hits as f64),
        (MetricValue::Gauge { value, .. }, Aggregate::Value) => Some(*value as f64),
        (MetricValue::Gauge { max, .. }, Aggregate::Max) => Some(*max as f64),
        (MetricValue::Trend(stats), Aggregate::Count) => Some(stats.count as f64),
        (MetricValue::Trend(stats), Aggregate::Avg) => Some(stats.avg_ms),
        (MetricValue::Trend(stats), Aggregate::Min) => Some(stats.min_ms),
        (MetricValue::Trend(stats), Aggregate::Max) => Some(stats.max_ms),
        (MetricValue::Trend(stats), Aggregate::Med) => Some(stats.med_ms),
        (MetricValue::Trend(stats), Aggregate::Percentile(p)) => Some(stats.percentile(p)),
        _ => None,
    }
}

/// Parse a `metric -> [expression]` map as found in a workload file.
pub fn parse_thresholds(map: &BTreeMap<String, Vec<String>>) -> Result<Vec<Threshold>, ConfigError> {
    map.iter()
        .flat_map(|(metric, expressions)| expressions.iter().map(move |e| Threshold::parse(metric, e)))
        .collect()
}

pub fn evaluate_all(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> Vec<ThresholdResult> {
    thresholds.iter().map(|t| t.evaluate(snapshot)).collect()
}
