pub mod cli;
pub mod metrics;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod thresholds;
pub mod vu;
pub mod workload;

pub use metrics::{Aggregator, MetricValue, MetricsSnapshot, TrendStats};
pub use orchestrator::{execute, execute_with_shutdown, Orchestrator, StopReason};
pub use workload::{ScriptWorkload, VuContext, Workload};
