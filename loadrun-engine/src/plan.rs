use crate::thresholds::{parse_thresholds, Threshold};
use crate::workload::{ScriptWorkload, WorkloadFile};
use loadrun_common::{ConfigError, RunConfig, RunOptions};
use std::path::Path;

/// Everything needed to start a run from a workload file.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub config: RunConfig,
    pub workload: ScriptWorkload,
    pub thresholds: Vec<Threshold>,
}

impl RunPlan {
    /// Load `path`; `overrides` take precedence over the file's own options.
    pub fn load(path: &Path, overrides: RunOptions, max_error_rate: Option<f64>) -> Result<Self, ConfigError> {
        Self::from_file(WorkloadFile::load(path)?, overrides, max_error_rate)
    }

    pub fn from_file(
        file: WorkloadFile,
        overrides: RunOptions,
        max_error_rate: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let config = overrides.merge(file.options.clone()).into_config()?;
        let workload = file.workload()?;
        let mut thresholds = parse_thresholds(&file.thresholds)?;
        if let Some(rate) = max_error_rate {
            thresholds.push(Threshold::parse(crate::metrics::HTTP_REQ_FAILED, &format!("rate<={rate}"))?);
        }
        Ok(Self { config, workload, thresholds })
    }
}
