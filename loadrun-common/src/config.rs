use crate::{parse_duration, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long VUs get to finish their current iteration once the run is stopping.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Upper bound on the run time of an iterations-only run.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(600);

/// Validated parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub vus: u32,
    pub duration: Option<Duration>,
    /// Total iterations shared across all VUs.
    pub iterations: Option<u64>,
    pub grace_period: Duration,
    /// Time limit applied when `duration` is unset, so a stuck iteration cannot hold the run forever.
    pub max_duration: Duration,
}

impl RunConfig {
    /// `vus` users looping for `duration`.
    pub fn for_duration(vus: u32, duration: Duration) -> Self {
        Self { duration: Some(duration), ..Self::defaults(vus) }
    }

    /// `vus` users sharing `iterations` iterations between them.
    pub fn for_iterations(vus: u32, iterations: u64) -> Self {
        Self { iterations: Some(iterations), ..Self::defaults(vus) }
    }

    fn defaults(vus: u32) -> Self {
        Self {
            vus,
            duration: None,
            iterations: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// The wall-clock limit of the run: `duration` if set, otherwise `max_duration`.
    pub fn time_limit(&self) -> Duration {
        self.duration.unwrap_or(self.max_duration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vus < 1 {
            return Err(ConfigError::InvalidVus(self.vus));
        }
        match (self.duration, self.iterations) {
            (None, None) => Err(ConfigError::MissingTermination),
            (Some(d), _) if d.is_zero() => Err(ConfigError::ZeroDuration),
            (_, Some(0)) => Err(ConfigError::ZeroIterations),
            (None, _) if self.max_duration.is_zero() => Err(ConfigError::ZeroDuration),
            _ => Ok(()),
        }
    }
}

/// Raw, unvalidated run options as found in a workload file or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub vus: Option<u32>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default, alias = "gracefulStop")]
    pub grace_period: Option<String>,
    #[serde(default, alias = "maxDuration")]
    pub max_duration: Option<String>,
}

impl RunOptions {
    /// Fill every unset field of `self` from `fallback`.
    pub fn merge(self, fallback: RunOptions) -> RunOptions {
        RunOptions {
            vus: self.vus.or(fallback.vus),
            duration: self.duration.or(fallback.duration),
            iterations: self.iterations.or(fallback.iterations),
            grace_period: self.grace_period.or(fallback.grace_period),
            max_duration: self.max_duration.or(fallback.max_duration),
        }
    }

    /// Parse durations and validate. `vus` defaults to 1.
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let config = RunConfig {
            vus: self.vus.unwrap_or(1),
            duration: self.duration.as_deref().map(parse_duration).transpose()?,
            iterations: self.iterations,
            grace_period: match self.grace_period.as_deref() {
                Some(s) => parse_duration(s)?,
                None => DEFAULT_GRACE_PERIOD,
            },
            max_duration: match self.max_duration.as_deref() {
                Some(s) => parse_duration(s)?,
                None => DEFAULT_MAX_DURATION,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
