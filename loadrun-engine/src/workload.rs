use async_trait::async_trait;
use loadrun_client::HttpClient;
use loadrun_common::{parse_duration, ConfigError, HttpMethod, RunOptions, WorkloadError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// What a VU sees while running one iteration.
#[derive(Clone)]
pub struct VuContext {
    vu_id: u32,
    iteration: u64,
    http: HttpClient,
}

impl VuContext {
    pub fn new(vu_id: u32, iteration: u64, http: HttpClient) -> Self {
        Self { vu_id, iteration, http }
    }

    /// 1-based id of the VU running this iteration.
    pub fn vu_id(&self) -> u32 {
        self.vu_id
    }

    /// 0-based iteration number within this VU.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The VU's own HTTP client. Every request made through it is recorded.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }
}

/// One iteration's worth of work, executed repeatedly by every VU.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn iteration(&self, vu: &VuContext) -> Result<(), WorkloadError>;
}

#[async_trait]
impl<F, Fut> Workload for F
where
    F: Fn(VuContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    async fn iteration(&self, vu: &VuContext) -> Result<(), WorkloadError> {
        (self)(vu.clone()).await
    }
}

/// One request of a JSON workload file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Iteration fails when the response status differs.
    #[serde(default)]
    pub expect_status: Option<u16>,
}

/// On-disk workload definition.
///
/// ```json
/// {
///   "options": { "iterations": 1 },
///   "requests": [ { "method": "GET", "url": "http://localhost:8080/products" } ],
///   "thresholds": { "http_req_failed": ["rate<0.01"] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadFile {
    #[serde(default)]
    pub options: RunOptions,
    pub requests: Vec<RequestSpec>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    /// Pause at the end of every iteration, e.g. `"1s"`.
    #[serde(default)]
    pub sleep: Option<String>,
}

impl WorkloadFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Workload(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: WorkloadFile =
            serde_json::from_str(text).map_err(|e| ConfigError::Workload(e.to_string()))?;
        if file.requests.is_empty() {
            return Err(ConfigError::Workload("workload defines no requests".to_string()));
        }
        Ok(file)
    }

    /// The executable part of the file.
    pub fn workload(&self) -> Result<ScriptWorkload, ConfigError> {
        let sleep = self.sleep.as_deref().map(parse_duration).transpose()?;
        Ok(ScriptWorkload { requests: self.requests.clone(), sleep })
    }
}

/// Issues each configured request in order, once per iteration.
#[derive(Debug, Clone)]
pub struct ScriptWorkload {
    requests: Vec<RequestSpec>,
    sleep: Option<Duration>,
}

impl ScriptWorkload {
    pub fn new(requests: Vec<RequestSpec>) -> Self {
        Self { requests, sleep: None }
    }

    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = Some(sleep);
        self
    }

    pub fn requests(&self) -> &[RequestSpec] {
        &self.requests
    }
}

#[async_trait]
impl Workload for ScriptWorkload {
    async fn iteration(&self, vu: &VuContext) -> Result<(), WorkloadError> {
        for spec in &self.requests {
            let headers: Vec<(String, String)> =
                spec.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let body = spec.body.as_ref().map(|b| b.as_bytes().to_vec());
            let result = vu.http().request(spec.method, &spec.url, &headers, body).await;

            if let Some(expected) = spec.expect_status {
                if result.status != Some(expected) {
                    return Err(WorkloadError::UnexpectedStatus {
                        url: spec.url.clone(),
                        expected,
                        actual: result.status,
                    });
                }
            }
        }

        if let Some(pause) = self.sleep {
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }
}
