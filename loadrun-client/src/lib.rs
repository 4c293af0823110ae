use loadrun_common::{HttpMethod, RequestError, RequestResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Receives every [`RequestResult`] the client produces.
pub trait ResultSink: Send + Sync {
    fn record(&self, result: &RequestResult);
}

/// Connection pool configuration for one VU's client.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Idle keep-alive connections kept per host.
    pub max_idle_per_host: usize,
    /// Whole-request timeout, including reading the body.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 4,
            timeout: Duration::from_secs(60),
            user_agent: concat!("loadrun/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP client owned by a single VU.
///
/// Cloning is cheap and shares the same connection pool and sink.
#[derive(Clone)]
pub struct HttpClient {
    config: PoolConfig,
    http_client: reqwest::Client,
    sink: Arc<dyn ResultSink>,
}

impl HttpClient {
    /// Build a client with its own connection pool, reporting into `sink`.
    pub fn new(config: PoolConfig, sink: Arc<dyn ResultSink>) -> Result<Self, RequestError> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RequestError::Other(e.to_string()))?;
        Ok(Self { config, http_client, sink })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub async fn get(&self, url: &str) -> RequestResult {
        self.request(HttpMethod::Get, url, &[], None).await
    }

    pub async fn head(&self, url: &str) -> RequestResult {
        self.request(HttpMethod::Head, url, &[], None).await
    }

    pub async fn delete(&self, url: &str) -> RequestResult {
        self.request(HttpMethod::Delete, url, &[], None).await
    }

    pub async fn post(&self, url: &str, body: impl Into<Vec<u8>>) -> RequestResult {
        self.request(HttpMethod::Post, url, &[], Some(body.into())).await
    }

    pub async fn put(&self, url: &str, body: impl Into<Vec<u8>>) -> RequestResult {
        self.request(HttpMethod::Put, url, &[], Some(body.into())).await
    }

    pub async fn patch(&self, url: &str, body: impl Into<Vec<u8>>) -> RequestResult {
        self.request(HttpMethod::Patch, url, &[], Some(body.into())).await
    }

    /// Issue one request, time it and report the result to the sink.
    ///
    /// Never fails: transport errors are carried inside the returned result.
    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> RequestResult {
        let (status, bytes_received, duration, error) = match reqwest::Url::parse(url) {
            Ok(parsed) => {
                let start = Instant::now();
                let outcome = self.send(method, parsed, headers, body).await;
                let duration = start.elapsed();
                match outcome {
                    Ok((status, bytes)) => (Some(status), bytes, duration, None),
                    Err(e) => (None, 0, duration, Some(e)),
                }
            }
            Err(e) => (None, 0, Duration::ZERO, Some(RequestError::InvalidUrl(format!("{url}: {e}")))),
        };

        let result = RequestResult {
            method,
            url: url.to_string(),
            status,
            duration,
            bytes_received,
            error,
        };
        trace!(method = %result.method, url = %result.url, status = ?result.status, "request finished");
        self.sink.record(&result);
        result
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: reqwest::Url,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<(u16, u64), RequestError> {
        let mut request = self.http_client.request(to_reqwest_method(method), url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(e)
            } else {
                RequestError::Body(e.to_string())
            }
        })?;

        Ok((status, bytes.len() as u64))
    }

    fn classify(&self, error: reqwest::Error) -> RequestError {
        if error.is_timeout() {
            RequestError::Timeout(self.config.timeout.as_millis() as u64)
        } else if error.is_connect() {
            RequestError::Connect(error.to_string())
        } else if error.is_builder() {
            RequestError::InvalidUrl(error.to_string())
        } else if error.is_body() || error.is_decode() {
            RequestError::Body(error.to_string())
        } else {
            RequestError::Other(error.to_string())
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}
