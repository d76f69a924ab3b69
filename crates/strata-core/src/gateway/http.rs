//! HTTP client for a JSON long-term memory service.
//!
//! Endpoints:
//! - `POST {base}/v1/namespaces/{namespace}/records` with `{"records": [...]}`,
//!   answered by `{"results": [StoreOutcome...]}`
//! - `POST {base}/v1/namespaces/{namespace}/search` with `{"query", "top_k"}`,
//!   answered by `{"results": [ScoredRecord...]}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GatewayError, MemoryGateway, MemoryRecord, Namespace, ScoredRecord, StoreOutcome};
use crate::config::GatewayConfig;
use crate::error::{Result, StrataError};

#[derive(Debug, Serialize)]
struct StoreRequest<'a> {
    records: &'a [MemoryRecord],
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    results: Vec<StoreOutcome>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<ScoredRecord>,
}

/// Memory gateway backed by an HTTP service.
#[derive(Clone)]
pub struct HttpMemoryGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

// Never print the API key, not even in debug logs.
impl std::fmt::Debug for HttpMemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMemoryGateway")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpMemoryGateway {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("strata/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    /// Build from the `gateway` section of [`StrataConfig`](crate::config::StrataConfig).
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StrataError::Config("gateway.url is not set".to_string()))?;
        Ok(Self::new(url, config.api_key.clone(), config.timeout()))
    }

    /// Reads `STRATA_MEMORY_URL`, `STRATA_MEMORY_API_KEY` and
    /// `STRATA_MEMORY_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("STRATA_MEMORY_URL")
            .map_err(|_| StrataError::Config("STRATA_MEMORY_URL is not set".to_string()))?;
        let timeout_ms = std::env::var("STRATA_MEMORY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(GatewayConfig::DEFAULT_TIMEOUT_MS);
        Ok(Self::new(
            url,
            std::env::var("STRATA_MEMORY_API_KEY").ok(),
            Duration::from_millis(timeout_ms),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, namespace: &Namespace, action: &str) -> String {
        format!(
            "{}/v1/namespaces/{}/{}",
            self.base_url,
            namespace.as_str(),
            action
        )
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }

    async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<R, GatewayError> {
        let request = self.auth_request(self.client.post(url).timeout(self.timeout).json(body));
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn map_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl MemoryGateway for HttpMemoryGateway {
    #[instrument(skip(self, records), fields(namespace = %namespace, count = records.len()))]
    async fn store(
        &self,
        namespace: &Namespace,
        records: &[MemoryRecord],
    ) -> std::result::Result<Vec<StoreOutcome>, GatewayError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint(namespace, "records");
        let response: StoreResponse = self.post_json(&url, &StoreRequest { records }).await?;
        debug!(results = response.results.len(), "memory records stored");
        Ok(response.results)
    }

    #[instrument(skip(self, query), fields(namespace = %namespace))]
    async fn retrieve(
        &self,
        namespace: &Namespace,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<ScoredRecord>, GatewayError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let url = self.endpoint(namespace, "search");
        let response: SearchResponse = self.post_json(&url, &SearchRequest { query, top_k }).await?;
        let mut results = response.results;
        results.truncate(top_k);
        Ok(results)
    }
}
