//! Remote API boundary
//!
//! [`Transport`] is the only way this crate talks to the backend. Every call
//! is one independent HTTP request; there is no batching.

use super::auth::TokenProvider;
use crate::error::{api_error_message, OfflineError, OfflineResult};
use crate::sync::queue::{Method, QueueItem};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A request as it will be sent, minus the bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl From<&QueueItem> for ApiRequest {
    fn from(item: &QueueItem) -> Self {
        Self {
            method: item.method,
            url: item.url.clone(),
            headers: item.headers.clone(),
            body: item.body.clone(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the decoded response body.
    async fn send(&self, request: &ApiRequest) -> OfflineResult<Value>;

    /// Whether the backend answers its health check.
    async fn ping(&self) -> bool;
}

/// Run `send` with a deadline. Hitting the deadline is an ordinary network failure.
pub async fn send_with_timeout(
    transport: &dyn Transport,
    request: &ApiRequest,
    timeout: Duration,
) -> OfflineResult<Value> {
    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(OfflineError::Timeout(timeout)),
    }
}

pub struct HttpTransport {
    base_url: String,
    health_url: String,
    probe_timeout: Duration,
    tokens: Arc<dyn TokenProvider>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `probe_timeout` bounds the health check only. Request deadlines are
    /// set per call by [`send_with_timeout`].
    pub fn new(
        api_url: &str,
        tokens: Arc<dyn TokenProvider>,
        probe_timeout: Duration,
    ) -> OfflineResult<Self> {
        let mut health = url::Url::parse(api_url)
            .map_err(|e| OfflineError::Config(format!("invalid api_url '{}': {}", api_url, e)))?;
        health.set_path("/health");
        health.set_query(None);

        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OfflineError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: api_url.trim_end_matches('/').to_string(),
            health_url: health.to_string(),
            probe_timeout,
            tokens,
            client,
        })
    }

    /// Relative paths are joined to the API base; absolute URLs are kept.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    fn headers(&self, extra: &BTreeMap<String, String>) -> OfflineResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| OfflineError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| OfflineError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        if let Some(token) = self.tokens.bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| OfflineError::InvalidRequest(format!("bearer token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> OfflineResult<Value> {
        let url = self.resolve(&request.url);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .headers(self.headers(&request.headers)?);
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        debug!("{} {}", request.method, url);
        let response = builder
            .send()
            .await
            .map_err(|e| OfflineError::Network(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(OfflineError::Http {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        // A success whose body is not JSON is still a success.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    async fn ping(&self) -> bool {
        let probe = self
            .client
            .get(&self.health_url)
            .timeout(self.probe_timeout)
            .send();
        match probe.await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }
}
