//! HTTP transport backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use chainmux_core::{CallError, Outcome, RawResponse, Transport};

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Socket-level bound enforced by the HTTP client itself; the
    /// orchestrator applies its own, usually tighter, per-call budget.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("chainmux/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// One-shot HTTP transport.
///
/// Performs exactly one round trip per call; retry and fallback belong
/// to the orchestrator. Failures before a status code arrives (DNS,
/// connect, TLS, mid-body disconnect) classify as `Transient`; any
/// completed exchange is handed back raw for the classifier.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()
            .expect("failed to build reqwest client");
        Self { http }
    }

    async fn finish(resp: reqwest::Response) -> Outcome<RawResponse> {
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(transient)?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(HttpTransportConfig::default())
    }
}

fn transient(err: reqwest::Error) -> CallError {
    CallError::Transient(err.to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Outcome<RawResponse> {
        let resp = self.http.get(url).send().await.map_err(transient)?;
        Self::finish(resp).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Outcome<RawResponse> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transient)?;
        Self::finish(resp).await
    }
}
