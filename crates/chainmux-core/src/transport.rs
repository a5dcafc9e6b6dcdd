//! The wire boundary and the single-call invoker built on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::classify::{CallContext, Classifier};
use crate::outcome::Outcome;

/// One raw HTTP exchange, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One-shot wire transport.
///
/// Implementations perform exactly one round trip per call and map
/// transport-level failures (connect refused, TLS, timeout) to
/// [`crate::CallError::Transient`]. Status and body interpretation is
/// not their business; the classifier owns that.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Outcome<RawResponse>;
    async fn post_json(&self, url: &str, body: &Value) -> Outcome<RawResponse>;
}

/// Couples a transport with a classifier.
///
/// Performs exactly one round trip per call and never retries or
/// consults other endpoints; fallback is strictly the orchestrator's
/// responsibility.
#[derive(Clone)]
pub struct Invoker {
    transport: Arc<dyn Transport>,
    classifier: Classifier,
}

impl Invoker {
    pub fn new(transport: Arc<dyn Transport>, classifier: Classifier) -> Self {
        Self {
            transport,
            classifier,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// One GET against `cx.url`, classified.
    pub async fn get_json(&self, cx: &CallContext) -> Outcome<Value> {
        let raw = self.transport.get(&cx.url).await?;
        self.classifier.classify(cx, raw.status, &raw.body)
    }

    /// One JSON POST against `cx.url`, classified.
    pub async fn post_json(&self, cx: &CallContext, body: &Value) -> Outcome<Value> {
        let raw = self.transport.post_json(&cx.url, body).await?;
        self.classifier.classify(cx, raw.status, &raw.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::outcome::CallError;
    use serde_json::json;

    struct Scripted {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, _url: &str) -> Outcome<RawResponse> {
            Ok(RawResponse::new(self.status, self.body.as_bytes()))
        }

        async fn post_json(&self, _url: &str, _body: &Value) -> Outcome<RawResponse> {
            Ok(RawResponse::new(self.status, self.body.as_bytes()))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn get(&self, url: &str) -> Outcome<RawResponse> {
            Err(CallError::Transient(format!("connect refused: {url}")))
        }

        async fn post_json(&self, url: &str, _body: &Value) -> Outcome<RawResponse> {
            Err(CallError::Transient(format!("connect refused: {url}")))
        }
    }

    fn cx() -> CallContext {
        CallContext::new(Operation::FetchBlockHeight, "https://node.example")
    }

    #[tokio::test]
    async fn classifies_successful_exchange() {
        let invoker = Invoker::new(
            Arc::new(Scripted {
                status: 200,
                body: r#"{"result":"0x1a"}"#,
            }),
            Classifier::default(),
        );
        let value = invoker.get_json(&cx()).await.unwrap();
        assert_eq!(value["result"], "0x1a");
    }

    #[tokio::test]
    async fn classifies_rate_limited_post() {
        let invoker = Invoker::new(
            Arc::new(Scripted {
                status: 429,
                body: "slow down",
            }),
            Classifier::default(),
        );
        let err = invoker.post_json(&cx(), &json!({})).await.unwrap_err();
        assert_eq!(err, CallError::RateLimited);
    }

    #[tokio::test]
    async fn transport_failure_stays_transient() {
        let invoker = Invoker::new(Arc::new(Unreachable), Classifier::default());
        let err = invoker.get_json(&cx()).await.unwrap_err();
        assert!(matches!(err, CallError::Transient(_)));
    }
}
