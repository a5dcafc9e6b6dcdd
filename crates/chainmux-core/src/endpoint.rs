//! Endpoint descriptors and the live set an adapter reads from.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// One remote server an adapter may talk to.
///
/// Descriptors are plain configuration; behavior lives in the invoker
/// and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Base URL or connection target.
    pub url: String,
    /// Credential attached per backend family rules at request time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: Some(api_key.into()),
        }
    }

    /// Identity used in logs and aggregate failures. Keys are attached
    /// at request time, so this never leaks a credential.
    pub fn identity(&self) -> &str {
        &self.url
    }

    /// Request target with the `{api_key}` placeholder filled in, for
    /// families that template the credential into the path.
    pub fn resolved_url(&self) -> String {
        match &self.api_key {
            Some(key) => self.url.replace("{api_key}", key),
            None => self.url.clone(),
        }
    }
}

/// The ordered endpoints one adapter currently uses.
///
/// Readers take whole-set snapshots and a reload swaps the entire
/// vector, so no reader ever observes a partial mix of old and new
/// entries. In-flight operations finish against the snapshot they
/// started with.
#[derive(Debug)]
pub struct EndpointSet {
    inner: ArcSwap<Vec<Endpoint>>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(endpoints),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Current endpoints as an owned snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        self.inner.load_full()
    }

    /// Replaces the whole set at once.
    pub fn replace(&self, endpoints: Vec<Endpoint>) {
        self.inner.store(Arc::new(endpoints));
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

impl From<Vec<Endpoint>> for EndpointSet {
    fn from(endpoints: Vec<Endpoint>) -> Self {
        Self::new(endpoints)
    }
}

impl FromIterator<Endpoint> for EndpointSet {
    fn from_iter<I: IntoIterator<Item = Endpoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_replace() {
        let set = EndpointSet::new(vec![Endpoint::new("https://a"), Endpoint::new("https://b")]);
        let before = set.snapshot();
        set.replace(vec![Endpoint::new("https://c")]);
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].url, "https://a");
        let after = set.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].url, "https://c");
    }

    #[test]
    fn empty_set_is_valid() {
        let set = EndpointSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        set.replace(vec![Endpoint::new("https://a")]);
        assert!(!set.is_empty());
    }

    #[test]
    fn resolved_url_fills_key_template() {
        let keyed = Endpoint::with_api_key("https://mainnet.infura.io/v3/{api_key}", "secret");
        assert_eq!(keyed.resolved_url(), "https://mainnet.infura.io/v3/secret");
        assert_eq!(keyed.identity(), "https://mainnet.infura.io/v3/{api_key}");

        let plain = Endpoint::new("https://cloudflare-eth.com");
        assert_eq!(plain.resolved_url(), "https://cloudflare-eth.com");
    }

    #[test]
    fn endpoint_config_roundtrip() {
        let json = r#"{"url":"https://node.example"}"#;
        let ep: Endpoint = serde_json::from_str(json).unwrap();
        assert_eq!(ep.api_key, None);
        assert_eq!(serde_json::to_string(&ep).unwrap(), json);

        let keyed = Endpoint::with_api_key("https://node.example", "k1");
        let text = serde_json::to_string(&keyed).unwrap();
        assert!(text.contains("\"api_key\":\"k1\""));
    }
}
