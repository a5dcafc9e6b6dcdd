//! chainmux-adapters — backend family adapters for ChainMux.
//!
//! Three families cover the usual provider landscape:
//!
//! - [`RpcAdapter`] — JSON-RPC nodes, raced in parallel
//! - [`EvmScanAdapter`] — etherscan-style explorer APIs, serial over a
//!   shuffled order to respect metered keys
//! - [`BlockbookAdapter`] — blockbook indexers, serial REST plus a
//!   persistent WebSocket push surface
//!
//! [`AdapterConfig`] and [`make_adapter`] assemble any of them from
//! plain configuration; [`router_from_configs`] builds the priority
//! router for a whole session.

pub mod blockbook;
pub mod evmscan;
pub mod profiles;
pub mod rpc;

pub use blockbook::BlockbookAdapter;
pub use evmscan::EvmScanAdapter;
pub use rpc::RpcAdapter;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainmux_core::{
    bad_shape, CallContext, Classifier, DispatchError, DispatchResult, Endpoint, EndpointSet,
    Fallback, FallbackConfig, Invoker, NetAdapter, Operation, Outcome, Router, Strategy, Transport,
};
use chainmux_http::HttpTransport;

/// Backend families ChainMux ships adapters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Rpc,
    Evmscan,
    Blockbook,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Evmscan => "evmscan",
            Self::Blockbook => "blockbook",
        }
    }
}

/// Configuration for one adapter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub family: Family,
    pub endpoints: Vec<Endpoint>,
    /// Statuses this family treats as rate limiting. Defaults to
    /// 402/429/432, which is what most providers overload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_statuses: Option<Vec<u16>>,
    /// Per-call budget in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
}

impl AdapterConfig {
    pub fn new(family: Family, endpoints: Vec<Endpoint>) -> Self {
        Self {
            family,
            endpoints,
            rate_limit_statuses: None,
            call_timeout_ms: None,
        }
    }

    fn classifier(&self) -> Classifier {
        match &self.rate_limit_statuses {
            Some(statuses) => Classifier::new(statuses.iter().copied()),
            None => Classifier::default(),
        }
    }

    fn fallback(&self) -> Fallback {
        let mut config = FallbackConfig::default();
        if let Some(ms) = self.call_timeout_ms {
            config.call_timeout = Duration::from_millis(ms);
        }
        Fallback::new(config)
    }
}

/// Builds one adapter over the given transport.
pub fn make_adapter(config: &AdapterConfig, transport: Arc<dyn Transport>) -> Arc<dyn NetAdapter> {
    let invoker = Invoker::new(transport, config.classifier());
    let fallback = config.fallback();
    let endpoints = EndpointSet::new(config.endpoints.clone());
    match config.family {
        Family::Rpc => Arc::new(RpcAdapter::with(endpoints, invoker, fallback)),
        Family::Evmscan => Arc::new(EvmScanAdapter::with(endpoints, invoker, fallback)),
        Family::Blockbook => Arc::new(BlockbookAdapter::with(endpoints, invoker, fallback)),
    }
}

/// Builds the session router: one adapter per entry, priority in slice
/// order, all sharing one HTTP transport.
pub fn router_from_configs(configs: &[AdapterConfig]) -> Router {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::default());
    let adapters = configs
        .iter()
        .map(|config| make_adapter(config, transport.clone()))
        .collect();
    Router::new(adapters)
}

/// Runs `call` under the strategy an adapter's table declares for
/// `op`, with the aggregate titled `family.operation`.
pub(crate) async fn run_strategy<T, F, Fut>(
    family: &'static str,
    op: Operation,
    strategy: Strategy,
    fallback: &Fallback,
    endpoints: &EndpointSet,
    call: F,
) -> DispatchResult<T>
where
    F: Fn(Endpoint) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let title = format!("{family}.{op}");
    match strategy {
        Strategy::Serial => fallback.serial(&title, op, endpoints, call).await,
        Strategy::Parallel => fallback.parallel(&title, op, endpoints, call).await,
        Strategy::Single => fallback.single(&title, op, endpoints, call).await,
        Strategy::Unsupported => Err(DispatchError::Unsupported(op)),
    }
}

/// Pulls a named member out of a reply, shape-checking its presence.
/// A `null` member is allowed; absence is a contract violation.
pub(crate) fn member(cx: &CallContext, reply: &Value, key: &str) -> Outcome<Value> {
    match reply.get(key) {
        Some(value) => Ok(value.clone()),
        None => Err(bad_shape(cx, &format!("`{key}` member"), reply)),
    }
}

/// Parses an `0x`-prefixed hex quantity the way JSON-RPC encodes them.
pub(crate) fn hex_quantity(cx: &CallContext, value: &Value) -> Outcome<u64> {
    let text = value
        .as_str()
        .ok_or_else(|| bad_shape(cx, "hex quantity string", value))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|_| bad_shape(cx, "hex quantity string", value))
}
