//! Generic JSON-RPC node family.
//!
//! Node endpoints are interchangeable and mostly unmetered, so every
//! supported operation races the whole set in parallel: the fastest
//! healthy node answers and the rest are cancelled.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use chainmux_core::{
    expect_string, BroadcastAck, CallContext, Classifier, DispatchResult, Endpoint, EndpointSet,
    Fallback, Invoker, NetAdapter, Operation, Outcome, RawReply, Strategy,
};
use chainmux_http::HttpTransport;

use crate::{hex_quantity, member, run_strategy};

/// Adapter for plain JSON-RPC nodes.
pub struct RpcAdapter {
    endpoints: EndpointSet,
    invoker: Invoker,
    fallback: Fallback,
}

impl RpcAdapter {
    /// Adapter over the default HTTP transport and classifier.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self::with(
            EndpointSet::new(endpoints),
            Invoker::new(Arc::new(HttpTransport::default()), Classifier::default()),
            Fallback::default(),
        )
    }

    pub fn with(endpoints: EndpointSet, invoker: Invoker, fallback: Fallback) -> Self {
        Self {
            endpoints,
            invoker,
            fallback,
        }
    }

    async fn run<T, F, Fut>(&self, op: Operation, call: F) -> DispatchResult<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        run_strategy(
            "rpc",
            op,
            self.strategy_for(op),
            &self.fallback,
            &self.endpoints,
            call,
        )
        .await
    }
}

/// One JSON-RPC exchange: POST the envelope, return the `result`
/// member. The classifier has already turned `error` bodies and bad
/// statuses into failures by the time this sees the reply.
async fn rpc_call(
    invoker: &Invoker,
    cx: &CallContext,
    method: &str,
    params: Value,
) -> Outcome<Value> {
    let envelope = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let reply = invoker.post_json(cx, &envelope).await?;
    member(cx, &reply, "result")
}

fn cx_for(op: Operation, endpoint: &Endpoint) -> CallContext {
    CallContext::with_identity(op, endpoint.resolved_url(), endpoint.identity())
}

#[async_trait]
impl NetAdapter for RpcAdapter {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn strategy_for(&self, op: Operation) -> Strategy {
        match op {
            Operation::FetchBlockHeight => Strategy::Parallel,
            Operation::FetchNonce => Strategy::Parallel,
            Operation::FetchTokenBalance => Strategy::Unsupported,
            Operation::FetchTokenBalances => Strategy::Unsupported,
            Operation::FetchTransactions => Strategy::Unsupported,
            Operation::Broadcast => Strategy::Parallel,
            Operation::GetBaseFee => Strategy::Parallel,
            Operation::MulticastRaw => Strategy::Parallel,
            Operation::SubscribeAddress => Strategy::Unsupported,
        }
    }

    fn replace_endpoints(&self, endpoints: Vec<Endpoint>) {
        self.endpoints.replace(endpoints);
    }

    async fn fetch_block_height(&self) -> DispatchResult<u64> {
        let invoker = self.invoker.clone();
        self.run(Operation::FetchBlockHeight, move |ep| {
            let invoker = invoker.clone();
            async move {
                let cx = cx_for(Operation::FetchBlockHeight, &ep);
                let result = rpc_call(&invoker, &cx, "eth_blockNumber", json!([])).await?;
                hex_quantity(&cx, &result)
            }
        })
        .await
    }

    async fn fetch_nonce(&self, address: &str) -> DispatchResult<u64> {
        let invoker = self.invoker.clone();
        let address = address.to_string();
        self.run(Operation::FetchNonce, move |ep| {
            let invoker = invoker.clone();
            let address = address.clone();
            async move {
                let cx = cx_for(Operation::FetchNonce, &ep);
                let result = rpc_call(
                    &invoker,
                    &cx,
                    "eth_getTransactionCount",
                    json!([address, "latest"]),
                )
                .await?;
                hex_quantity(&cx, &result)
            }
        })
        .await
    }

    async fn broadcast(&self, raw_tx: &str) -> DispatchResult<BroadcastAck> {
        let invoker = self.invoker.clone();
        let raw_tx = raw_tx.to_string();
        self.run(Operation::Broadcast, move |ep| {
            let invoker = invoker.clone();
            let raw_tx = raw_tx.clone();
            async move {
                let cx = cx_for(Operation::Broadcast, &ep);
                let result =
                    rpc_call(&invoker, &cx, "eth_sendRawTransaction", json!([raw_tx])).await?;
                let ack = expect_string(&cx, &result)?;
                Ok(BroadcastAck {
                    endpoint: cx.identity.clone(),
                    ack,
                })
            }
        })
        .await
    }

    async fn base_fee(&self) -> DispatchResult<u64> {
        let invoker = self.invoker.clone();
        self.run(Operation::GetBaseFee, move |ep| {
            let invoker = invoker.clone();
            async move {
                let cx = cx_for(Operation::GetBaseFee, &ep);
                let block = rpc_call(
                    &invoker,
                    &cx,
                    "eth_getBlockByNumber",
                    json!(["latest", false]),
                )
                .await?;
                let fee = member(&cx, &block, "baseFeePerGas")?;
                hex_quantity(&cx, &fee)
            }
        })
        .await
    }

    async fn multicast_raw(&self, method: &str, params: &Value) -> DispatchResult<RawReply> {
        let invoker = self.invoker.clone();
        let method = method.to_string();
        let params = params.clone();
        self.run(Operation::MulticastRaw, move |ep| {
            let invoker = invoker.clone();
            let method = method.clone();
            let params = params.clone();
            async move {
                let cx = cx_for(Operation::MulticastRaw, &ep);
                let result = rpc_call(&invoker, &cx, &method, params).await?;
                Ok(RawReply {
                    endpoint: cx.identity.clone(),
                    result,
                })
            }
        })
        .await
    }
}
