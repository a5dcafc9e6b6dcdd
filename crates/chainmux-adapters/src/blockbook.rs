//! Blockbook indexer family (Trezor-style REST plus WebSocket push).
//!
//! REST reads walk a shuffled serial order like the explorer family.
//! Address subscriptions ride one persistent socket to the first
//! configured endpoint; the socket is created lazily on first
//! subscribe and torn down on shutdown or drop.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use chainmux_core::{
    bad_shape, expect_string, AggregateFailure, BroadcastAck, CallContext, Classifier,
    DispatchError, DispatchResult, Endpoint, EndpointSet, EventSink, Fallback, Invoker, NetAdapter,
    Operation, Outcome, Strategy, TokenBalance, TxQuery, TxRecord,
};
use chainmux_http::HttpTransport;
use chainmux_ws::{WsConfig, WsSocket};

use crate::{member, run_strategy};

/// Adapter for blockbook indexer instances.
pub struct BlockbookAdapter {
    endpoints: EndpointSet,
    invoker: Invoker,
    fallback: Fallback,
    ws_config: WsConfig,
    /// Live subscription socket, created on first subscribe.
    socket: Mutex<Option<Arc<WsSocket>>>,
}

impl BlockbookAdapter {
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
            ws_config: WsConfig::default(),
            socket: Mutex::new(None),
        }
    }

    pub fn with_ws_config(mut self, config: WsConfig) -> Self {
        self.ws_config = config;
        self
    }

    async fn run<T, F, Fut>(&self, op: Operation, call: F) -> DispatchResult<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        run_strategy(
            "blockbook",
            op,
            self.strategy_for(op),
            &self.fallback,
            &self.endpoints,
            call,
        )
        .await
    }

    /// The live socket, connecting to the first endpoint if none is up.
    async fn socket(&self) -> DispatchResult<Arc<WsSocket>> {
        let mut slot = self.socket.lock().await;
        if let Some(socket) = slot.as_ref() {
            return Ok(socket.clone());
        }
        let snapshot = self.endpoints.snapshot();
        let endpoint = snapshot
            .first()
            .ok_or(DispatchError::NoEndpoints(Operation::SubscribeAddress))?;
        let socket = Arc::new(WsSocket::connect(
            ws_url(endpoint.identity()),
            self.ws_config.clone(),
        ));
        *slot = Some(socket.clone());
        Ok(socket)
    }
}

fn api_cx(op: Operation, endpoint: &Endpoint, path: &str) -> CallContext {
    let base = endpoint.identity().trim_end_matches('/');
    CallContext::new(op, format!("{base}/api/v2{path}"))
}

/// Subscription URL for a blockbook base URL.
fn ws_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let switched = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{switched}/websocket")
}

/// Blockbook reports numbers as strings on some chains and as JSON
/// numbers on others.
fn uint_field(cx: &CallContext, reply: &Value, key: &str) -> Outcome<u64> {
    let value = reply
        .get(key)
        .ok_or_else(|| bad_shape(cx, &format!("`{key}` member"), reply))?;
    match value {
        Value::String(text) => text
            .parse()
            .map_err(|_| bad_shape(cx, &format!("numeric `{key}`"), value)),
        other => other
            .as_u64()
            .ok_or_else(|| bad_shape(cx, &format!("numeric `{key}`"), other)),
    }
}

fn map_token_row(cx: &CallContext, row: &Value) -> Outcome<TokenBalance> {
    let code = row
        .get("symbol")
        .and_then(Value::as_str)
        .or_else(|| row.get("contract").and_then(Value::as_str))
        .ok_or_else(|| bad_shape(cx, "token row with `symbol` or `contract`", row))?;
    let balance = row
        .get("balance")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_shape(cx, "token row with `balance`", row))?;
    Ok(TokenBalance {
        currency_code: code.to_string(),
        balance: balance.to_string(),
    })
}

/// One page row. `blockHeight` is negative while the transaction sits
/// in the mempool.
fn map_page_tx(cx: &CallContext, row: &Value) -> Outcome<TxRecord> {
    let hash = row
        .get("txid")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_shape(cx, "transaction row with `txid`", row))?;
    Ok(TxRecord {
        hash: hash.to_string(),
        block_height: row
            .get("blockHeight")
            .and_then(Value::as_i64)
            .filter(|height| *height >= 0)
            .map(|height| height as u64),
        timestamp: row.get("blockTime").and_then(Value::as_u64),
        raw: row.clone(),
    })
}

#[async_trait]
impl NetAdapter for BlockbookAdapter {
    fn name(&self) -> &'static str {
        "blockbook"
    }

    fn strategy_for(&self, op: Operation) -> Strategy {
        match op {
            Operation::FetchBlockHeight => Strategy::Serial,
            Operation::FetchNonce => Strategy::Serial,
            Operation::FetchTokenBalance => Strategy::Unsupported,
            Operation::FetchTokenBalances => Strategy::Serial,
            Operation::FetchTransactions => Strategy::Serial,
            Operation::Broadcast => Strategy::Serial,
            Operation::GetBaseFee => Strategy::Unsupported,
            Operation::MulticastRaw => Strategy::Unsupported,
            Operation::SubscribeAddress => Strategy::Single,
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
                let cx = api_cx(Operation::FetchBlockHeight, &ep, "");
                let status = invoker.get_json(&cx).await?;
                let index = member(&cx, &status, "blockbook")?;
                uint_field(&cx, &index, "bestHeight")
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
                let cx = api_cx(
                    Operation::FetchNonce,
                    &ep,
                    &format!("/address/{address}?details=basic"),
                );
                let info = invoker.get_json(&cx).await?;
                uint_field(&cx, &info, "nonce")
            }
        })
        .await
    }

    async fn fetch_token_balances(&self, address: &str) -> DispatchResult<Vec<TokenBalance>> {
        let invoker = self.invoker.clone();
        let address = address.to_string();
        self.run(Operation::FetchTokenBalances, move |ep| {
            let invoker = invoker.clone();
            let address = address.clone();
            async move {
                let cx = api_cx(
                    Operation::FetchTokenBalances,
                    &ep,
                    &format!("/address/{address}?details=tokenBalances"),
                );
                let info = invoker.get_json(&cx).await?;
                match info.get("tokens") {
                    // An address that holds no tokens has no list at all.
                    None | Some(Value::Null) => Ok(Vec::new()),
                    Some(Value::Array(rows)) => {
                        rows.iter().map(|row| map_token_row(&cx, row)).collect()
                    }
                    Some(other) => Err(bad_shape(&cx, "`tokens` array", other)),
                }
            }
        })
        .await
    }

    /// Pages carry native and token activity together; `raw` keeps the
    /// full row so callers can split on `tokenTransfers`.
    async fn fetch_transactions(&self, query: &TxQuery) -> DispatchResult<Vec<TxRecord>> {
        let invoker = self.invoker.clone();
        let query = query.clone();
        self.run(Operation::FetchTransactions, move |ep| {
            let invoker = invoker.clone();
            let query = query.clone();
            async move {
                let cx = api_cx(
                    Operation::FetchTransactions,
                    &ep,
                    &format!(
                        "/address/{}?details=txs&from={}&pageSize=50",
                        query.address, query.start_block
                    ),
                );
                let info = invoker.get_json(&cx).await?;
                match info.get("transactions") {
                    None | Some(Value::Null) => Ok(Vec::new()),
                    Some(Value::Array(rows)) => {
                        rows.iter().map(|row| map_page_tx(&cx, row)).collect()
                    }
                    Some(other) => Err(bad_shape(&cx, "`transactions` array", other)),
                }
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
                let cx = api_cx(Operation::Broadcast, &ep, &format!("/sendtx/{raw_tx}"));
                let reply = invoker.get_json(&cx).await?;
                let result = member(&cx, &reply, "result")?;
                let ack = expect_string(&cx, &result)?;
                Ok(BroadcastAck {
                    endpoint: cx.identity.clone(),
                    ack,
                })
            }
        })
        .await
    }

    async fn subscribe_address(&self, address: &str, sink: EventSink) -> DispatchResult<()> {
        let socket = self.socket().await?;
        let address = address.to_string();
        self.run(Operation::SubscribeAddress, move |_ep| {
            let socket = socket.clone();
            let sink = sink.clone();
            let address = address.clone();
            async move { socket.subscribe(&address, sink).await }
        })
        .await
    }

    async fn unsubscribe_address(&self, address: &str) -> DispatchResult<()> {
        let socket = match self.socket.lock().await.as_ref() {
            Some(socket) => socket.clone(),
            // Nothing subscribed means nothing to undo.
            None => return Ok(()),
        };
        socket.unsubscribe(address).await.map_err(|error| {
            let mut agg = AggregateFailure::new("blockbook.unsubscribe_address");
            agg.push(socket.url(), error);
            DispatchError::AllFailed(agg)
        })
    }

    async fn shutdown(&self) {
        if let Some(socket) = self.socket.lock().await.take() {
            tracing::debug!(url = %socket.url(), "closing subscription socket");
        }
    }
}
