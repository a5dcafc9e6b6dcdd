//! Etherscan-compatible explorer family.
//!
//! Explorer keys are metered, so reads walk a shuffled order serially
//! and stop at the first healthy server; only broadcast fans out in
//! parallel, where hitting several servers is harmless and latency
//! matters most.
//!
//! The wire envelope is `{ status, message, result }` for
//! `module=account` and a JSON-RPC body for `module=proxy`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chainmux_core::{
    bad_shape, expect_string, BroadcastAck, CallContext, CallError, Classifier, DispatchResult,
    Endpoint, EndpointSet, Fallback, FatalKind, Invoker, NetAdapter, Operation, Outcome, Strategy,
    Token, TokenBalance, TxQuery, TxRecord,
};
use chainmux_http::HttpTransport;

use crate::{hex_quantity, member, run_strategy};

/// Adapter for etherscan-style explorer APIs.
pub struct EvmScanAdapter {
    endpoints: EndpointSet,
    invoker: Invoker,
    fallback: Fallback,
}

impl EvmScanAdapter {
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
            "evmscan",
            op,
            self.strategy_for(op),
            &self.fallback,
            &self.endpoints,
            call,
        )
        .await
    }
}

/// Context for one explorer request. The key rides the real URL as the
/// trailing `apikey` parameter; the identity stops before it.
fn scan_cx(op: Operation, endpoint: &Endpoint, query: &str) -> CallContext {
    let base = endpoint.identity().trim_end_matches('/');
    let visible = format!("{base}/api?{query}");
    let url = match &endpoint.api_key {
        Some(key) => format!("{visible}&apikey={key}"),
        None => visible.clone(),
    };
    CallContext::with_identity(op, url, visible)
}

/// Unwraps a `module=account` envelope.
///
/// `status: "0"` is a backend-level rejection even on HTTP 200, with
/// one exception: an empty transaction page reports itself this way
/// and is an ordinary success.
fn scan_result(cx: &CallContext, reply: Value) -> Outcome<Value> {
    let status = reply.get("status").and_then(Value::as_str);
    let message = reply.get("message").and_then(Value::as_str).unwrap_or("");
    if status == Some("0") && !message.starts_with("No transactions found") {
        let detail = reply
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or(message)
            .to_string();
        return Err(CallError::fatal(
            FatalKind::Backend,
            format!("{} rejected by {}: {detail}", cx.op, cx.identity),
        ));
    }
    member(cx, &reply, "result")
}

fn decimal_field(entry: &Value, key: &str) -> Option<u64> {
    entry.get(key)?.as_str()?.parse().ok()
}

/// Lifts one explorer transaction row into a record. Only `hash` is
/// required; explorers omit block fields for pending entries.
fn map_scan_tx(cx: &CallContext, entry: &Value) -> Outcome<TxRecord> {
    let hash = entry
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_shape(cx, "transaction row with `hash`", entry))?;
    Ok(TxRecord {
        hash: hash.to_string(),
        block_height: decimal_field(entry, "blockNumber"),
        timestamp: decimal_field(entry, "timeStamp"),
        raw: entry.clone(),
    })
}

#[async_trait]
impl NetAdapter for EvmScanAdapter {
    fn name(&self) -> &'static str {
        "evmscan"
    }

    fn strategy_for(&self, op: Operation) -> Strategy {
        match op {
            Operation::FetchBlockHeight => Strategy::Serial,
            Operation::FetchNonce => Strategy::Serial,
            Operation::FetchTokenBalance => Strategy::Serial,
            Operation::FetchTokenBalances => Strategy::Unsupported,
            Operation::FetchTransactions => Strategy::Serial,
            Operation::Broadcast => Strategy::Parallel,
            Operation::GetBaseFee => Strategy::Unsupported,
            Operation::MulticastRaw => Strategy::Unsupported,
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
                let cx = scan_cx(
                    Operation::FetchBlockHeight,
                    &ep,
                    "module=proxy&action=eth_blockNumber",
                );
                let reply = invoker.get_json(&cx).await?;
                let result = member(&cx, &reply, "result")?;
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
                let cx = scan_cx(
                    Operation::FetchNonce,
                    &ep,
                    &format!(
                        "module=proxy&action=eth_getTransactionCount&address={address}&tag=latest"
                    ),
                );
                let reply = invoker.get_json(&cx).await?;
                let result = member(&cx, &reply, "result")?;
                hex_quantity(&cx, &result)
            }
        })
        .await
    }

    async fn fetch_token_balance(
        &self,
        address: &str,
        token: &Token,
    ) -> DispatchResult<TokenBalance> {
        let invoker = self.invoker.clone();
        let address = address.to_string();
        let token = token.clone();
        self.run(Operation::FetchTokenBalance, move |ep| {
            let invoker = invoker.clone();
            let address = address.clone();
            let token = token.clone();
            async move {
                let cx = scan_cx(
                    Operation::FetchTokenBalance,
                    &ep,
                    &format!(
                        "module=account&action=tokenbalance&contractaddress={}&address={address}&tag=latest",
                        token.contract_address
                    ),
                );
                let reply = invoker.get_json(&cx).await?;
                let result = scan_result(&cx, reply)?;
                let balance = result
                    .as_str()
                    .filter(|text| !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()))
                    .ok_or_else(|| bad_shape(&cx, "decimal balance string", &result))?;
                Ok(TokenBalance {
                    currency_code: token.currency_code.clone(),
                    balance: balance.to_string(),
                })
            }
        })
        .await
    }

    async fn fetch_transactions(&self, query: &TxQuery) -> DispatchResult<Vec<TxRecord>> {
        let invoker = self.invoker.clone();
        let query = query.clone();
        self.run(Operation::FetchTransactions, move |ep| {
            let invoker = invoker.clone();
            let query = query.clone();
            async move {
                let params = match &query.token {
                    Some(token) => format!(
                        "module=account&action=tokentx&contractaddress={}&address={}&startblock={}&endblock=99999999&sort=asc",
                        token.contract_address, query.address, query.start_block
                    ),
                    None => format!(
                        "module=account&action=txlist&address={}&startblock={}&endblock=99999999&sort=asc",
                        query.address, query.start_block
                    ),
                };
                let cx = scan_cx(Operation::FetchTransactions, &ep, &params);
                let reply = invoker.get_json(&cx).await?;
                let result = scan_result(&cx, reply)?;
                let rows = result
                    .as_array()
                    .ok_or_else(|| bad_shape(&cx, "transaction array", &result))?;
                rows.iter().map(|entry| map_scan_tx(&cx, entry)).collect()
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
                let cx = scan_cx(
                    Operation::Broadcast,
                    &ep,
                    &format!("module=proxy&action=eth_sendRawTransaction&hex={raw_tx}"),
                );
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmux_core::{FallbackConfig, RawResponse, Transport};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        replies: Vec<(&'static str, u16, String)>,
        gets: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<(&'static str, u16, String)>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                gets: Mutex::new(Vec::new()),
            })
        }

        fn gets(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, url: &str) -> Outcome<RawResponse> {
            self.gets.lock().unwrap().push(url.to_string());
            for (needle, status, body) in &self.replies {
                if url.contains(needle) {
                    return Ok(RawResponse::new(*status, body.as_bytes()));
                }
            }
            Err(CallError::Transient(format!("no script for {url}")))
        }

        async fn post_json(&self, url: &str, _body: &Value) -> Outcome<RawResponse> {
            Err(CallError::Transient(format!("unexpected post to {url}")))
        }
    }

    fn adapter(endpoints: Vec<Endpoint>, transport: Arc<Scripted>) -> EvmScanAdapter {
        EvmScanAdapter::with(
            EndpointSet::new(endpoints),
            Invoker::new(transport, Classifier::default()),
            Fallback::new(FallbackConfig {
                call_timeout: Duration::from_secs(1),
                shuffle_seed: Some(7),
            }),
        )
    }

    fn ok_account(result: Value) -> String {
        serde_json::json!({ "status": "1", "message": "OK", "result": result }).to_string()
    }

    #[tokio::test]
    async fn height_reads_proxy_envelope() {
        let transport = Scripted::new(vec![(
            "etherscan",
            200,
            r#"{"jsonrpc":"2.0","id":83,"result":"0x2a"}"#.to_string(),
        )]);
        let adapter = adapter(vec![Endpoint::new("https://api.etherscan.io")], transport.clone());

        assert_eq!(adapter.fetch_block_height().await.unwrap(), 42);
        let gets = transport.gets();
        assert!(gets[0].contains("module=proxy&action=eth_blockNumber"));
    }

    #[tokio::test]
    async fn serial_visits_every_limited_server_and_keeps_each_failure() {
        let transport = Scripted::new(vec![("scan", 429, String::new())]);
        let adapter = adapter(
            vec![Endpoint::new("https://scan-a"), Endpoint::new("https://scan-b")],
            transport.clone(),
        );

        let err = adapter.fetch_block_height().await.unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        assert_eq!(agg.title, "evmscan.fetch_block_height");
        assert_eq!(agg.len(), 2);
        assert!(agg.failures.iter().all(|f| f.error.is_rate_limited()));
        assert_eq!(transport.gets().len(), 2);
    }

    #[tokio::test]
    async fn token_balance_is_a_decimal_string() {
        let transport = Scripted::new(vec![("tokenbalance", 200, ok_account("135499".into()))]);
        let adapter = adapter(vec![Endpoint::new("https://api.etherscan.io")], transport.clone());

        let token = Token {
            currency_code: "USDC".to_string(),
            contract_address: "0xdead".to_string(),
        };
        let balance = adapter.fetch_token_balance("0xabc", &token).await.unwrap();
        assert_eq!(balance.currency_code, "USDC");
        assert_eq!(balance.balance, "135499");

        let url = &transport.gets()[0];
        assert!(url.contains("action=tokenbalance"));
        assert!(url.contains("contractaddress=0xdead"));
        assert!(url.contains("address=0xabc"));
        assert!(url.contains("tag=latest"));
    }

    #[tokio::test]
    async fn token_balance_rejects_non_decimal_result() {
        let transport = Scripted::new(vec![("tokenbalance", 200, ok_account("0x2a".into()))]);
        let adapter = adapter(vec![Endpoint::new("https://api.etherscan.io")], transport);

        let token = Token {
            currency_code: "USDC".to_string(),
            contract_address: "0xdead".to_string(),
        };
        let err = adapter.fetch_token_balance("0xabc", &token).await.unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        match &agg.failures[0].error {
            CallError::Fatal { kind, .. } => assert_eq!(*kind, FatalKind::BadShape),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transactions_map_rows_and_pick_the_token_action() {
        let rows = serde_json::json!([
            { "hash": "0xaaa", "blockNumber": "100", "timeStamp": "1700000000", "value": "1" },
            { "hash": "0xbbb", "blockNumber": "101", "timeStamp": "1700000600", "value": "2" }
        ]);
        let transport = Scripted::new(vec![
            ("action=txlist", 200, ok_account(rows.clone())),
            ("action=tokentx", 200, ok_account(rows)),
        ]);
        let adapter = adapter(vec![Endpoint::new("https://api.etherscan.io")], transport.clone());

        let native = TxQuery {
            address: "0xabc".to_string(),
            start_block: 123,
            token: None,
        };
        let records = adapter.fetch_transactions(&native).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hash, "0xaaa");
        assert_eq!(records[0].block_height, Some(100));
        assert_eq!(records[0].timestamp, Some(1_700_000_000));
        assert_eq!(records[0].raw["value"], "1");
        assert!(transport.gets()[0].contains("startblock=123&endblock=99999999&sort=asc"));

        let token_query = TxQuery {
            token: Some(Token {
                currency_code: "USDC".to_string(),
                contract_address: "0xdead".to_string(),
            }),
            ..native
        };
        adapter.fetch_transactions(&token_query).await.unwrap();
        let last = transport.gets().pop().unwrap();
        assert!(last.contains("action=tokentx"));
        assert!(last.contains("contractaddress=0xdead"));
    }

    #[tokio::test]
    async fn empty_history_page_is_success() {
        let body = serde_json::json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        })
        .to_string();
        let transport = Scripted::new(vec![("txlist", 200, body)]);
        let adapter = adapter(vec![Endpoint::new("https://api.etherscan.io")], transport);

        let query = TxQuery {
            address: "0xfresh".to_string(),
            start_block: 0,
            token: None,
        };
        assert!(adapter.fetch_transactions(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn envelope_rejection_is_fatal_not_rate_limited() {
        let body = serde_json::json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max rate limit reached"
        })
        .to_string();
        let transport = Scripted::new(vec![("tokenbalance", 200, body)]);
        let adapter = adapter(vec![Endpoint::new("https://api.etherscan.io")], transport);

        let token = Token {
            currency_code: "USDC".to_string(),
            contract_address: "0xdead".to_string(),
        };
        let err = adapter.fetch_token_balance("0xabc", &token).await.unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        let failure = &agg.failures[0].error;
        assert!(!failure.is_rate_limited());
        assert!(failure.to_string().contains("Max rate limit reached"));
    }

    #[tokio::test]
    async fn api_key_rides_requests_but_never_diagnostics() {
        let transport = Scripted::new(vec![("etherscan", 500, String::new())]);
        let adapter = adapter(
            vec![Endpoint::with_api_key("https://api.etherscan.io", "sekrit")],
            transport.clone(),
        );

        let err = adapter.fetch_block_height().await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("api.etherscan.io"));
        assert!(!text.contains("sekrit"));
        assert!(transport.gets()[0].ends_with("&apikey=sekrit"));
    }

    #[tokio::test]
    async fn capability_table_matches_the_family() {
        let adapter = adapter(vec![Endpoint::new("https://x")], Scripted::new(vec![]));
        assert_eq!(adapter.strategy_for(Operation::Broadcast), Strategy::Parallel);
        assert_eq!(
            adapter.strategy_for(Operation::FetchTransactions),
            Strategy::Serial
        );
        assert_eq!(
            adapter.strategy_for(Operation::FetchTokenBalances),
            Strategy::Unsupported
        );
        assert_eq!(
            adapter.strategy_for(Operation::MulticastRaw),
            Strategy::Unsupported
        );
    }
}
