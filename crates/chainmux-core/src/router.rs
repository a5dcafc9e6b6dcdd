//! Priority dispatch across the configured adapter families.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::{EventSink, NetAdapter};
use crate::error::{DispatchError, DispatchResult};
use crate::operation::{BroadcastAck, Operation, RawReply, Token, TokenBalance, TxQuery, TxRecord};

/// Ordered set of active adapters for one chain session.
///
/// Dispatch picks the first adapter whose capability table admits the
/// operation and delegates to it. A failed strategy run does not fall
/// through to the next family: families sit at different trust and
/// cost tiers, and silently crossing tiers would mask a systematic
/// backend incompatibility behind a quieter one.
pub struct Router {
    adapters: Vec<Arc<dyn NetAdapter>>,
}

impl Router {
    pub fn new(adapters: Vec<Arc<dyn NetAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn adapters(&self) -> &[Arc<dyn NetAdapter>] {
        &self.adapters
    }

    /// First family in priority order that supports `op`.
    fn pick(&self, op: Operation) -> DispatchResult<&dyn NetAdapter> {
        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.supports(op))
            .ok_or(DispatchError::Unsupported(op))?;
        tracing::debug!(adapter = adapter.name(), op = op.as_str(), "dispatching");
        Ok(adapter.as_ref())
    }

    pub async fn fetch_block_height(&self) -> DispatchResult<u64> {
        self.pick(Operation::FetchBlockHeight)?
            .fetch_block_height()
            .await
    }

    pub async fn fetch_nonce(&self, address: &str) -> DispatchResult<u64> {
        self.pick(Operation::FetchNonce)?.fetch_nonce(address).await
    }

    pub async fn fetch_token_balance(
        &self,
        address: &str,
        token: &Token,
    ) -> DispatchResult<TokenBalance> {
        self.pick(Operation::FetchTokenBalance)?
            .fetch_token_balance(address, token)
            .await
    }

    pub async fn fetch_token_balances(&self, address: &str) -> DispatchResult<Vec<TokenBalance>> {
        self.pick(Operation::FetchTokenBalances)?
            .fetch_token_balances(address)
            .await
    }

    pub async fn fetch_transactions(&self, query: &TxQuery) -> DispatchResult<Vec<TxRecord>> {
        self.pick(Operation::FetchTransactions)?
            .fetch_transactions(query)
            .await
    }

    pub async fn broadcast(&self, raw_tx: &str) -> DispatchResult<BroadcastAck> {
        self.pick(Operation::Broadcast)?.broadcast(raw_tx).await
    }

    pub async fn base_fee(&self) -> DispatchResult<u64> {
        self.pick(Operation::GetBaseFee)?.base_fee().await
    }

    /// Raw pass-through for family-specific calls outside the fixed
    /// operation surface.
    pub async fn multicast_raw(&self, method: &str, params: &Value) -> DispatchResult<RawReply> {
        self.pick(Operation::MulticastRaw)?
            .multicast_raw(method, params)
            .await
    }

    pub async fn subscribe_address(&self, address: &str, sink: EventSink) -> DispatchResult<()> {
        self.pick(Operation::SubscribeAddress)?
            .subscribe_address(address, sink)
            .await
    }

    pub async fn unsubscribe_address(&self, address: &str) -> DispatchResult<()> {
        self.pick(Operation::SubscribeAddress)?
            .unsubscribe_address(address)
            .await
    }

    /// Tears down every adapter, releasing live connections.
    pub async fn shutdown(&self) {
        for adapter in &self.adapters {
            adapter.shutdown().await;
        }
    }
}
