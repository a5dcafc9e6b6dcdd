//! The uniform operation surface every backend family implements.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::error::{DispatchError, DispatchResult};
use crate::operation::{
    AddressEvent, BroadcastAck, Operation, RawReply, Strategy, Token, TokenBalance, TxQuery,
    TxRecord,
};

/// Callback invoked at most once per observed event for a subscribed
/// address. No ordering is guaranteed between events from different
/// endpoints; registration lasts until an explicit unsubscribe or
/// adapter teardown.
pub type EventSink = Arc<dyn Fn(AddressEvent) + Send + Sync>;

/// One backend family's view of the operation surface.
///
/// `strategy_for` is the family's capability table: a total function
/// over [`Operation`], so every adapter takes a compiler-checked
/// position on every operation. The provided method bodies refuse with
/// [`DispatchError::Unsupported`]; a family only overrides what its
/// table admits.
#[async_trait]
pub trait NetAdapter: Send + Sync {
    /// Family name used in router logs and aggregate titles.
    fn name(&self) -> &'static str;

    /// Capability table: which strategy serves each operation, if any.
    fn strategy_for(&self, op: Operation) -> Strategy;

    fn supports(&self, op: Operation) -> bool {
        self.strategy_for(op).is_supported()
    }

    /// Replaces the endpoint set wholesale. In-flight operations
    /// finish against the snapshot they started with.
    fn replace_endpoints(&self, endpoints: Vec<Endpoint>);

    async fn fetch_block_height(&self) -> DispatchResult<u64> {
        Err(DispatchError::Unsupported(Operation::FetchBlockHeight))
    }

    async fn fetch_nonce(&self, _address: &str) -> DispatchResult<u64> {
        Err(DispatchError::Unsupported(Operation::FetchNonce))
    }

    async fn fetch_token_balance(
        &self,
        _address: &str,
        _token: &Token,
    ) -> DispatchResult<TokenBalance> {
        Err(DispatchError::Unsupported(Operation::FetchTokenBalance))
    }

    async fn fetch_token_balances(&self, _address: &str) -> DispatchResult<Vec<TokenBalance>> {
        Err(DispatchError::Unsupported(Operation::FetchTokenBalances))
    }

    async fn fetch_transactions(&self, _query: &TxQuery) -> DispatchResult<Vec<TxRecord>> {
        Err(DispatchError::Unsupported(Operation::FetchTransactions))
    }

    async fn broadcast(&self, _raw_tx: &str) -> DispatchResult<BroadcastAck> {
        Err(DispatchError::Unsupported(Operation::Broadcast))
    }

    async fn base_fee(&self) -> DispatchResult<u64> {
        Err(DispatchError::Unsupported(Operation::GetBaseFee))
    }

    /// Family-specific raw call outside the fixed operation surface,
    /// fanned out with the parallel strategy.
    async fn multicast_raw(&self, _method: &str, _params: &Value) -> DispatchResult<RawReply> {
        Err(DispatchError::Unsupported(Operation::MulticastRaw))
    }

    async fn subscribe_address(&self, _address: &str, _sink: EventSink) -> DispatchResult<()> {
        Err(DispatchError::Unsupported(Operation::SubscribeAddress))
    }

    async fn unsubscribe_address(&self, _address: &str) -> DispatchResult<()> {
        Err(DispatchError::Unsupported(Operation::SubscribeAddress))
    }

    /// Releases live connections on every exit path. Idempotent.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeightOnly;

    #[async_trait]
    impl NetAdapter for HeightOnly {
        fn name(&self) -> &'static str {
            "height_only"
        }

        fn strategy_for(&self, op: Operation) -> Strategy {
            match op {
                Operation::FetchBlockHeight => Strategy::Parallel,
                _ => Strategy::Unsupported,
            }
        }

        fn replace_endpoints(&self, _endpoints: Vec<Endpoint>) {}

        async fn fetch_block_height(&self) -> DispatchResult<u64> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn table_and_defaults_agree() {
        let adapter = HeightOnly;
        assert!(adapter.supports(Operation::FetchBlockHeight));
        assert!(!adapter.supports(Operation::Broadcast));

        assert_eq!(adapter.fetch_block_height().await.unwrap(), 1);
        let err = adapter.broadcast("0x00").await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Unsupported(Operation::Broadcast)
        ));
    }
}
