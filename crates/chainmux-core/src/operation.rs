//! The logical operation surface and its argument/payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical operations a chain session can issue against the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchBlockHeight,
    FetchNonce,
    FetchTokenBalance,
    FetchTokenBalances,
    FetchTransactions,
    Broadcast,
    GetBaseFee,
    MulticastRaw,
    SubscribeAddress,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 9] = [
        Self::FetchBlockHeight,
        Self::FetchNonce,
        Self::FetchTokenBalance,
        Self::FetchTokenBalances,
        Self::FetchTransactions,
        Self::Broadcast,
        Self::GetBaseFee,
        Self::MulticastRaw,
        Self::SubscribeAddress,
    ];

    /// Stable name used in log fields and error text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchBlockHeight => "fetch_block_height",
            Self::FetchNonce => "fetch_nonce",
            Self::FetchTokenBalance => "fetch_token_balance",
            Self::FetchTokenBalances => "fetch_token_balances",
            Self::FetchTransactions => "fetch_transactions",
            Self::Broadcast => "broadcast",
            Self::GetBaseFee => "get_base_fee",
            Self::MulticastRaw => "multicast_raw",
            Self::SubscribeAddress => "subscribe_address",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an adapter tries its endpoints for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Shuffled, one endpoint at a time, first success short-circuits.
    Serial,
    /// All endpoints raced concurrently, first success wins.
    Parallel,
    /// Exactly one invocation against the designated endpoint.
    Single,
    /// The adapter does not implement this operation.
    Unsupported,
}

impl Strategy {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// A token the caller wants balances or transfers for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Currency code, e.g. `"USDC"`.
    pub currency_code: String,
    /// Contract address, for families that key on one.
    pub contract_address: String,
}

/// One token balance as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub currency_code: String,
    /// Integer string in the token's smallest unit.
    pub balance: String,
}

/// Arguments for `FetchTransactions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxQuery {
    pub address: String,
    /// First block of interest; earlier history is skipped.
    pub start_block: u64,
    /// Restrict to one token's transfers; `None` means the native asset.
    pub token: Option<Token>,
}

/// One raw transaction record from a backend.
///
/// The engine layer interprets `raw`; this layer only guarantees the
/// identifying fields were present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    pub block_height: Option<u64>,
    pub timestamp: Option<u64>,
    pub raw: Value,
}

/// Success payload of `Broadcast`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastAck {
    /// The endpoint that accepted the transaction.
    pub endpoint: String,
    /// Provider-returned acknowledgement, usually the transaction hash.
    pub ack: String,
}

/// Success payload of `MulticastRaw`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReply {
    /// The endpoint whose reply won the race.
    pub endpoint: String,
    pub result: Value,
}

/// One push event observed for a subscribed address.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressEvent {
    pub address: String,
    /// The endpoint that observed the event.
    pub endpoint: String,
    /// Backend-specific notification payload.
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_are_unique() {
        let mut names: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn strategy_support() {
        assert!(Strategy::Serial.is_supported());
        assert!(Strategy::Parallel.is_supported());
        assert!(Strategy::Single.is_supported());
        assert!(!Strategy::Unsupported.is_supported());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Operation::Broadcast.to_string(), "broadcast");
        assert_eq!(Operation::FetchBlockHeight.to_string(), "fetch_block_height");
    }
}
