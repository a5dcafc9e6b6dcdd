//! chainmux-ws — persistent subscription socket for ChainMux.
//!
//! Indexer families that push address activity use this crate for the
//! `SubscribeAddress` operation: a background task owns one WebSocket
//! connection, reconnects with backoff, and replays the subscribed
//! address list after every reconnect. Query and broadcast traffic
//! stays on HTTP; only the push surface lives here.

pub mod socket;
pub mod subscriptions;

pub use socket::{WsConfig, WsSocket};
pub use subscriptions::AddressBook;
