//! chainmux-core — foundation traits and types for ChainMux.
//!
//! # Overview
//!
//! ChainMux is a multi-provider network-access layer for blockchain
//! backends: it turns a set of untrusted, heterogeneous, rate-limited
//! endpoints into one reliable answer per logical operation. The core
//! crate defines:
//!
//! - [`Operation`] / [`Strategy`] — the fixed operation surface and
//!   per-operation orchestration choices
//! - [`Classifier`] / [`CallError`] — pure response classification
//! - [`Transport`] / [`Invoker`] — the one-shot wire boundary
//! - [`Fallback`] — serial, parallel, and single-shot strategy runs
//! - [`NetAdapter`] — the trait each backend family implements
//! - [`Router`] — priority dispatch across adapter families

pub mod adapter;
pub mod classify;
pub mod endpoint;
pub mod error;
pub mod fallback;
pub mod operation;
pub mod outcome;
pub mod router;
pub mod transport;

pub use adapter::{EventSink, NetAdapter};
pub use classify::{bad_shape, expect_string, CallContext, Classifier, DEFAULT_RATE_LIMIT_STATUSES};
pub use endpoint::{Endpoint, EndpointSet};
pub use error::{DispatchError, DispatchResult};
pub use fallback::{Fallback, FallbackConfig};
pub use operation::{
    AddressEvent, BroadcastAck, Operation, RawReply, Strategy, Token, TokenBalance, TxQuery,
    TxRecord,
};
pub use outcome::{AggregateFailure, CallError, EndpointFailure, FatalKind, Outcome};
pub use router::Router;
pub use transport::{Invoker, RawResponse, Transport};
