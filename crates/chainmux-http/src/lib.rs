//! chainmux-http — the `reqwest`-backed wire transport for ChainMux.
//!
//! Exactly one round trip per call, no retry, no fallback; those live
//! in `chainmux-core`'s orchestrator. This crate only maps the HTTP
//! client's failure modes onto the outcome taxonomy and hands raw
//! status/body pairs to the classifier.

pub mod client;

pub use client::{HttpTransport, HttpTransportConfig};
