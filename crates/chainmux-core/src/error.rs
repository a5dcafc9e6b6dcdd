//! Errors surfaced past the orchestration boundary.
//!
//! Everything below the orchestrator communicates through
//! [`crate::Outcome`]; only the end-of-strategy and routing failures
//! here ever reach a caller.

use thiserror::Error;

use crate::operation::Operation;
use crate::outcome::AggregateFailure;

/// Failure of one logical operation after all fallback policy has run.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The adapter selected for the operation has an empty endpoint
    /// set. Distinguishable from "every endpoint failed" so operators
    /// can spot configuration mistakes.
    #[error("no endpoints configured for {0}")]
    NoEndpoints(Operation),

    /// Nothing in the configuration declares support for the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(Operation),

    /// Every endpoint in the chosen strategy run failed.
    #[error(transparent)]
    AllFailed(#[from] AggregateFailure),
}

impl DispatchError {
    /// The per-endpoint detail, when the failure carries any.
    pub fn aggregate(&self) -> Option<&AggregateFailure> {
        match self {
            Self::AllFailed(agg) => Some(agg),
            _ => None,
        }
    }
}

/// Result of one logical operation as seen by the chain-engine layer.
pub type DispatchResult<T> = Result<T, DispatchError>;
