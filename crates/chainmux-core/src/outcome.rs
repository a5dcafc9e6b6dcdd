//! Classified call outcomes and the aggregate failure record.

use thiserror::Error;

/// Why a `Fatal` outcome is fatal.
///
/// Kept apart from the message so metrics can count parse failures
/// separately from shape violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalKind {
    /// Non-2xx HTTP status outside the rate-limit set.
    Status,
    /// The server answered 2xx but embedded an error in the body.
    Backend,
    /// The body parsed as JSON but lacked the expected success shape.
    BadShape,
    /// The body was not valid JSON at all.
    BadJson,
}

impl FatalKind {
    /// Static label for log/metrics fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Backend => "backend",
            Self::BadShape => "bad_shape",
            Self::BadJson => "bad_json",
        }
    }
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure from one call to one endpoint.
///
/// Every expected failure mode travels through this type; nothing in the
/// invoker or classifier panics or throws past its boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The endpoint is rate limiting us. Expected and recoverable —
    /// try a different endpoint, never the same one immediately.
    #[error("rate limited")]
    RateLimited,

    /// Transport-level failure (connection refused, timeout, TLS).
    /// Retryable by trying another endpoint.
    #[error("transient: {0}")]
    Transient(String),

    /// Protocol or data-shape violation, or an explicit backend error.
    /// Retryable only by a different adapter family.
    #[error("fatal ({kind}): {message}")]
    Fatal { kind: FatalKind, message: String },
}

impl CallError {
    /// Build a `Fatal` error.
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal { kind, message: message.into() }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// The classified result of one endpoint invocation.
pub type Outcome<T> = Result<T, CallError>;

/// One endpoint's failure inside an [`AggregateFailure`].
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointFailure {
    /// Endpoint identity — the URL with any API key redacted.
    pub endpoint: String,
    pub error: CallError,
}

/// Every endpoint in a strategy run failed.
///
/// Keeps one entry per attempted endpoint, in attempt order, so an
/// operator can tell "all N disagreed" apart from "all N failed the
/// same way" without retrying anything.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateFailure {
    /// Human-readable run title, e.g. `"evmscan.broadcast"`.
    pub title: String,
    pub failures: Vec<EndpointFailure>,
}

impl AggregateFailure {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), failures: Vec::new() }
    }

    pub fn push(&mut self, endpoint: impl Into<String>, error: CallError) {
        self.failures.push(EndpointFailure { endpoint: endpoint.into(), error });
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// The most recent `Fatal` entry, if any.
    ///
    /// A Fatal amid availability failures usually points at a genuine
    /// protocol or data error, so it is surfaced distinctly.
    pub fn last_fatal(&self) -> Option<&EndpointFailure> {
        self.failures.iter().rev().find(|f| f.error.is_fatal())
    }
}

impl std::fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: all {} endpoints failed", self.title, self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.endpoint, failure.error)?;
        }
        if let Some(fatal) = self.last_fatal() {
            write!(f, " (last fatal: {})", fatal.endpoint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}
