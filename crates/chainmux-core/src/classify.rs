//! Pure classification of raw endpoint responses into outcomes.
//!
//! Nothing here performs I/O or retries. Given the same status, body,
//! and context, classification always produces the same outcome, which
//! is what keeps it testable without a live backend.

use serde_json::Value;

use crate::operation::Operation;
use crate::outcome::{CallError, FatalKind, Outcome};

/// Statuses that mean "slow down" rather than "broken" for most
/// backend families.
pub const DEFAULT_RATE_LIMIT_STATUSES: [u16; 3] = [402, 429, 432];

/// Identifies one in-flight call.
///
/// `url` is the request target and may carry a credential; `identity`
/// is what error text and log fields show, so keys never leak into
/// diagnostics.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub op: Operation,
    pub url: String,
    pub identity: String,
}

impl CallContext {
    /// Context for a target that carries no credential.
    pub fn new(op: Operation, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            op,
            identity: url.clone(),
            url,
        }
    }

    /// Context with a separate redacted identity.
    pub fn with_identity(
        op: Operation,
        url: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            op,
            url: url.into(),
            identity: identity.into(),
        }
    }
}

/// Maps status codes and response bodies onto the outcome taxonomy.
///
/// The rate-limit status set is configurable because backend families
/// overload these codes differently; everything else is fixed policy.
#[derive(Debug, Clone)]
pub struct Classifier {
    rate_limit_statuses: Vec<u16>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            rate_limit_statuses: DEFAULT_RATE_LIMIT_STATUSES.to_vec(),
        }
    }
}

impl Classifier {
    pub fn new(rate_limit_statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            rate_limit_statuses: rate_limit_statuses.into_iter().collect(),
        }
    }

    pub fn is_rate_limit_status(&self, status: u16) -> bool {
        self.rate_limit_statuses.contains(&status)
    }

    /// Classifies one HTTP exchange into a parsed JSON body or an error.
    ///
    /// Order matters: the rate-limit set is consulted before the 2xx
    /// check so a limited endpoint is reported as such no matter what
    /// its body says.
    pub fn classify(&self, cx: &CallContext, status: u16, body: &[u8]) -> Outcome<Value> {
        if self.is_rate_limit_status(status) {
            return Err(CallError::RateLimited);
        }
        if !(200..300).contains(&status) {
            return Err(CallError::fatal(
                FatalKind::Status,
                format!("{} got status {status} from {}", cx.op, cx.identity),
            ));
        }
        let value: Value = serde_json::from_slice(body).map_err(|err| {
            CallError::fatal(
                FatalKind::BadJson,
                format!("{} got unparseable body from {}: {err}", cx.op, cx.identity),
            )
        })?;
        if let Some(err) = value.get("error").filter(|err| !err.is_null()) {
            return Err(CallError::fatal(
                FatalKind::Backend,
                format!("{} rejected by {}: {}", cx.op, cx.identity, error_detail(err)),
            ));
        }
        Ok(value)
    }
}

/// Flattens a backend `error` member into one diagnostic line.
fn error_detail(err: &Value) -> String {
    match err {
        Value::String(text) => text.clone(),
        Value::Object(fields) => match fields.get("message").and_then(Value::as_str) {
            Some(message) => match fields.get("code").and_then(Value::as_i64) {
                Some(code) => format!("{message} (code {code})"),
                None => message.to_string(),
            },
            None => err.to_string(),
        },
        other => other.to_string(),
    }
}

/// Requires a string-typed value, the shape every broadcast-style
/// acknowledgement must have. Anything else is a contract violation
/// against the presumed backend version.
pub fn expect_string(cx: &CallContext, value: &Value) -> Outcome<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| bad_shape(cx, "string acknowledgement", value))
}

/// Builds the shape-violation error adapters use when a 2xx body
/// decodes but does not carry what the operation needs.
pub fn bad_shape(cx: &CallContext, wanted: &str, got: &Value) -> CallError {
    CallError::fatal(
        FatalKind::BadShape,
        format!("{} from {} wanted {wanted}, got {got}", cx.op, cx.identity),
    )
}
