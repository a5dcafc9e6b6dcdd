//! Fallback orchestration over an adapter's endpoint set.
//!
//! All concurrency, timeout, and error-aggregation policy lives here.
//! The invoker below never retries; callers above only ever see one
//! outcome per strategy run.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::time::timeout;

use crate::endpoint::{Endpoint, EndpointSet};
use crate::error::{DispatchError, DispatchResult};
use crate::operation::Operation;
use crate::outcome::{AggregateFailure, CallError, Outcome};

/// Policy knobs shared by every strategy run.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Upper bound on any single endpoint invocation. There is no
    /// unbounded wait anywhere in this layer.
    pub call_timeout: Duration,
    /// Fixed shuffle seed for the serial strategy; `None` draws fresh
    /// entropy per call.
    pub shuffle_seed: Option<u64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(20),
            shuffle_seed: None,
        }
    }
}

/// Runs one fallback strategy over an endpoint set.
#[derive(Debug, Clone, Default)]
pub struct Fallback {
    config: FallbackConfig,
}

impl Fallback {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Fresh uniform permutation of the current set.
    ///
    /// Randomizing per call keeps the first-configured endpoint from
    /// absorbing all the serial traffic.
    fn shuffled(&self, set: &EndpointSet) -> Vec<Endpoint> {
        let mut order = set.snapshot().as_ref().clone();
        match self.config.shuffle_seed {
            Some(seed) => order.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => order.shuffle(&mut rand::thread_rng()),
        }
        order
    }

    /// Tries endpoints one at a time in shuffled order.
    ///
    /// The first success short-circuits; every failure advances to the
    /// next endpoint and is recorded. Serial keeps simultaneous load
    /// off endpoints that charge per request or limit aggressively.
    pub async fn serial<T, F, Fut>(
        &self,
        title: &str,
        op: Operation,
        set: &EndpointSet,
        call: F,
    ) -> DispatchResult<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let order = self.shuffled(set);
        if order.is_empty() {
            return Err(DispatchError::NoEndpoints(op));
        }
        let mut agg = AggregateFailure::new(title);
        for endpoint in order {
            let identity = endpoint.identity().to_owned();
            match bounded(self.config.call_timeout, call(endpoint)).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    log_failure(title, &identity, &error);
                    agg.push(identity, error);
                }
            }
        }
        tracing::error!(title, failures = agg.len(), "serial run exhausted");
        Err(agg.into())
    }

    /// Races every endpoint concurrently; first success wins.
    ///
    /// Losers are cancelled by dropping their futures the moment a
    /// winner resolves; their eventual results are never awaited. If
    /// nothing succeeds the aggregate keeps one entry per endpoint so
    /// an operator can tell "all N disagreed" from "all N down".
    pub async fn parallel<T, F, Fut>(
        &self,
        title: &str,
        op: Operation,
        set: &EndpointSet,
        call: F,
    ) -> DispatchResult<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let snapshot = set.snapshot();
        if snapshot.is_empty() {
            return Err(DispatchError::NoEndpoints(op));
        }
        let mut pending = FuturesUnordered::new();
        for endpoint in snapshot.iter().cloned() {
            let identity = endpoint.identity().to_owned();
            let fut = bounded(self.config.call_timeout, call(endpoint));
            pending.push(async move { (identity, fut.await) });
        }
        let mut agg = AggregateFailure::new(title);
        while let Some((identity, outcome)) = pending.next().await {
            match outcome {
                Ok(value) => {
                    tracing::debug!(title, endpoint = identity.as_str(), "race won");
                    // Dropping the set cancels every still-pending loser.
                    drop(pending);
                    return Ok(value);
                }
                Err(error) => {
                    log_failure(title, &identity, &error);
                    agg.push(identity, error);
                }
            }
        }
        tracing::error!(title, failures = agg.len(), "parallel run exhausted");
        Err(agg.into())
    }

    /// Exactly one invocation against the first configured endpoint.
    ///
    /// Used by operations bound to a designated server, such as a live
    /// subscription connection.
    pub async fn single<T, F, Fut>(
        &self,
        title: &str,
        op: Operation,
        set: &EndpointSet,
        call: F,
    ) -> DispatchResult<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let snapshot = set.snapshot();
        let Some(endpoint) = snapshot.first().cloned() else {
            return Err(DispatchError::NoEndpoints(op));
        };
        let identity = endpoint.identity().to_owned();
        match bounded(self.config.call_timeout, call(endpoint)).await {
            Ok(value) => Ok(value),
            Err(error) => {
                log_failure(title, &identity, &error);
                let mut agg = AggregateFailure::new(title);
                agg.push(identity, error);
                tracing::error!(title, failures = agg.len(), "single run exhausted");
                Err(agg.into())
            }
        }
    }
}

/// Applies the mandatory per-call bound; an elapsed timer classifies
/// as `Transient`, same as any other availability failure.
async fn bounded<T>(limit: Duration, fut: impl Future<Output = Outcome<T>>) -> Outcome<T> {
    match timeout(limit, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CallError::Transient(format!("no reply within {limit:?}"))),
    }
}

/// Rate limiting is expected and recoverable, so it stays quiet;
/// anything else may mean a backend protocol change and is loud.
fn log_failure(title: &str, endpoint: &str, error: &CallError) {
    if error.is_rate_limited() {
        tracing::debug!(title, endpoint, "endpoint rate limited");
    } else {
        tracing::warn!(title, endpoint, %error, "endpoint call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FatalKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn set(urls: &[&str]) -> EndpointSet {
        EndpointSet::new(urls.iter().map(|u| Endpoint::new(*u)).collect())
    }

    fn seeded(seed: u64) -> Fallback {
        Fallback::new(FallbackConfig {
            call_timeout: Duration::from_secs(1),
            shuffle_seed: Some(seed),
        })
    }

    #[tokio::test]
    async fn serial_short_circuits_on_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let result = seeded(7)
            .serial("t.height", Operation::FetchBlockHeight, &set(&["a", "b", "c"]), |_ep| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(42u64)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn serial_reaches_healthy_endpoint_past_limit_and_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let result = seeded(3)
            .serial("t.broadcast", Operation::Broadcast, &set(&["a", "b", "c"]), |ep| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    match ep.url.as_str() {
                        "a" => Err(CallError::RateLimited),
                        "b" => std::future::pending().await,
                        _ => Ok("0xack".to_string()),
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "0xack");
        assert!(calls.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn serial_records_every_failure_and_surfaces_last_fatal() {
        let err = seeded(11)
            .serial("t.nonce", Operation::FetchNonce, &set(&["a", "b", "c"]), |ep| async move {
                match ep.url.as_str() {
                    "a" => Err::<u64, _>(CallError::RateLimited),
                    "b" => Err(CallError::Transient("refused".into())),
                    _ => Err(CallError::fatal(FatalKind::Backend, "bad request")),
                }
            })
            .await
            .unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        assert_eq!(agg.title, "t.nonce");
        assert_eq!(agg.len(), 3);
        assert_eq!(agg.last_fatal().unwrap().endpoint, "c");
    }

    #[tokio::test]
    async fn serial_order_is_seedable() {
        let order_for = |seed: u64| async move {
            let err = seeded(seed)
                .serial("t.height", Operation::FetchBlockHeight, &set(&["a", "b", "c", "d"]), |_ep| async move {
                    Err::<u64, _>(CallError::Transient("down".into()))
                })
                .await
                .unwrap_err();
            err.aggregate()
                .unwrap()
                .failures
                .iter()
                .map(|f| f.endpoint.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(order_for(5).await, order_for(5).await);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_first_success_wins_without_waiting() {
        let started = tokio::time::Instant::now();
        let result = seeded(0)
            .parallel("t.height", Operation::FetchBlockHeight, &set(&["slow", "fast"]), |ep| async move {
                match ep.url.as_str() {
                    "slow" => {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        Ok("slow".to_string())
                    }
                    _ => Ok("fast".to_string()),
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "fast");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn parallel_keeps_one_entry_per_endpoint() {
        let err = seeded(0)
            .parallel("t.multicast", Operation::MulticastRaw, &set(&["a", "b"]), |ep| async move {
                Err::<u64, _>(CallError::fatal(
                    FatalKind::Backend,
                    format!("rejected by {}", ep.url),
                ))
            })
            .await
            .unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        assert_eq!(agg.title, "t.multicast");
        assert_eq!(agg.len(), 2);
        let mut endpoints: Vec<_> = agg.failures.iter().map(|f| f.endpoint.as_str()).collect();
        endpoints.sort_unstable();
        assert_eq!(endpoints, ["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out_as_transient() {
        let err = seeded(0)
            .serial("t.fee", Operation::GetBaseFee, &set(&["a"]), |_ep| async move {
                std::future::pending::<Outcome<u64>>().await
            })
            .await
            .unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        assert_eq!(agg.len(), 1);
        match &agg.failures[0].error {
            CallError::Transient(msg) => assert!(msg.contains("no reply"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_set_fails_immediately_without_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fallback = seeded(0);
        let empty = EndpointSet::empty();

        let counted = calls.clone();
        let serial = fallback
            .serial("t.height", Operation::FetchBlockHeight, &empty, |_ep| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(0u64)
                }
            })
            .await;
        assert!(matches!(
            serial,
            Err(DispatchError::NoEndpoints(Operation::FetchBlockHeight))
        ));

        let counted = calls.clone();
        let parallel = fallback
            .parallel("t.multicast", Operation::MulticastRaw, &empty, |_ep| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(0u64)
                }
            })
            .await;
        assert!(matches!(
            parallel,
            Err(DispatchError::NoEndpoints(Operation::MulticastRaw))
        ));

        let counted = calls.clone();
        let single = fallback
            .single("t.sub", Operation::SubscribeAddress, &empty, |_ep| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(0u64)
                }
            })
            .await;
        assert!(matches!(
            single,
            Err(DispatchError::NoEndpoints(Operation::SubscribeAddress))
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_invokes_first_endpoint_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let result = seeded(0)
            .single("t.sub", Operation::SubscribeAddress, &set(&["a", "b"]), |ep| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(ep.url)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_failure_carries_one_entry() {
        let err = seeded(0)
            .single("t.sub", Operation::SubscribeAddress, &set(&["a", "b"]), |_ep| async move {
                Err::<(), _>(CallError::Transient("socket closed".into()))
            })
            .await
            .unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.failures[0].endpoint, "a");

        // Rate limiting stays quiet per endpoint, but the exhausted run
        // still surfaces its aggregate like the other strategies.
        let err = seeded(0)
            .single("t.sub", Operation::SubscribeAddress, &set(&["a"]), |_ep| async move {
                Err::<(), _>(CallError::RateLimited)
            })
            .await
            .unwrap_err();
        let agg = err.aggregate().expect("aggregate");
        assert_eq!(agg.len(), 1);
        assert!(agg.failures[0].error.is_rate_limited());
    }
}
