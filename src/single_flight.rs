//! Single-flight computation
//!
//! Prevents many concurrent callers from independently computing the same
//! value. The first caller for a key spawns the computation and registers a
//! shareable channel; everyone else arriving while it runs awaits that same
//! channel and observes the identical outcome.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, Instrument};

use crate::cache::{CacheEntry, FetchMetrics};
use crate::error::{CacheError, Result};
use crate::utils::CallOnDrop;

/// The user supplied computation producing an entry for a key.
pub type ComputeFn<K, V> =
    Arc<dyn Fn(K) -> BoxFuture<'static, anyhow::Result<CacheEntry<V>>> + Send + Sync>;

/// Invoked once by the initiator after a successful computation.
pub type CompletionFn<K, V> = Arc<dyn Fn(K, CacheEntry<V>) + Send + Sync>;

type ComputationChannel<V> = Shared<BoxFuture<'static, Result<CacheEntry<V>>>>;

/// Boxes an async closure into a [`ComputeFn`].
pub fn compute_fn<K, V, F, Fut>(f: F) -> ComputeFn<K, V>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CacheEntry<V>>> + Send + 'static,
{
    Arc::new(move |key| f(key).boxed())
}

// == Single Flight ==
/// Deduplicates concurrent computations per key.
///
/// At most one computation per key is running at any time. Cloning yields
/// a handle to the same registry.
pub struct SingleFlight<K, V> {
    compute: ComputeFn<K, V>,
    in_flight: Arc<Mutex<HashMap<K, ComputationChannel<V>>>>,
    metrics: Arc<FetchMetrics>,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            in_flight: Arc::clone(&self.in_flight),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(compute: ComputeFn<K, V>, metrics: Arc<FetchMetrics>) -> Self {
        Self {
            compute,
            in_flight: Default::default(),
            metrics,
        }
    }

    /// Number of keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    // == Compute ==
    /// Returns the outcome of computing `key`, joining a running computation
    /// if there is one.
    ///
    /// The computation is spawned eagerly, before the returned future is
    /// polled, and runs to completion even if every caller goes away.
    /// `on_complete` is only used when this call starts the computation,
    /// and only invoked when it succeeds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn compute(
        &self,
        key: K,
        on_complete: Option<CompletionFn<K, V>>,
    ) -> impl Future<Output = Result<CacheEntry<V>>> + Send + 'static {
        let mut in_flight = self.in_flight.lock();

        if let Some(channel) = in_flight.get(&key) {
            debug!(?key, "Computation already running, waiting for its result");
            self.metrics.record_coalesced();
            return channel.clone();
        }

        // The lock is held until the channel is registered, so the spawned
        // task cannot deregister it before it exists.
        let channel = self.spawn_computation(key.clone(), on_complete);
        in_flight.insert(key, channel.clone());
        channel
    }

    fn spawn_computation(
        &self,
        key: K,
        on_complete: Option<CompletionFn<K, V>>,
    ) -> ComputationChannel<V> {
        debug!(?key, "Starting computation");
        self.metrics.record_computation();

        let (sender, receiver) = oneshot::channel();

        let in_flight = Arc::clone(&self.in_flight);
        let registered_key = key.clone();
        let remove_computation_token = CallOnDrop::new(move || {
            in_flight.lock().remove(&registered_key);
        });

        // The registry lock is still held here, so the compute fn is only
        // called inside the task. A panic while building its future then
        // reaches the waiters as `ComputeAborted`.
        let compute = Arc::clone(&self.compute);
        let task = async move {
            let result = compute(key.clone()).await.map_err(CacheError::from);
            // Deregister first: later callers either receive this result or
            // start a fresh computation.
            drop(remove_computation_token);

            if let (Ok(entry), Some(on_complete)) = (&result, on_complete) {
                on_complete(key, entry.clone());
            }
            sender.send(result).ok();
        }
        .in_current_span();

        tokio::spawn(task);

        receiver
            .map(|result| result.unwrap_or(Err(CacheError::ComputeAborted)))
            .boxed()
            .shared()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_flight(
        counter: Arc<AtomicUsize>,
        delay: Duration,
    ) -> (SingleFlight<String, usize>, Arc<FetchMetrics>) {
        let metrics = Arc::new(FetchMetrics::new());
        let compute = compute_fn(move |key: String| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                Ok(CacheEntry::of(key.len() * 100 + n, 60))
            }
        });
        (SingleFlight::new(compute, Arc::clone(&metrics)), metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_computations_run_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (flight, metrics) = counting_flight(Arc::clone(&counter), Duration::from_millis(50));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let flight = flight.clone();
                tokio::spawn(async move { flight.compute("key".to_string(), None).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|entry| *entry == results[0]));
        assert_eq!(results[0].result, Some(301));

        let stats = metrics.snapshot(0);
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.coalesced, 15);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_computations_rerun() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (flight, _) = counting_flight(Arc::clone(&counter), Duration::from_millis(5));

        flight.compute("key".to_string(), None).await.unwrap();
        flight.compute("key".to_string(), None).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_do_not_share() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (flight, _) = counting_flight(Arc::clone(&counter), Duration::from_millis(5));

        let a = flight.compute("a".to_string(), None);
        let b = flight.compute("bb".to_string(), None);
        let (a, b) = tokio::join!(a, b);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_ne!(a.unwrap().result, b.unwrap().result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_and_registry_cleared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let compute = compute_fn(move |_key: String| {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<CacheEntry<u32>, _>(anyhow::anyhow!("upstream unavailable"))
            }
        });
        let flight = SingleFlight::new(compute, Arc::new(FetchMetrics::new()));

        let first = flight.compute("key".to_string(), None);
        let second = flight.compute("key".to_string(), None);
        let (first, second) = tokio::join!(first, second);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match (first, second) {
            (Err(CacheError::Compute(a)), Err(CacheError::Compute(b))) => {
                assert!(Arc::ptr_eq(&a, &b));
                assert_eq!(a.to_string(), "upstream unavailable");
            }
            other => panic!("expected shared compute errors, got {other:?}"),
        }
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_computation_aborts_waiters() {
        let compute = compute_fn(|_key: String| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if true {
                panic!("computation exploded");
            }
            Ok(CacheEntry::of(0u32, 1))
        });
        let flight = SingleFlight::new(compute, Arc::new(FetchMetrics::new()));

        let result = flight.compute("key".to_string(), None).await;

        assert!(matches!(result, Err(CacheError::ComputeAborted)));
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_before_future_is_built_aborts_waiters() {
        let compute = compute_fn(|key: String| {
            assert_ne!(key, "bad", "rejected key");
            async move { Ok(CacheEntry::of(1u32, 1)) }
        });
        let flight = SingleFlight::new(compute, Arc::new(FetchMetrics::new()));

        let result = flight.compute("bad".to_string(), None).await;
        assert!(matches!(result, Err(CacheError::ComputeAborted)));
        assert_eq!(flight.in_flight(), 0);

        let result = flight.compute("good".to_string(), None).await;
        assert_eq!(result.unwrap().result, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compute_may_inspect_the_flight() {
        let slot: Arc<parking_lot::Mutex<Option<SingleFlight<String, usize>>>> = Default::default();
        let observed = Arc::clone(&slot);
        let compute = compute_fn(move |_key: String| {
            let running = observed.lock().as_ref().map(|flight| flight.in_flight());
            async move { Ok(CacheEntry::of(running.unwrap_or_default(), 1)) }
        });
        let flight = SingleFlight::new(compute, Arc::new(FetchMetrics::new()));
        *slot.lock() = Some(flight.clone());

        let entry = flight.compute("key".to_string(), None).await.unwrap();

        assert_eq!(entry.result, Some(1));
        slot.lock().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_runs_once_for_initiator_only() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (flight, _) = counting_flight(Arc::clone(&counter), Duration::from_millis(10));

        let completions = Arc::new(AtomicUsize::new(0));
        let on_complete = {
            let completions = Arc::clone(&completions);
            Arc::new(move |_key: String, _entry: CacheEntry<usize>| {
                completions.fetch_add(1, Ordering::SeqCst);
            }) as CompletionFn<String, usize>
        };

        let first = flight.compute("key".to_string(), Some(Arc::clone(&on_complete)));
        let second = flight.compute("key".to_string(), Some(on_complete));
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_cancel_computation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (flight, _) = counting_flight(Arc::clone(&counter), Duration::from_millis(10));

        drop(flight.compute("key".to_string(), None));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }
}
