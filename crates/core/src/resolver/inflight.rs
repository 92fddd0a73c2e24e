//! Per-key de-duplication of concurrent resolutions.
//!
//! The first caller for a key starts the work; later callers for the same
//! key await the same shared future and receive a clone of its result.
//! The work is also driven by a spawned task, so it runs to completion and
//! leaves the map even when every caller is cancelled.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::cache::Fingerprint;
use crate::error::ResolveError;

type SharedResolution<V> = Shared<BoxFuture<'static, Result<V, ResolveError>>>;

/// Map of resolutions currently in flight.
pub struct InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pending: Arc<DashMap<Fingerprint, SharedResolution<V>>>,
}

impl<V> Clone for InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<V> Default for InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }
}

impl<V> InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` for `key` unless a resolution for it is already running,
    /// in which case its result is awaited instead.
    pub async fn run<F>(&self, key: &Fingerprint, start: F) -> Result<V, ResolveError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V, ResolveError>>,
    {
        let shared = match self.pending.entry(key.clone()) {
            // finished, its cleanup task just has not run yet
            Entry::Occupied(mut entry) if entry.get().peek().is_some() => {
                let shared = start().shared();
                entry.insert(shared.clone());
                self.drive(key, &shared);
                shared
            }
            Entry::Occupied(entry) => {
                debug!(key = %key.short(), "Joining in-flight resolution");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let shared = start().shared();
                entry.insert(shared.clone());
                self.drive(key, &shared);
                shared
            }
        };

        let result = shared.clone().await;
        self.pending
            .remove_if(key, |_, pending| pending.ptr_eq(&shared));
        result
    }

    /// Poll `shared` to completion on its own task and drop its map entry.
    fn drive(&self, key: &Fingerprint, shared: &SharedResolution<V>) {
        let pending = Arc::clone(&self.pending);
        let key = key.clone();
        let handle = shared.clone();
        let marker = shared.clone();
        tokio::spawn(async move {
            let _ = handle.await;
            pending.remove_if(&key, |_, entry| entry.ptr_eq(&marker));
        });
    }

    /// Number of keys currently being resolved.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let inflight: InFlight<String> = InFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::of(&["frieren"]);

        let make = |runs: Arc<AtomicUsize>| {
            move || {
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ResolveError>("result".to_string())
                }
                .boxed()
            }
        };

        let (a, b, c) = tokio::join!(
            inflight.run(&key, make(runs.clone())),
            inflight.run(&key, make(runs.clone())),
            inflight.run(&key, make(runs.clone())),
        );

        assert_eq!(tokio_test::assert_ok!(a), "result");
        assert_eq!(tokio_test::assert_ok!(b), "result");
        assert_eq!(tokio_test::assert_ok!(c), "result");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_shared_too() {
        let inflight: InFlight<String> = InFlight::new();
        let key = Fingerprint::of(&["x"]);
        let fail = || {
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<String, _>(ResolveError::FallbackNotConfigured)
            }
            .boxed()
        };

        let (a, b) = tokio::join!(inflight.run(&key, fail), inflight.run(&key, fail));
        assert!(matches!(a, Err(ResolveError::FallbackNotConfigured)));
        assert!(matches!(b, Err(ResolveError::FallbackNotConfigured)));
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let inflight: InFlight<usize> = InFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let key = Fingerprint::of(&["k"]);

        for expected in 1..=3 {
            let runs = runs.clone();
            let value = inflight
                .run(&key, move || {
                    async move { Ok(runs.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
                })
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_does_not_leak_entry() {
        let inflight: InFlight<&'static str> = InFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let key = Fingerprint::of(&[&format!("anime-{}", i)]);
            let runs = runs.clone();
            let call = inflight.run(&key, move || {
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok("done")
                }
                .boxed()
            });
            let timed_out = tokio::time::timeout(Duration::from_millis(100), call).await;
            assert!(timed_out.is_err());
        }
        assert_eq!(inflight.len(), 5);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(inflight.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_wait_on_each_other() {
        let inflight: InFlight<&'static str> = InFlight::new();
        let slow_key = Fingerprint::of(&["slow"]);
        let fast_key = Fingerprint::of(&["fast"]);

        let slow = inflight.run(&slow_key, || {
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("slow")
            }
            .boxed()
        });
        let fast = inflight.run(&fast_key, || async { Ok("fast") }.boxed());

        let result = tokio::select! {
            r = fast => r,
            _ = slow => panic!("slow finished first"),
        };
        assert_eq!(result.unwrap(), "fast");
    }
}
