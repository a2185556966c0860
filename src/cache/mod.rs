//! TTL-keyed cache with single-flight stampede protection (spec §4.1).
//!
//! Mirrors the shared-map-behind-a-lock shape the teacher uses for its
//! per-IP rate-limit table and DNS cache, but keyed generically and with a
//! `get_or_compute` entry point: concurrent lookups for the same key that
//! all miss collapse into one in-flight computation instead of each firing
//! its own provider call.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;

enum Slot<V> {
    Ready { value: V, expires_at: Instant },
    Pending { notify: broadcast::Sender<Outcome<V>> },
}

/// What a `get_or_compute` owner broadcasts to callers waiting on the same
/// key: either the value it computed, or the error it failed with. Waiters
/// never recompute on their own — they get exactly what the owner got.
enum Outcome<V> {
    Ready(V),
    Failed(Arc<dyn Any + Send + Sync>),
}

impl<V: Clone> Clone for Outcome<V> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Ready(value) => Outcome::Ready(value.clone()),
            Outcome::Failed(error) => Outcome::Failed(error.clone()),
        }
    }
}

/// Point-in-time counters for a `Cache` (spec §4.1 observability surface).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// A TTL cache keyed by `K`, storing `V` values cloned out on read.
pub struct Cache<K, V> {
    ttl: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns a live value for `key` if present and unexpired, without
    /// triggering a computation.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            Some(Slot::Ready { .. }) => {
                slots.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut slots = self.slots.lock();
        slots.insert(
            key,
            Slot::Ready {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        if self.slots.lock().remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current hit/miss/eviction counters and live entry count.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.slots.lock().len(),
        }
    }

    /// Returns the cached value for `key`, or computes it via `compute`.
    ///
    /// If another caller is already computing the same key, this call waits
    /// for that computation to finish and receives whatever it produced —
    /// the value on success, or the same error on failure. `compute_fn`
    /// never runs more than once per key at a time, and a failing compute
    /// never triggers a second, independent compute from a waiter.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        V: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        loop {
            let wait_rx = {
                let mut slots = self.slots.lock();
                match slots.get(&key) {
                    Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value.clone());
                    }
                    Some(Slot::Pending { notify }) => Some(notify.subscribe()),
                    _ => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        let (tx, _rx) = broadcast::channel(1);
                        slots.insert(key.clone(), Slot::Pending { notify: tx });
                        None
                    }
                }
            };

            match wait_rx {
                Some(mut rx) => {
                    // Another caller owns the computation; take whatever it
                    // broadcasts rather than looping back to recompute.
                    match rx.recv().await {
                        Ok(Outcome::Ready(value)) => return Ok(value),
                        Ok(Outcome::Failed(error)) => {
                            let error = error
                                .downcast_ref::<E>()
                                .cloned()
                                .expect("get_or_compute waiters share the owner's error type");
                            return Err(error);
                        }
                        Err(_) => {
                            // Owner dropped the sender without broadcasting
                            // (panicked mid-compute); fall through and try
                            // to become the new owner.
                            continue;
                        }
                    }
                }
                None => {
                    // We installed the pending slot; we own the computation.
                    let result = compute().await;
                    let mut slots = self.slots.lock();
                    let notify = match slots.remove(&key) {
                        Some(Slot::Pending { notify }) => Some(notify),
                        other => {
                            if let Some(slot) = other {
                                slots.insert(key.clone(), slot);
                            }
                            None
                        }
                    };
                    match &result {
                        Ok(value) => {
                            slots.insert(
                                key.clone(),
                                Slot::Ready {
                                    value: value.clone(),
                                    expires_at: Instant::now() + self.ttl,
                                },
                            );
                        }
                        Err(_) => {
                            slots.remove(&key);
                        }
                    }
                    drop(slots);
                    if let Some(notify) = notify {
                        let outcome = match &result {
                            Ok(value) => Outcome::Ready(value.clone()),
                            Err(error) => Outcome::Failed(Arc::new(error.clone())),
                        };
                        let _ = notify.send(outcome);
                    }
                    return result;
                }
            }
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + AsRef<str>,
    V: Clone,
{
    /// Drops every cached entry whose key starts with `prefix`. Used to
    /// invalidate a whole family of keys (e.g. every cached record for a
    /// provider) without tracking individual keys at the call site.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| !key.as_ref().starts_with(prefix));
        let removed = before - slots.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
    }
}

pub type SharedCache<K, V> = Arc<Cache<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn get_or_compute_caches_the_result() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let result: Result<u32, ()> = cache
                .get_or_compute("k".to_string(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(result, Ok(42));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_collapse_into_one_computation() {
        let cache: Arc<Cache<String, u32>> = Arc::new(Cache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("k".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));

        let compute = |calls: Arc<AtomicU32>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(1)
        };

        cache
            .get_or_compute("k".to_string(), || compute(calls.clone()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache
            .get_or_compute("k".to_string(), || compute(calls.clone()))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_compute_does_not_poison_the_slot() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        let first: Result<u32, &str> = cache.get_or_compute("k".to_string(), || async { Err("boom") }).await;
        assert!(first.is_err());

        let second = cache
            .get_or_compute("k".to_string(), || async { Ok::<_, &str>(9) })
            .await;
        assert_eq!(second, Ok(9));
    }

    #[tokio::test]
    async fn concurrent_failures_collapse_into_one_computation() {
        let cache: Arc<Cache<String, u32>> = Arc::new(Cache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("k".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<u32, &str>("boom")
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err("boom"));
        }
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "a failing compute must not re-run for each waiter"
        );
    }

    #[tokio::test]
    async fn stats_track_hits_misses_and_evictions() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"k".to_string()), None);

        cache.insert("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        cache.invalidate(&"k".to_string());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn invalidate_prefix_removes_matching_keys_only() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_secs(60));
        cache.insert("solscan:a".to_string(), 1);
        cache.insert("solscan:b".to_string(), 2);
        cache.insert("birdeye:a".to_string(), 3);

        cache.invalidate_prefix("solscan:");

        assert_eq!(cache.get(&"solscan:a".to_string()), None);
        assert_eq!(cache.get(&"solscan:b".to_string()), None);
        assert_eq!(cache.get(&"birdeye:a".to_string()), Some(3));
        assert_eq!(cache.stats().evictions, 2);
    }
}
