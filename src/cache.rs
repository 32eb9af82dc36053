//! Read-through caches with double-checked population
//!
//! Lookups first read the concurrent entry map without taking the cache's
//! write lock. A miss takes the lock, checks the map again and only then runs
//! the producer, so concurrent first lookups of one key collapse into a
//! single producer call. One lock covers all keys: misses on different keys
//! queue behind each other while hits never wait on it. The synchronous
//! cache's lock is reentrant, so a producer may look up other keys in the
//! cache it is populating.

use crate::config::CacheConfiguration;
use crate::errors::{CacheError, CacheResult};
use crate::metrics::{CacheMetrics, CacheMetricsTracker};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

/// Cache that populates itself from a synchronous producer
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{CacheConfiguration, ReadThroughCache};
///
/// let cache = ReadThroughCache::from_fn(|key: &String| key.len(), CacheConfiguration::default());
///
/// assert_eq!(cache.get(&"us".to_string()).unwrap(), 2);
/// assert_eq!(cache.get(&"us".to_string()).unwrap(), 2);
/// assert_eq!(cache.producer_calls(), 1);
/// ```
pub struct ReadThroughCache<K, V, E = Infallible> {
    entries: DashMap<K, V>,
    write_lock: ReentrantMutex<()>,
    producer: Box<dyn Fn(&K) -> Result<V, E> + Send + Sync>,
    config: CacheConfiguration,
    metrics: CacheMetricsTracker,
}

impl<K, V, E> ReadThroughCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache backed by a fallible producer
    ///
    /// The producer may call `get` on the same cache for a different key.
    /// Asking for the key it is producing recurses without end.
    pub fn new<F>(producer: F, config: CacheConfiguration) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        Self::with_entries(producer, Vec::new(), config)
    }

    /// Create a cache pre-seeded with `entries`
    ///
    /// Seeded keys never reach the producer.
    pub fn with_entries<F, I>(producer: F, entries: I, config: CacheConfiguration) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = DashMap::with_capacity(config.initial_capacity);
        for (key, value) in entries {
            map.insert(key, value);
        }
        debug!(cache = %config.name, seeded = map.len(), "read-through cache created");

        Self {
            entries: map,
            write_lock: ReentrantMutex::new(()),
            producer: Box::new(producer),
            config,
            metrics: CacheMetricsTracker::new(),
        }
    }

    /// Get the value for `key`, running the producer on first access only
    pub fn get(&self, key: &K) -> CacheResult<V, E> {
        if let Some(value) = self.peek(key) {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            trace!(cache = %self.config.name, "cache hit");
            return Ok(value);
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        let _guard = self.write_lock.lock();

        // Another caller may have populated the key while we waited.
        if let Some(value) = self.peek(key) {
            trace!(cache = %self.config.name, "populated while waiting for lock");
            return Ok(value);
        }

        self.metrics.producer_calls.fetch_add(1, Ordering::Relaxed);
        match (self.producer)(key) {
            Ok(value) => {
                self.entries.insert(key.clone(), value.clone());
                debug!(cache = %self.config.name, entries = self.entries.len(), "cache populated");
                Ok(value)
            }
            Err(err) => {
                self.metrics.producer_failures.fetch_add(1, Ordering::Relaxed);
                warn!(cache = %self.config.name, "producer failed, key left unpopulated");
                Err(CacheError::ProducerFailure(err))
            }
        }
    }

    /// Stored value for `key`, without ever calling the producer
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Number of times the producer has been invoked
    pub fn producer_calls(&self) -> usize {
        self.metrics.producer_calls.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot(self.entries.len())
    }

    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        crate::metrics::MetricsExporter::export_cache_prometheus(&self.metrics(), self.name(), tags)
    }
}

impl<K, V> ReadThroughCache<K, V, Infallible>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache over a producer that cannot fail
    pub fn from_fn<F>(producer: F, config: CacheConfiguration) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self::new(move |key| Ok(producer(key)), config)
    }
}

/// Asynchronous lookup service behind an [`AsyncReadThroughCache`]
#[async_trait]
pub trait AsyncProducer<K: Sync, V>: Send + Sync {
    type Error: Send;

    async fn produce(&self, key: &K) -> Result<V, Self::Error>;
}

/// Read-through cache for async producers
///
/// Same population rules as [`ReadThroughCache`]; the write lock is held
/// across the producer's await. That lock is not reentrant: a producer that
/// awaits `get` on the same cache never completes.
pub struct AsyncReadThroughCache<K, V, P> {
    entries: DashMap<K, V>,
    write_lock: tokio::sync::Mutex<()>,
    producer: P,
    config: CacheConfiguration,
    metrics: CacheMetricsTracker,
}

impl<K, V, P> AsyncReadThroughCache<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    P: AsyncProducer<K, V>,
{
    pub fn new(producer: P, config: CacheConfiguration) -> Self {
        debug!(cache = %config.name, "async read-through cache created");
        Self {
            entries: DashMap::with_capacity(config.initial_capacity),
            write_lock: tokio::sync::Mutex::new(()),
            producer,
            config,
            metrics: CacheMetricsTracker::new(),
        }
    }

    /// Get the value for `key`, awaiting the producer on first access only
    pub async fn get(&self, key: &K) -> CacheResult<V, P::Error> {
        if let Some(value) = self.peek(key) {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            trace!(cache = %self.config.name, "cache hit");
            return Ok(value);
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        let _guard = self.write_lock.lock().await;

        if let Some(value) = self.peek(key) {
            trace!(cache = %self.config.name, "populated while waiting for lock");
            return Ok(value);
        }

        self.metrics.producer_calls.fetch_add(1, Ordering::Relaxed);
        match self.producer.produce(key).await {
            Ok(value) => {
                self.entries.insert(key.clone(), value.clone());
                debug!(cache = %self.config.name, entries = self.entries.len(), "cache populated");
                Ok(value)
            }
            Err(err) => {
                self.metrics.producer_failures.fetch_add(1, Ordering::Relaxed);
                warn!(cache = %self.config.name, "producer failed, key left unpopulated");
                Err(CacheError::ProducerFailure(err))
            }
        }
    }

    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn producer_calls(&self) -> usize {
        self.metrics.producer_calls.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, OnceLock, Weak, mpsc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_length_producer_scenario() {
        let cache =
            ReadThroughCache::from_fn(|key: &String| key.len(), CacheConfiguration::default());

        assert_eq!(cache.get(&"us".to_string()).unwrap(), 2);
        assert_eq!(cache.producer_calls(), 1);
        assert_eq!(cache.get(&"us".to_string()).unwrap(), 2);
        assert_eq!(cache.producer_calls(), 1);
        assert_eq!(cache.get(&"en".to_string()).unwrap(), 2);
        assert_eq!(cache.producer_calls(), 2);

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 2);
        assert_eq!(metrics.entries, 2);
    }

    #[test]
    fn test_producer_reads_other_key_of_same_cache() {
        let slot: Arc<OnceLock<Weak<ReadThroughCache<String, usize>>>> = Arc::new(OnceLock::new());
        let handle = Arc::clone(&slot);
        let cache = Arc::new(ReadThroughCache::from_fn(
            move |key: &String| {
                if key == "total" {
                    let cache = handle.get().and_then(Weak::upgrade).expect("cache registered");
                    cache.get(&"us".to_string()).unwrap() + 1
                } else {
                    key.len()
                }
            },
            CacheConfiguration::default(),
        ));
        slot.set(Arc::downgrade(&cache)).unwrap();

        let worker = Arc::clone(&cache);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(worker.get(&"total".to_string()).unwrap());
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(3));
        assert_eq!(cache.peek(&"us".to_string()), Some(2));
        assert_eq!(cache.producer_calls(), 2);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let cache = ReadThroughCache::new(
            move |key: &String| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(format!("lookup of {key} failed"))
                } else {
                    Ok(vec!["user1".to_string(), "user2".to_string()])
                }
            },
            CacheConfiguration::new().with_name("users"),
        );

        let key = "us".to_string();
        let err = cache.get(&key).unwrap_err();
        assert_eq!(err.into_inner(), "lookup of us failed");
        assert!(!cache.contains_key(&key));

        assert_eq!(cache.get(&key).unwrap().len(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cache.metrics().producer_failures, 1);
    }

    #[test]
    fn test_seeded_entries_skip_producer() {
        let cache = ReadThroughCache::with_entries(
            |_: &&str| -> Result<u32, String> { Err("unreachable".to_string()) },
            vec![("us", 2), ("en", 3)],
            CacheConfiguration::default(),
        );

        assert_eq!(cache.get(&"en").unwrap(), 3);
        assert_eq!(cache.producer_calls(), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_peek_does_not_populate() {
        let cache = ReadThroughCache::from_fn(|key: &u64| key * 2, CacheConfiguration::default());
        assert_eq!(cache.peek(&4), None);
        assert!(cache.is_empty());
        assert_eq!(cache.producer_calls(), 0);
    }

    struct SlowLength {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AsyncProducer<String, usize> for SlowLength {
        type Error = String;

        async fn produce(&self, key: &String) -> Result<usize, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if key.is_empty() {
                Err("empty key".to_string())
            } else {
                Ok(key.len())
            }
        }
    }

    #[tokio::test]
    async fn test_async_concurrent_first_access() {
        let cache = Arc::new(AsyncReadThroughCache::new(
            SlowLength { calls: AtomicUsize::new(0) },
            CacheConfiguration::default(),
        ));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move { cache.get(&"europe".to_string()).await }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 6);
        }
        assert_eq!(cache.producer_calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_async_failure_retries() {
        let cache = AsyncReadThroughCache::new(
            SlowLength { calls: AtomicUsize::new(0) },
            CacheConfiguration::default(),
        );

        assert!(cache.get(&String::new()).await.is_err());
        assert!(cache.get(&String::new()).await.is_err());
        assert_eq!(cache.producer_calls(), 2);
        assert!(cache.is_empty());
    }
}
