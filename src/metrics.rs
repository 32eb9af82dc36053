//! Metrics collection and export for pools and caches

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics snapshot for a resource pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{PoolConfiguration, ResourcePool};
///
/// let pool = ResourcePool::new(vec!["a", "b"], || "new", PoolConfiguration::default()).unwrap();
///
/// let _res = pool.acquire().unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.in_use, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Successful acquires
    pub total_acquired: usize,

    /// Resources returned to the idle set
    pub total_released: usize,

    /// Resources created by the factory
    pub total_created: usize,

    /// Acquires rejected because the pool was exhausted, including
    /// `acquire_async` calls that timed out
    pub exhausted_events: usize,

    /// Releases rejected as unknown
    pub rejected_releases: usize,

    /// Currently checked out
    pub in_use: usize,

    /// Currently idle
    pub available: usize,

    /// Checked-out share of capacity (0.0 to 1.0)
    pub utilization: f64,

    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("rejected_releases".to_string(), self.rejected_releases.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics snapshot for a read-through cache
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct CacheMetrics {
    /// Lookups answered from stored entries
    pub hits: usize,

    /// Lookups that took the write lock
    pub misses: usize,

    /// Producer invocations, successful or not
    pub producer_calls: usize,

    pub producer_failures: usize,

    /// Stored entries
    pub entries: usize,
}

impl CacheMetrics {
    /// Share of lookups served without entering the write lock
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("hits".to_string(), self.hits.to_string());
        metrics.insert("misses".to_string(), self.misses.to_string());
        metrics.insert("producer_calls".to_string(), self.producer_calls.to_string());
        metrics.insert("producer_failures".to_string(), self.producer_failures.to_string());
        metrics.insert("entries".to_string(), self.entries.to_string());
        metrics.insert("hit_ratio".to_string(), format!("{:.2}", self.hit_ratio()));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export pool metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{PoolConfiguration, ResourcePool};
    /// use std::collections::HashMap;
    ///
    /// let pool = ResourcePool::new(vec![1, 2, 3], || 0, PoolConfiguration::default()).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus(Some(&tags)).unwrap();
    /// assert!(output.contains("resourcepool_resources_in_use"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_pool_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        let registry = Self::registry("pool", pool_name, tags)?;

        let gauges = [
            ("resourcepool_resources_in_use", "Resources currently checked out", metrics.in_use),
            ("resourcepool_resources_available", "Idle resources", metrics.available),
            ("resourcepool_capacity", "Maximum pool capacity", metrics.capacity),
        ];
        for (name, help, value) in gauges {
            Self::gauge(&registry, name, help, value)?;
        }
        Self::ratio(
            &registry,
            "resourcepool_utilization",
            "Pool utilization ratio",
            metrics.utilization,
        )?;

        let counters = [
            ("resourcepool_acquired_total", "Total successful acquires", metrics.total_acquired),
            ("resourcepool_released_total", "Total resources released", metrics.total_released),
            ("resourcepool_created_total", "Total resources created", metrics.total_created),
            (
                "resourcepool_exhausted_total",
                "Acquires rejected by exhaustion or timeout",
                metrics.exhausted_events,
            ),
            (
                "resourcepool_rejected_releases_total",
                "Releases of unknown resources",
                metrics.rejected_releases,
            ),
        ];
        for (name, help, value) in counters {
            Self::counter(&registry, name, help, value)?;
        }

        Self::encode(&registry)
    }

    /// Export cache metrics in Prometheus exposition format
    pub fn export_cache_prometheus(
        metrics: &CacheMetrics,
        cache_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        let registry = Self::registry("cache", cache_name, tags)?;

        Self::gauge(
            &registry,
            "readthrough_cache_entries",
            "Stored cache entries",
            metrics.entries,
        )?;
        Self::ratio(
            &registry,
            "readthrough_cache_hit_ratio",
            "Cache hit ratio",
            metrics.hit_ratio(),
        )?;

        let counters = [
            ("readthrough_cache_hits_total", "Lookups served from the cache", metrics.hits),
            (
                "readthrough_cache_misses_total",
                "Lookups that entered the write lock",
                metrics.misses,
            ),
            (
                "readthrough_cache_producer_calls_total",
                "Producer invocations",
                metrics.producer_calls,
            ),
            (
                "readthrough_cache_producer_failures_total",
                "Failed producer invocations",
                metrics.producer_failures,
            ),
        ];
        for (name, help, value) in counters {
            Self::counter(&registry, name, help, value)?;
        }

        Self::encode(&registry)
    }

    fn registry(
        kind: &str,
        name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<prometheus::Registry> {
        let mut labels = HashMap::new();
        labels.insert(kind.to_string(), name.to_string());

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        prometheus::Registry::new_custom(None, Some(labels))
    }

    fn gauge(
        registry: &prometheus::Registry,
        name: &str,
        help: &str,
        value: usize,
    ) -> prometheus::Result<()> {
        let gauge = prometheus::IntGauge::new(name, help)?;
        gauge.set(value as i64);
        registry.register(Box::new(gauge))
    }

    fn ratio(
        registry: &prometheus::Registry,
        name: &str,
        help: &str,
        value: f64,
    ) -> prometheus::Result<()> {
        let gauge = prometheus::Gauge::new(name, help)?;
        gauge.set(value);
        registry.register(Box::new(gauge))
    }

    fn counter(
        registry: &prometheus::Registry,
        name: &str,
        help: &str,
        value: usize,
    ) -> prometheus::Result<()> {
        let counter = prometheus::IntCounter::new(name, help)?;
        counter.inc_by(value as u64);
        registry.register(Box::new(counter))
    }

    fn encode(registry: &prometheus::Registry) -> prometheus::Result<String> {
        use prometheus::Encoder;

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal pool counters
pub(crate) struct PoolMetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub total_created: AtomicUsize,
    pub exhausted_events: AtomicUsize,
    pub rejected_releases: AtomicUsize,
}

impl PoolMetricsTracker {
    pub fn new() -> Self {
        Self {
            total_acquired: AtomicUsize::new(0),
            total_released: AtomicUsize::new(0),
            total_created: AtomicUsize::new(0),
            exhausted_events: AtomicUsize::new(0),
            rejected_releases: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self, in_use: usize, available: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            rejected_releases: self.rejected_releases.load(Ordering::Relaxed),
            in_use,
            available,
            utilization,
            capacity,
        }
    }
}

/// Internal cache counters
pub(crate) struct CacheMetricsTracker {
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
    pub producer_calls: AtomicUsize,
    pub producer_failures: AtomicUsize,
}

impl CacheMetricsTracker {
    pub fn new() -> Self {
        Self {
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            producer_calls: AtomicUsize::new(0),
            producer_failures: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self, entries: usize) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            producer_calls: self.producer_calls.load(Ordering::Relaxed),
            producer_failures: self.producer_failures.load(Ordering::Relaxed),
            entries,
        }
    }
}
