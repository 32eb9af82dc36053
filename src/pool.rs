//! Bounded, fail-fast resource pool

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{PoolMetrics, PoolMetricsTracker};

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

/// Identity assigned by the pool to every resource it manages
///
/// Seeded resources are numbered from 1 in seed order, later ones continue
/// in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A checked-out resource that returns to its pool when dropped
pub struct PooledResource<R> {
    value: Option<R>,
    id: ResourceId,
    pool: Arc<PoolInner<R>>,
}

impl<R> PooledResource<R> {
    /// Identity of the resource inside its pool
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Take the resource out of the pool for good
    ///
    /// The pool forgets the resource and its capacity slot becomes free.
    /// Teardown is then up to the caller.
    pub fn detach(mut self) -> R {
        self.pool.forget(self.id);
        self.value.take().expect("Value already taken")
    }
}

impl<R> Deref for PooledResource<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<R> DerefMut for PooledResource<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<R: fmt::Debug> fmt::Debug for PooledResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

impl<R> Drop for PooledResource<R> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.check_in(self.id, value);
        }
    }
}

struct PoolState<R> {
    /// Idle resources, reused from the back
    available: Vec<(ResourceId, R)>,
    in_use: HashSet<ResourceId>,
    next_id: u64,
}

impl<R> PoolState<R> {
    fn total(&self) -> usize {
        self.available.len() + self.in_use.len()
    }

    fn assign_id(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        id
    }
}

struct PoolInner<R> {
    /// Guards both sets jointly; a resource moves between them in one step.
    state: Mutex<PoolState<R>>,
    factory: Box<dyn Fn() -> R + Send + Sync>,
    config: PoolConfiguration,
    metrics: PoolMetricsTracker,
}

impl<R> PoolInner<R> {
    /// Hand out an idle resource or create one below capacity
    fn checkout(&self) -> Option<(ResourceId, R)> {
        let mut state = self.state.lock();

        if let Some((id, resource)) = state.available.pop() {
            state.in_use.insert(id);
            trace!(pool = %self.config.name, %id, "reusing idle resource");
            return Some((id, resource));
        }

        if state.total() < self.config.max_pool_size {
            // Created under the lock so the capacity check cannot be raced.
            let id = state.assign_id();
            let resource = (self.factory)();
            state.in_use.insert(id);
            self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
            debug!(pool = %self.config.name, %id, "created new resource");
            return Some((id, resource));
        }

        None
    }

    fn check_in(&self, id: ResourceId, resource: R) {
        let mut state = self.state.lock();
        state.in_use.remove(&id);
        state.available.push((id, resource));
        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
        trace!(pool = %self.config.name, %id, "resource returned");
    }

    fn forget(&self, id: ResourceId) {
        self.state.lock().in_use.remove(&id);
        debug!(pool = %self.config.name, %id, "resource detached from pool");
    }
}

/// Thread-safe pool with a fixed capacity ceiling
///
/// Idle resources are reused last-in first-out; new ones are created on
/// demand until the ceiling is reached, after which `acquire` fails
/// immediately with [`PoolError::PoolExhausted`]. Cloning the pool yields
/// another handle to the same resources.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{PoolConfiguration, PoolError, ResourcePool};
///
/// let config = PoolConfiguration::new().with_max_pool_size(2);
/// let pool = ResourcePool::new(vec!["conn-1"], || "conn-new", config).unwrap();
///
/// let first = pool.acquire().unwrap();
/// let second = pool.acquire().unwrap();
/// assert_eq!(*first, "conn-1");
/// assert_eq!(*second, "conn-new");
/// assert!(matches!(pool.acquire(), Err(PoolError::PoolExhausted { capacity: 2 })));
///
/// pool.release(first).unwrap();
/// assert_eq!(pool.available_count(), 1);
/// ```
pub struct ResourcePool<R> {
    inner: Arc<PoolInner<R>>,
}

impl<R> Clone for ResourcePool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + 'static> ResourcePool<R> {
    /// Create a pool seeded with `seed` that grows through `factory`
    pub fn new<F>(seed: Vec<R>, factory: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        config.validate()?;

        if seed.len() > config.max_pool_size {
            return Err(PoolError::SeedExceedsCapacity {
                seeded: seed.len(),
                capacity: config.max_pool_size,
            });
        }

        let mut state = PoolState {
            available: Vec::with_capacity(config.max_pool_size),
            in_use: HashSet::new(),
            next_id: 1,
        };
        for resource in seed {
            let id = state.assign_id();
            state.available.push((id, resource));
        }

        debug!(
            pool = %config.name,
            seeded = state.available.len(),
            capacity = config.max_pool_size,
            "resource pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(state),
                factory: Box::new(factory),
                config,
                metrics: PoolMetricsTracker::new(),
            }),
        })
    }

    /// Create an empty pool that creates every resource on demand
    pub fn with_factory<F>(factory: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self::new(Vec::new(), factory, config)
    }

    /// Check out a resource, failing fast when the pool is exhausted
    pub fn acquire(&self) -> PoolResult<PooledResource<R>> {
        match self.inner.checkout() {
            Some((id, value)) => {
                self.inner.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                Ok(self.lend(id, value))
            }
            None => {
                let capacity = self.inner.config.max_pool_size;
                self.inner.metrics.exhausted_events.fetch_add(1, Ordering::Relaxed);
                warn!(pool = %self.inner.config.name, capacity, "resource pool exhausted");
                Err(PoolError::PoolExhausted { capacity })
            }
        }
    }

    /// Check out a resource, discarding the failure reason
    pub fn try_acquire(&self) -> Option<PooledResource<R>> {
        self.acquire().ok()
    }

    /// Wait for a resource, retrying until the configured timeout
    ///
    /// This is the only waiting entry point; [`acquire`](Self::acquire)
    /// never waits.
    pub async fn acquire_async(&self) -> PoolResult<PooledResource<R>> {
        let timeout = self.inner.config.operation_timeout;
        let poll_interval = self.inner.config.poll_interval;

        tokio::time::timeout(timeout, async {
            loop {
                if let Some((id, value)) = self.inner.checkout() {
                    self.inner.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                    return self.lend(id, value);
                }
                tokio::time::sleep(poll_interval).await;
            }
        })
        .await
        .map_err(|_| {
            self.inner.metrics.exhausted_events.fetch_add(1, Ordering::Relaxed);
            warn!(pool = %self.inner.config.name, ?timeout, "timed out waiting for a resource");
            PoolError::Timeout(timeout)
        })
    }

    /// Return a checked-out resource to the idle set
    ///
    /// A resource handed out by a different pool is rejected with
    /// [`PoolError::UnknownResource`]; it goes back to its own pool on drop.
    ///
    /// The guard is consumed, so releasing the same resource twice does not
    /// compile:
    ///
    /// ```compile_fail
    /// use esox_resourcepool::{PoolConfiguration, ResourcePool};
    ///
    /// let pool = ResourcePool::new(vec![1], || 2, PoolConfiguration::default()).unwrap();
    /// let res = pool.acquire().unwrap();
    /// pool.release(res).unwrap();
    /// pool.release(res).unwrap();
    /// ```
    pub fn release(&self, mut resource: PooledResource<R>) -> PoolResult<()> {
        if !Arc::ptr_eq(&resource.pool, &self.inner) {
            self.inner.metrics.rejected_releases.fetch_add(1, Ordering::Relaxed);
            warn!(
                pool = %self.inner.config.name,
                id = %resource.id,
                "rejected release of foreign resource"
            );
            return Err(PoolError::UnknownResource(resource.id));
        }

        if let Some(value) = resource.value.take() {
            self.inner.check_in(resource.id, value);
        }
        Ok(())
    }

    /// Pre-create idle resources, never exceeding capacity
    ///
    /// Returns the number of resources created.
    pub fn warmup(&self, count: usize) -> usize {
        let mut state = self.inner.state.lock();
        let mut created = 0;

        while created < count && state.total() < self.inner.config.max_pool_size {
            let id = state.assign_id();
            let resource = (self.inner.factory)();
            state.available.push((id, resource));
            created += 1;
        }

        self.inner.metrics.total_created.fetch_add(created, Ordering::Relaxed);
        debug!(pool = %self.inner.config.name, created, "pool warmed up");
        created
    }

    /// Remove every idle resource so the caller can tear it down
    pub fn drain_available(&self) -> Vec<R> {
        let drained = std::mem::take(&mut self.inner.state.lock().available);
        debug!(pool = %self.inner.config.name, drained = drained.len(), "drained idle resources");
        drained.into_iter().map(|(_, resource)| resource).collect()
    }

    /// Number of idle resources at the instant of the call
    pub fn available_count(&self) -> usize {
        self.inner.state.lock().available.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.inner.state.lock().in_use.len()
    }

    /// Idle plus checked-out resources
    pub fn total_count(&self) -> usize {
        self.inner.state.lock().total()
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.max_pool_size
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        let (in_use, available) = self.counts();
        self.inner.metrics.snapshot(in_use, available, self.capacity())
    }

    pub fn health_status(&self) -> HealthStatus {
        let (in_use, available) = self.counts();
        HealthStatus::new(available, in_use, self.capacity())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format, labelled with the pool name
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        crate::metrics::MetricsExporter::export_pool_prometheus(&self.metrics(), self.name(), tags)
    }

    fn counts(&self) -> (usize, usize) {
        let state = self.inner.state.lock();
        (state.in_use.len(), state.available.len())
    }

    fn lend(&self, id: ResourceId, value: R) -> PooledResource<R> {
        PooledResource {
            value: Some(value),
            id,
            pool: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn connections(capacity: usize, seed: usize) -> ResourcePool<String> {
        let counter = AtomicUsize::new(seed);
        let config = PoolConfiguration::new().with_max_pool_size(capacity);
        let seed = (1..=seed).map(|i| format!("conn-{i}")).collect();
        ResourcePool::new(
            seed,
            move || format!("conn-{}", counter.fetch_add(1, Ordering::Relaxed) + 1),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_lifo_reuse_then_growth_then_exhaustion() {
        let pool = connections(3, 2);

        let second = pool.acquire().unwrap();
        assert_eq!(second.id().get(), 2);
        assert_eq!(*second, "conn-2");

        let first = pool.acquire().unwrap();
        assert_eq!(first.id().get(), 1);

        let third = pool.acquire().unwrap();
        assert_eq!(third.id().get(), 3);
        assert_eq!(*third, "conn-3");

        assert_eq!(
            pool.acquire().err(),
            Some(PoolError::PoolExhausted { capacity: 3 })
        );

        pool.release(second).unwrap();
        let again = pool.acquire().unwrap();
        assert_eq!(again.id().get(), 2);

        drop((first, third, again));
        assert_eq!(pool.available_count(), 3);
        assert_eq!(pool.metrics().total_created, 1);
    }

    #[test]
    fn test_seed_larger_than_capacity_rejected() {
        let config = PoolConfiguration::new().with_max_pool_size(1);
        let result = ResourcePool::new(vec![1, 2], || 0, config);
        assert!(matches!(
            result,
            Err(PoolError::SeedExceedsCapacity { seeded: 2, capacity: 1 })
        ));
    }

    #[test]
    fn test_drop_returns_resource() {
        let pool = connections(2, 1);
        {
            let _res = pool.acquire().unwrap();
            assert_eq!(pool.available_count(), 0);
            assert_eq!(pool.in_use_count(), 1);
        }
        assert_eq!(pool.available_count(), 1);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_release_into_other_pool_rejected() {
        let home = connections(2, 1);
        let other = connections(2, 1);

        let res = home.acquire().unwrap();
        let id = res.id();
        assert_eq!(other.release(res), Err(PoolError::UnknownResource(id)));

        assert_eq!(other.available_count(), 1);
        assert_eq!(home.available_count(), 1);
        assert_eq!(home.in_use_count(), 0);
        assert_eq!(other.metrics().rejected_releases, 1);
    }

    #[test]
    fn test_release_through_clone_accepted() {
        let pool = connections(1, 1);
        let handle = pool.clone();

        let res = pool.acquire().unwrap();
        handle.release(res).unwrap();
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_detach_frees_capacity() {
        let pool = connections(1, 1);
        let owned = pool.acquire().unwrap().detach();
        assert_eq!(owned, "conn-1");
        assert_eq!(pool.total_count(), 0);

        let fresh = pool.acquire().unwrap();
        assert_eq!(fresh.id().get(), 2);
    }

    #[test]
    fn test_warmup_stops_at_capacity() {
        let pool = connections(3, 1);
        assert_eq!(pool.warmup(5), 2);
        assert_eq!(pool.available_count(), 3);
        assert_eq!(pool.warmup(1), 0);
    }

    #[test]
    fn test_drain_available_keeps_checked_out() {
        let pool = connections(3, 3);
        let _held = pool.acquire().unwrap();

        let drained = pool.drain_available();
        assert_eq!(drained, vec!["conn-1".to_string(), "conn-2".to_string()]);
        assert_eq!(pool.available_count(), 0);
        assert_eq!(pool.in_use_count(), 1);
    }

    #[test]
    fn test_try_acquire() {
        let pool = connections(1, 0);
        let held = pool.try_acquire();
        assert!(held.is_some());
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.metrics().exhausted_events, 1);
    }

    #[test]
    fn test_health_reflects_saturation() {
        let pool = connections(1, 1);
        assert!(pool.health_status().is_healthy());
        let _held = pool.acquire().unwrap();
        assert!(!pool.health_status().is_healthy());
    }

    #[tokio::test]
    async fn test_acquire_async_waits_for_release() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(1)
            .with_poll_interval(Duration::from_millis(5));
        let pool = ResourcePool::new(vec![7], || 0, config).unwrap();

        let held = pool.acquire().unwrap();
        let waiter = pool.clone();
        let task = tokio::spawn(async move { waiter.acquire_async().await.map(|r| r.id()) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(task.await.unwrap(), Ok(ResourceId(1)));
    }

    #[tokio::test]
    async fn test_acquire_async_times_out() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(1)
            .with_timeout(Duration::from_millis(30));
        let pool = ResourcePool::new(vec![7], || 0, config).unwrap();

        let _held = pool.acquire().unwrap();
        assert_eq!(
            pool.acquire_async().await.err(),
            Some(PoolError::Timeout(Duration::from_millis(30)))
        );
        assert_eq!(pool.metrics().exhausted_events, 1);
    }
}
