//! # EsoxSolutions.ResourcePool
//!
//! Thread-safe building blocks for sharing expensive resources between
//! threads.
//!
//! ## Features
//!
//! - Bounded resource pool with LIFO reuse and lazy growth up to capacity
//! - Fail-fast exhaustion: `acquire` never waits, it reports `PoolExhausted`
//! - Automatic return of resources via RAII (Drop trait)
//! - Optional async acquire with timeout for callers that want to wait
//! - Read-through cache that runs its producer at most once per key
//! - Async read-through cache for async lookup services
//! - Metrics, health status and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{CacheConfiguration, PoolConfiguration, ReadThroughCache, ResourcePool};
//!
//! let config = PoolConfiguration::new().with_max_pool_size(3);
//! let pool = ResourcePool::new(vec![1, 2], || 3, config).unwrap();
//! {
//!     let conn = pool.acquire().unwrap();
//!     println!("Got: {}", *conn);
//!     // Resource automatically returned when `conn` goes out of scope
//! }
//!
//! let cache = ReadThroughCache::from_fn(|key: &String| key.len(), CacheConfiguration::default());
//! assert_eq!(cache.get(&"us".to_string()).unwrap(), 2);
//! ```

mod cache;
mod config;
mod errors;
mod health;
mod metrics;
mod pool;

pub use cache::{AsyncProducer, AsyncReadThroughCache, ReadThroughCache};
pub use config::{CacheConfiguration, PoolConfiguration};
pub use errors::{CacheError, CacheResult, PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::{CacheMetrics, PoolMetrics};
pub use pool::{PooledResource, ResourceId, ResourcePool};
