//! Pool and cache configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_pool_size(3)
///     .with_name("db")
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.max_pool_size, 3);
/// assert_eq!(config.name, "db");
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Upper bound on idle plus checked-out resources
    pub max_pool_size: usize,

    /// Name used in logs and exported metrics
    pub name: String,

    /// How long `acquire_async` keeps retrying before giving up
    pub operation_timeout: Duration,

    /// Delay between retries in `acquire_async`
    pub poll_interval: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_pool_size: 100,
            name: "resource_pool".to_string(),
            operation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity ceiling
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the timeout used by `acquire_async`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the retry interval used by `acquire_async`
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Reject settings the pool cannot operate with
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_pool_size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for read-through caches
///
/// ```
/// use esox_resourcepool::CacheConfiguration;
///
/// let config = CacheConfiguration::new()
///     .with_name("users")
///     .with_initial_capacity(64);
///
/// assert_eq!(config.initial_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfiguration {
    /// Name used in logs and exported metrics
    pub name: String,

    /// Number of entries to reserve space for up front
    pub initial_capacity: usize,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            name: "read_through_cache".to_string(),
            initial_capacity: 0,
        }
    }
}

impl CacheConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
