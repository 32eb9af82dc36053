//! Health reporting for resource pools

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{PoolConfiguration, ResourcePool};
///
/// let pool = ResourcePool::new(vec![1, 2, 3], || 0, PoolConfiguration::default()).unwrap();
///
/// let health = pool.health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.available, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct HealthStatus {
    pub is_healthy: bool,

    /// Checked-out share of capacity (0.0 to 1.0)
    pub utilization: f64,

    pub available: usize,

    pub in_use: usize,

    pub capacity: usize,

    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive a status from a snapshot of the pool's counts
    pub fn new(available: usize, in_use: usize, capacity: usize) -> Self {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        // Next acquire will fail fast
        if available == 0 && in_use >= capacity {
            warnings.push("Pool is at capacity".to_string());
        }

        Self {
            is_healthy,
            utilization,
            available,
            in_use,
            capacity,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
