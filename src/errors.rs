//! Error types for the resource pool and the read-through cache

use crate::pool::ResourceId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool is exhausted - all {capacity} resources are checked out")]
    PoolExhausted { capacity: usize },

    #[error("Resource {0} is not checked out from this pool")]
    UnknownResource(ResourceId),

    #[error("Seed of {seeded} resources exceeds pool capacity {capacity}")]
    SeedExceedsCapacity { seeded: usize, capacity: usize },

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Failure surfaced by a read-through cache.
///
/// The key that failed is left unpopulated, so a later call retries the producer.
#[derive(Error, Debug)]
pub enum CacheError<E> {
    #[error("Producer failed: {0}")]
    ProducerFailure(#[source] E),
}

impl<E> CacheError<E> {
    /// Unwrap the producer's own error
    pub fn into_inner(self) -> E {
        match self {
            CacheError::ProducerFailure(err) => err,
        }
    }
}

pub type CacheResult<T, E> = Result<T, CacheError<E>>;
