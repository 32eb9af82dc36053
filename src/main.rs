// EsoxSolutions.ResourcePool
// Bounded resource pool and read-through cache

// This is just a demo wrapper - the actual library is in lib.rs
// Set RUST_LOG=debug to see the pool and cache at work

use esox_resourcepool::{
    CacheConfiguration, PoolConfiguration, PoolError, ReadThroughCache, ResourcePool,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct DatabaseConnection {
    id: u32,
}

impl DatabaseConnection {
    fn open(counter: &AtomicU32) -> Self {
        let id = counter.fetch_add(1, Ordering::Relaxed) + 1;
        println!("  Creating new connection with id: {id}");
        Self { id }
    }

    fn connect(&self) {
        println!("  Connection {} connected.", self.id);
    }

    fn disconnect(&self) {
        println!("  Connection {} disconnected.", self.id);
    }
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== EsoxSolutions.ResourcePool ===");
    println!();

    connection_pool()?;
    caching_proxy();
    Ok(())
}

fn connection_pool() -> Result<(), PoolError> {
    println!("Connection Pool:");

    static OPENED: AtomicU32 = AtomicU32::new(0);
    let seed = vec![
        DatabaseConnection::open(&OPENED),
        DatabaseConnection::open(&OPENED),
    ];
    let config = PoolConfiguration::new().with_max_pool_size(3).with_name("database");
    let pool = ResourcePool::new(seed, || DatabaseConnection::open(&OPENED), config)?;

    let c1 = pool.acquire()?;
    c1.connect();
    let c2 = pool.acquire()?;
    c2.connect();
    println!("  Available connections after getting 2: {}", pool.available_count());

    pool.release(c1)?;
    println!("  Available connections after releasing 1: {}", pool.available_count());

    let c3 = pool.acquire()?;
    c3.connect();
    let c4 = pool.acquire()?;
    c4.connect();
    match pool.acquire() {
        Err(err) => println!("  Checkout beyond capacity: {err}"),
        Ok(extra) => println!("  Checkout beyond capacity unexpectedly got {}", extra.id()),
    }
    println!("  Available connections at end: {}", pool.available_count());

    drop((c2, c3, c4));
    for conn in pool.drain_available() {
        conn.disconnect();
    }
    println!();
    Ok(())
}

fn caching_proxy() {
    println!("Caching Proxy:");

    let directory: HashMap<String, Vec<String>> = HashMap::from([
        ("us".to_string(), vec!["user1".to_string(), "user2".to_string()]),
        ("en".to_string(), vec!["user3".to_string(), "user4".to_string(), "user5".to_string()]),
    ]);
    let cache = ReadThroughCache::from_fn(
        move |country: &String| directory.get(country).cloned().unwrap_or_default(),
        CacheConfiguration::new().with_name("users"),
    );

    for country in ["us", "us", "en", "en"] {
        let users = cache.get(&country.to_string()).unwrap_or_else(|err| match err.into_inner() {});
        println!("  {} users: {:?}", country.to_uppercase(), users);
    }
    println!("  Access count: {}", cache.producer_calls());
}
