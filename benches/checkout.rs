use criterion::{Criterion, black_box, criterion_group, criterion_main};
use esox_resourcepool::{CacheConfiguration, PoolConfiguration, ReadThroughCache, ResourcePool};

fn pool_checkout(c: &mut Criterion) {
    let config = PoolConfiguration::new().with_max_pool_size(16);
    let pool = ResourcePool::new((0..16u64).collect(), || 0, config).unwrap();

    c.bench_function("pool acquire/release", |b| {
        b.iter(|| {
            let res = pool.acquire().unwrap();
            black_box(*res);
            pool.release(res).unwrap();
        })
    });
}

fn cache_hit(c: &mut Criterion) {
    let cache = ReadThroughCache::from_fn(|key: &String| key.len(), CacheConfiguration::default());
    let key = "us".to_string();
    cache.get(&key).unwrap();

    c.bench_function("cache hit", |b| b.iter(|| black_box(cache.get(&key).unwrap())));
}

criterion_group!(benches, pool_checkout, cache_hit);
criterion_main!(benches);
