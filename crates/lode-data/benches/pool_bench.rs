use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lode_data::{ByteArrayPool, LruCache, PixelBufferPool, PixelFormat};

fn bench_pools(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pools");

    let pixel_pool = PixelBufferPool::new(64 * 1024 * 1024);
    group.bench_function("PixelBufferPool get/put (warm)", |b| {
        b.iter(|| {
            let buffer = pixel_pool.get_dirty(256, 256, PixelFormat::Rgba8888);
            black_box(buffer.allocation_size());
            let _ = pixel_pool.put(buffer);
        });
    });

    group.bench_function("PixelBufferPool get (cold, zeroed)", |b| {
        let cold = PixelBufferPool::new(0);
        b.iter(|| black_box(cold.get(256, 256, PixelFormat::Rgba8888)));
    });

    let array_pool = ByteArrayPool::new(4 * 1024 * 1024);
    group.bench_function("ByteArrayPool get/put", |b| {
        b.iter(|| {
            let array = array_pool.get(64 * 1024);
            black_box(array.len());
            let _ = array_pool.put(array);
        });
    });

    group.finish();
}

fn bench_memory_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("Memory Cache");

    // 1,000 entries of 1 KiB in a cache that holds 512 of them.
    group.bench_function("LruCache put with eviction", |b| {
        let mut cache = LruCache::new(512 * 1024, |v: &Vec<u8>| v.len());
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 1) % 1_000;
            black_box(cache.put(i, vec![0u8; 1024]));
        });
    });

    group.bench_function("LruCache get (hit)", |b| {
        let mut cache = LruCache::new(usize::MAX, |v: &Vec<u8>| v.len());
        for i in 0..1_000u32 {
            cache.put(i, vec![0u8; 16]);
        }
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 7) % 1_000;
            black_box(cache.get(&i).map(Vec::len));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pools, bench_memory_cache);
criterion_main!(benches);
