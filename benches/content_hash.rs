//! Content-hash throughput across length classes and backings.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use zbuf::{hash, HeapStore, NativeStore};

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i as u8).wrapping_mul(31).wrapping_add(7)).collect()
}

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_hash");
    for len in [7usize, 8, 16, 32, 256, 4096, 65536] {
        let data = pattern(len);
        let heap = HeapStore::copy_of(&data);
        let native = NativeStore::copy_of(&data).expect("alloc");

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("vanilla", len), &heap, |b, store| {
            b.iter(|| hash::hash(black_box(store)).expect("hash"));
        });
        group.bench_with_input(BenchmarkId::new("optimised", len), &native, |b, store| {
            b.iter(|| hash::hash(black_box(store)).expect("hash"));
        });
    }
    group.finish();
}

fn bench_hash32(c: &mut Criterion) {
    let data = pattern(1024);
    let store = NativeStore::copy_of(&data).expect("alloc");
    c.bench_function("content_hash/hash32_1k", |b| {
        b.iter(|| hash::hash32(black_box(&store)).expect("hash"));
    });
}

criterion_group!(benches, bench_hash, bench_hash32);
criterion_main!(benches);
