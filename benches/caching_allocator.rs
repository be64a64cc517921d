//! Caching allocator benchmarks.
//!
//! Compares a cache hit against a round trip through the backend allocator
//! for a range of region sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hetmem::memory::{Allocator, CachingAllocator, DeviceAllocator, DeviceBuffer};

fn bench_allocate_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_release");
    group.throughput(Throughput::Elements(1));

    for count in [64usize, 4096, 1 << 20] {
        group.bench_with_input(BenchmarkId::new("cached", count), &count, |b, &n| {
            let alloc = CachingAllocator::<f32, DeviceAllocator>::default();
            b.iter(|| {
                let p = alloc.allocate(black_box(n));
                unsafe { alloc.deallocate(p, n) };
            })
        });

        group.bench_with_input(BenchmarkId::new("uncached", count), &count, |b, &n| {
            let alloc: DeviceAllocator = DeviceAllocator::new();
            b.iter(|| {
                let p: *mut f32 = alloc.allocate(black_box(n));
                unsafe { alloc.deallocate(p, n) };
            })
        });
    }

    group.finish();
}

fn bench_buffer_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_upload");

    for count in [1024usize, 65536] {
        let data = vec![1.0f32; count];
        group.throughput(Throughput::Bytes((count * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| {
                let buffer = DeviceBuffer::from_host(black_box(data));
                black_box(buffer.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allocate_release, bench_buffer_upload);
criterion_main!(benches);
