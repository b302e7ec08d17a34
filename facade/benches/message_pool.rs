//! Message-pool throughput: acquire/dispose cycles under steady-state
//! streaming, where a buffer pool avoiding allocation is the whole point.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use livewire_proto::message::MessagePool;

const MESSAGE_SIZES: &[usize] = &[64, 256, 1024, 4096, 16384];
const ITERATIONS: usize = 10_000;

fn acquire_release_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_pool/acquire_release");

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes((size * ITERATIONS) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let pool = MessagePool::new(1 << 20, 64, 8 * 1024);

            b.iter(|| {
                for _ in 0..ITERATIONS {
                    let mut buf = pool.acquire(size).unwrap();
                    buf.extend_from_slice(&vec![0u8; size]);
                    black_box(&buf);
                    pool.release(buf);
                }
            });
        });
    }
    group.finish();
}

fn cold_allocation_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_pool/cold_allocation_baseline");

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes((size * ITERATIONS) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for _ in 0..ITERATIONS {
                    let mut buf = BytesMut::with_capacity(size);
                    buf.extend_from_slice(&vec![0u8; size]);
                    black_box(&buf);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, acquire_release_cycle, cold_allocation_baseline);
criterion_main!(benches);
