//! Criterion benchmarks for the sorted writer.
//!
//! Run with:
//!   cargo bench --bench sort

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use recout::{ExtOptions, Out, OutOptions};
use tempfile::TempDir;

/// Deterministic synthetic keys (xorshift), fresh per invocation.
fn keys(n: usize) -> Vec<[u8; 16]> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..n)
        .map(|_| {
            let mut key = [0u8; 16];
            for half in key.chunks_mut(8) {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                half.copy_from_slice(&state.to_be_bytes());
            }
            key
        })
        .collect()
}

fn bench_sorted_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_writer");

    for &n in &[10_000usize, 100_000] {
        let data = keys(n);
        group.throughput(Throughput::Bytes((n * 16) as u64));

        // In-memory only: buffer sized to hold everything.
        group.bench_with_input(BenchmarkId::new("in_memory", n), &data, |b, data| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let ext = ExtOptions::default().compare(|a, b| a.bytes.cmp(b.bytes));
                let opts = OutOptions::default().buffer_size(64 << 20);
                let mut out = Out::create_ext(dir.path().join("keys"), opts, ext).unwrap();
                for key in data {
                    out.write_record(key).unwrap();
                }
                let mut input = out.into_input().unwrap().unwrap();
                let mut count = 0usize;
                while let Some(rec) = input.next().unwrap() {
                    count += black_box(rec.bytes.len());
                }
                black_box(count)
            })
        });

        // Spilling external sort with the background spill thread.
        group.bench_with_input(BenchmarkId::new("spilled", n), &data, |b, data| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let ext = ExtOptions::default()
                    .compare(|a, b| a.bytes.cmp(b.bytes))
                    .use_extra_thread();
                let opts = OutOptions::default().buffer_size(128 * 1024);
                let mut out = Out::create_ext(dir.path().join("keys"), opts, ext).unwrap();
                for key in data {
                    out.write_record(key).unwrap();
                }
                let mut input = out.into_input().unwrap().unwrap();
                let mut count = 0usize;
                while let Some(rec) = input.next().unwrap() {
                    count += black_box(rec.bytes.len());
                }
                black_box(count)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sorted_writer);
criterion_main!(benches);
