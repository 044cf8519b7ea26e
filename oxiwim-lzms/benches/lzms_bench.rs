//! Performance benchmarks for oxiwim-lzms
//!
//! This benchmark suite evaluates:
//! - Position and length slot lookup (binary search and fast path)
//! - x86 filter throughput on code-like and random data

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxiwim_lzms::{SlotTables, X86Filter};
use std::hint::black_box;

/// Reproducible pseudo-random bytes
fn random(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut seed: u64 = 0x123456789ABCDEF0;
    for _ in 0..size {
        // Linear congruential generator
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        data.push((seed >> 32) as u8);
    }
    data
}

/// Random bytes with a call instruction every 16 bytes
fn code_like(size: usize) -> Vec<u8> {
    let mut data = random(size);
    for pos in (1..size.saturating_sub(16)).step_by(16) {
        data[pos] = 0xe8;
    }
    data
}

fn bench_slot_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_lookup");
    let tables = SlotTables::get();
    let offsets: Vec<u32> = (1..4096u32).map(|i| i.wrapping_mul(2_654_435_761) % (1 << 24) + 1).collect();
    let lengths: Vec<u32> = (1..4096u32).map(|i| i % 3000 + 1).collect();

    group.throughput(Throughput::Elements(offsets.len() as u64));
    group.bench_function("position_slot", |b| {
        b.iter(|| {
            offsets
                .iter()
                .map(|&o| tables.position_slot(black_box(o)))
                .sum::<usize>()
        })
    });
    group.bench_function("length_slot", |b| {
        b.iter(|| {
            lengths
                .iter()
                .map(|&l| tables.length_slot(black_box(l)))
                .sum::<usize>()
        })
    });

    group.finish();
}

fn bench_x86_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("x86_filter");
    let mut filter = X86Filter::new();

    let patterns: [(&str, fn(usize) -> Vec<u8>); 2] = [("random", random), ("code_like", code_like)];
    for (name, generator) in patterns {
        let data = generator(1024 * 1024);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", name), &data, |b, data| {
            b.iter(|| {
                let mut buf = data.clone();
                filter.encode(black_box(&mut buf)).unwrap();
                buf
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slot_lookup, bench_x86_filter);
criterion_main!(benches);
