//! Benchmarks for rule compilation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use deadlock_server_picker::compiler::compile;
use deadlock_server_picker::models::{ServerEntry, ServerRelay};

/// Generate synthetic server entries with a few relays each.
fn generate_entries(count: usize, relays_per_entry: usize) -> Vec<ServerEntry> {
    (0..count)
        .map(|i| {
            let relays = (0..relays_per_entry)
                .map(|j| {
                    let n = i * relays_per_entry + j;
                    ServerRelay {
                        ipv4: format!(
                            "{}.{}.{}.{}",
                            10 + (n >> 24) % 200,
                            (n >> 16) % 256,
                            (n >> 8) % 256,
                            n % 256
                        )
                        .parse()
                        .unwrap(),
                        port_range: Some((27015, 27068)),
                    }
                })
                .collect();
            ServerEntry::new(format!("srv{:04}", i), format!("Server {}", i), relays)
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for size in [10, 100, 1000] {
        let entries = generate_entries(size, 4);
        group.bench_with_input(BenchmarkId::new("entries", size), &entries, |b, entries| {
            b.iter(|| compile(black_box(entries)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
