//! Benchmarks for route handling on the accept path.
//!
//! Run with: `cargo bench`
//!
//! Every accepted connection does one linear lookup by source address, and
//! every control `add` does one upsert; both should stay well under a
//! microsecond for a few hundred routes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tcproxy::routes::{RouteSpec, RouteTable};

// ============================================================================
// Helper Functions
// ============================================================================

fn source(i: usize) -> IpAddr {
    let octet = (i % 256) as u8;
    let second_octet = ((i / 256) % 256) as u8;
    IpAddr::V4(Ipv4Addr::new(10, 0, second_octet, octet))
}

/// Build a table with `route_count` idle routes.
fn build_table(route_count: usize) -> RouteTable {
    let target: SocketAddr = "192.168.1.1:8080".parse().unwrap();
    let mut table = RouteTable::new();
    for i in 0..route_count {
        table.upsert(source(i), target, |_| {});
    }
    table
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_find");
    for count in [10, 100, 1000] {
        let table = build_table(count);
        let last = source(count - 1);
        let missing = IpAddr::V4(Ipv4Addr::new(172, 16, 0, 1));

        group.bench_with_input(BenchmarkId::new("hit_last", count), &last, |b, ip| {
            b.iter(|| black_box(table.find(black_box(*ip))));
        });
        group.bench_with_input(BenchmarkId::new("miss", count), &missing, |b, ip| {
            b.iter(|| black_box(table.find(black_box(*ip))));
        });
    }
    group.finish();
}

fn bench_upsert(c: &mut Criterion) {
    let target: SocketAddr = "192.168.1.2:22".parse().unwrap();
    let mut table = build_table(100);

    c.bench_function("route_upsert_existing", |b| {
        b.iter(|| black_box(table.upsert(black_box(source(50)), target, |_| {})));
    });
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("route_spec_parse", |b| {
        b.iter(|| black_box("10.0.0.1 backend.example.org:8080".parse::<RouteSpec>()));
    });
}

criterion_group!(benches, bench_find, bench_upsert, bench_parse);
criterion_main!(benches);
