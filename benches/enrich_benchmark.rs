//! Benchmarks for enrichment throughput.
//!
//! Run with: cargo bench
//!
//! This benchmark suite measures:
//! - Classification cost for public, private and invalid values
//! - Encoding cost for full and partial lookup results
//! - Row throughput with and without the lookup cache
//! - Whole-table versus chunked processing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geoip_enrich::{
    classify, encode, EnrichOptions, Enricher, GeoLookup, Location, LocationSource, Lookup,
    LookupResult,
};
use std::net::IpAddr;

/// Synthetic location backend doing a small amount of work per query.
struct SyntheticLocations;

impl LocationSource for SyntheticLocations {
    fn locate(&self, ip: IpAddr) -> Lookup<Location> {
        match ip {
            IpAddr::V4(v4) => {
                let [a, b, c, _] = v4.octets();
                Lookup::Found(Location {
                    country_code: Some(format!("C{}", a % 50)),
                    region: Some(format!("Region {}", b)),
                    city: Some(format!("City {}", c)),
                    latitude: Some(a as f64 * 0.5),
                    longitude: Some(b as f64 * -0.5),
                })
            }
            IpAddr::V6(_) => Lookup::NotFound,
        }
    }
}

/// Generate a CSV with `rows` rows drawn from `distinct` public addresses,
/// mixed with private and invalid values.
fn generate_csv(rows: usize, distinct: usize) -> String {
    let mut csv = String::from("id,ip,agent\n");
    for i in 0..rows {
        let ip = match i % 10 {
            0 => "192.168.1.20".to_string(),
            1 => "-".to_string(),
            _ => {
                let n = i % distinct;
                format!("{}.{}.{}.{}", 20 + n % 180, (n / 180) % 256, n % 256, 1 + n % 250)
            }
        };
        csv.push_str(&format!("{},{},Mozilla/5.0\n", i, ip));
    }
    csv
}

fn enricher(batch_size: usize, cache: usize) -> Enricher {
    Enricher::new(
        GeoLookup::new(Box::new(SyntheticLocations), None).with_cache(cache),
        EnrichOptions {
            batch_size,
            ..Default::default()
        },
    )
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    for (name, value) in [
        ("public_v4", "8.8.8.8"),
        ("private_v4", "10.20.30.40"),
        ("public_v6", "2606:4700:4700::1111"),
        ("invalid", "not-an-ip"),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), value, |b, v| {
            b.iter(|| classify(black_box(v)))
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let full = LookupResult {
        country_code: Some("US".to_string()),
        region: Some("Washington".to_string()),
        city: Some("Seattle".to_string()),
        latitude: Some(47.6062),
        longitude: Some(-122.3321),
        asn: Some(15169),
        org: Some("Google LLC".to_string()),
    };
    let partial = LookupResult {
        country_code: Some("US".to_string()),
        ..Default::default()
    };

    let mut group = c.benchmark_group("encode");
    group.bench_function("full", |b| b.iter(|| encode(black_box(&full))));
    group.bench_function("partial", |b| b.iter(|| encode(black_box(&partial))));
    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let rows = 20_000;
    let input = generate_csv(rows, 500);

    let mut group = c.benchmark_group("run");
    group.throughput(Throughput::Elements(rows as u64));

    for (name, batch_size, cache) in [
        ("whole_no_cache", 0, 0),
        ("whole_cached", 0, 10_000),
        ("chunked_1k_cached", 1_000, 10_000),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let e = enricher(batch_size, cache);
                let mut out = Vec::with_capacity(input.len() * 2);
                e.run(black_box(input.as_bytes()), || Ok(&mut out)).unwrap();
                out.len()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_classify, bench_encode, bench_run);
criterion_main!(benches);
