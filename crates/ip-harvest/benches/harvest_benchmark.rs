use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ip_harvest::{parse_dotted_quad, AddressClassifier, HarvesterBuilder};
use rand::Rng;
use std::hint::black_box;
use std::net::Ipv4Addr;

// Helper function to generate a random IPv4 address
fn random_ipv4() -> String {
    let mut rng = rand::thread_rng();
    Ipv4Addr::new(rng.gen(), rng.gen(), rng.gen(), rng.gen()).to_string()
}

// Generate a sparse string of IPs (simulating logs)
fn generate_log_data(n_ips: usize, bytes_per_ip: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut s = String::new();

    let noise_chars: Vec<char> =
        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-:[]/. "
            .chars()
            .collect();

    for i in 0..n_ips {
        let noise_len = rng.gen_range(bytes_per_ip / 2..bytes_per_ip * 2);
        for _ in 0..noise_len {
            s.push(noise_chars[rng.gen_range(0..noise_chars.len())]);
        }
        s.push(' ');
        s.push_str(&random_ipv4());
        s.push_str(if i % 10 == 0 { "\n" } else { " " });
    }
    s.into_bytes()
}

fn bench_harvest_chunk_sizes(c: &mut Criterion) {
    let data = generate_log_data(20_000, 120);
    let mut group = c.benchmark_group("harvest_chunk_size");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let harvester = HarvesterBuilder::new()
            .chunk_size(chunk_size)
            .build()
            .expect("Failed to build harvester");
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &data,
            |b, data| b.iter(|| harvester.harvest(black_box(&data[..])).unwrap()),
        );
    }
    group.finish();
}

fn bench_harvest_workers(c: &mut Criterion) {
    let data = generate_log_data(20_000, 120);
    let mut group = c.benchmark_group("harvest_workers");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for workers in [1, 2, 4, 8] {
        let harvester = HarvesterBuilder::new()
            .chunk_size(64 * 1024)
            .workers(workers)
            .build()
            .expect("Failed to build harvester");
        group.bench_with_input(BenchmarkId::from_parameter(workers), &data, |b, data| {
            b.iter(|| harvester.harvest(black_box(&data[..])).unwrap())
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let classifier = AddressClassifier::default();
    let samples: Vec<String> = (0..1000).map(|_| random_ipv4()).collect();

    c.bench_function("parse_dotted_quad", |b| {
        b.iter(|| {
            for s in &samples {
                black_box(parse_dotted_quad(s.as_bytes()));
            }
        })
    });
    c.bench_function("classify", |b| {
        b.iter(|| {
            for s in &samples {
                black_box(classifier.classify(s));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_harvest_chunk_sizes,
    bench_harvest_workers,
    bench_classify
);
criterion_main!(benches);
