use std::fs;
use std::path::{Path, PathBuf};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use stripefs::config::Identity;
use stripefs::stripe::stripe_lengths;
use stripefs::{Config, Driver, Layout};

fn make_driver(stripe_count: usize, chunk_size: u64) -> (TempDir, Driver) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mountpoint = dir.path().join("mnt");
    fs::create_dir(&mountpoint).expect("mountpoint");
    let stripes: Vec<PathBuf> = (1..=stripe_count)
        .map(|i| {
            let stripe = dir.path().join(format!("s{}", i));
            fs::create_dir(&stripe).expect("stripe");
            stripe
        })
        .collect();

    let mut config = Config::new(&mountpoint, stripes, chunk_size);
    config.identity = Some(Identity { uid: 0, gid: 0 });
    let driver = Driver::new(&config).expect("driver");
    (dir, driver)
}

// ── Pure arithmetic ─────────────────────────────────────────────────────

fn bench_translate(c: &mut Criterion) {
    let layout = Layout::new(4096, 4).expect("layout");

    c.bench_function("translate_offset", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            offset = offset.wrapping_add(7919);
            black_box(layout.translate(black_box(offset)))
        });
    });

    c.bench_function("stripe_lengths_8", |b| {
        b.iter(|| black_box(stripe_lengths(black_box(1 << 30), 4096, 8)));
    });
}

// ── Striped I/O over tempdir stripes ────────────────────────────────────

fn bench_write_read(c: &mut Criterion) {
    let payload = vec![0xA5u8; 256 * 1024];
    let mut group = c.benchmark_group("striped_io");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for &chunk_size in &[1024u64, 65536] {
        let (_dir, driver) = make_driver(3, chunk_size);
        let file = Path::new("/bench");
        driver.create(file, 0o644).expect("create");

        group.bench_with_input(BenchmarkId::new("write", chunk_size), &chunk_size, |b, _| {
            b.iter(|| driver.write(file, black_box(&payload), 0).expect("write"));
        });

        group.bench_with_input(BenchmarkId::new("read", chunk_size), &chunk_size, |b, _| {
            b.iter(|| black_box(driver.read(file, payload.len(), 0).expect("read")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_translate, bench_write_read);
criterion_main!(benches);
