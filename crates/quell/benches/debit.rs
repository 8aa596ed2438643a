//! Debit hot-path benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use quell::{Action, AllowanceCategory, ClientAddr, Config, ResponseTuple, Rrl};

fn debit_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("debit");
    group.throughput(Throughput::Elements(1));

    let src = ClientAddr::new("udp", "192.0.2.1:4096");
    let tuple = ResponseTuple::new(1, 1, AllowanceCategory::Answer, "example.com.");

    // A limit high enough that the account stays in credit: the common
    // case on a healthy server.
    let mut cfg = Config::new();
    cfg.set("responses-per-second", "100000000").unwrap();
    let rrl = Rrl::new(cfg);
    group.bench_function("send_path", |b| {
        b.iter(|| black_box(rrl.debit(black_box(&src), black_box(&tuple))))
    });

    // A saturated account: every debit clamps at the window floor.
    let mut cfg = Config::new();
    cfg.set("responses-per-second", "1").unwrap();
    cfg.set("slip-ratio", "0").unwrap();
    let rrl = Rrl::new(cfg);
    assert_eq!(rrl.debit(&src, &tuple).action, Action::Send);
    group.bench_function("drop_path", |b| {
        b.iter(|| black_box(rrl.debit(black_box(&src), black_box(&tuple))))
    });

    group.finish();
}

criterion_group!(benches, debit_benchmarks);
criterion_main!(benches);
