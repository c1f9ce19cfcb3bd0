//! Recording and Persistence Benchmarks
//!
//! Benchmarks for the hot counting path, class publication, snapshot
//! encoding and merging.
//!
//! Run with: `cargo bench --bench recording_ops`

use covtally::codec::snapshot::{read_snapshot, write_snapshot};
use covtally::{
    merge_all, BranchRecord, ClassLayout, ClassRecord, HitStore, LineLayout, LineRecord, Snapshot,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn layout(lines: u32) -> ClassLayout {
    ClassLayout::new(
        (1..=lines)
            .map(|line| {
                let layout = LineLayout::new(line, "run(Lcom/example/Foo;)V");
                if line % 4 == 0 {
                    layout.with_branches(1)
                } else {
                    layout
                }
            })
            .collect(),
    )
}

fn snapshot(classes: usize, lines: u32) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for idx in 0..classes {
        let mut class = ClassRecord::new(format!("com.example.pkg{}.Class{idx}", idx % 7));
        for line in 1..=lines {
            let mut record = LineRecord::new(line, "run(Lcom/example/Foo;)V").with_hits(line % 3);
            if line % 4 == 0 {
                record = record.with_branch(BranchRecord::new(line % 2, 1));
            }
            class.insert_line(record);
        }
        snapshot.insert(class);
    }
    snapshot
}

fn bench_counter_touch(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_touch");

    for count in [1_000u32, 10_000, 100_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_hits")),
            &count,
            |bench, &n| {
                let store = HitStore::default();
                let class = store.get_or_create_with("com.example.Hot", || layout(64));
                bench.iter(|| {
                    for i in 0..n {
                        class.record_hit(black_box(i % 64 + 1));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_class_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("class_lookup");

    for classes in [10usize, 100, 1_000] {
        let store = HitStore::default();
        let names: Vec<String> = (0..classes).map(|i| format!("com.example.C{i}")).collect();
        for name in &names {
            let _ = store.get_or_create_with(name, || layout(8));
        }
        group.bench_with_input(BenchmarkId::from_parameter(classes), &names, |bench, names| {
            bench.iter(|| {
                for name in names {
                    black_box(store.get_or_create(black_box(name)));
                }
            });
        });
    }

    group.finish();
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_encode");

    for (classes, lines) in [(10usize, 50u32), (100, 100), (500, 200)] {
        let data = snapshot(classes, lines);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{classes}x{lines}")),
            &data,
            |bench, data| {
                bench.iter(|| {
                    let mut bytes = Vec::new();
                    write_snapshot(black_box(data), &mut bytes).unwrap();
                    black_box(bytes);
                });
            },
        );
    }

    group.finish();
}

fn bench_snapshot_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_decode");

    for (classes, lines) in [(10usize, 50u32), (100, 100), (500, 200)] {
        let mut bytes = Vec::new();
        write_snapshot(&snapshot(classes, lines), &mut bytes).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{classes}x{lines}")),
            &bytes,
            |bench, bytes| {
                bench.iter(|| black_box(read_snapshot(black_box(bytes.as_slice())).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for runs in [2usize, 10, 50] {
        let reports: Vec<Snapshot> = (0..runs).map(|_| snapshot(50, 100)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(runs), &reports, |bench, reports| {
            bench.iter(|| black_box(merge_all(reports.iter())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_counter_touch,
    bench_class_lookup,
    bench_snapshot_encode,
    bench_snapshot_decode,
    bench_merge,
);
criterion_main!(benches);
