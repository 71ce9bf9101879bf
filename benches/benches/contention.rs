use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::thread;

use elastic_stm::{Stm, StmConfig, TField, TObject, TVar, Value};

const THREADS: usize = 4;
const LIST_LEN: usize = 256;

/// Every thread scans the list and updates one element per round.
fn scan_and_update(stm: &Stm, list: &[TField<u64>], mode: &str, rounds: usize) {
    thread::scope(|s| {
        for t in 0..THREADS {
            s.spawn(move || {
                let mut tx = stm.context();
                for round in 0..rounds {
                    let target = (t * 31 + round * 7) % list.len();
                    tx.atomically(0, mode, |tx| {
                        for field in &list[..target] {
                            field.read(tx)?;
                        }
                        list[target].modify(tx, |x| x + 1)
                    })
                    .unwrap();
                }
            });
        }
    });
}

/// Concurrent increments of one hot counter.
fn hot_counter(stm: &Stm, counter: &TVar<u64>, mode: &str, rounds: usize) {
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(move || {
                let mut tx = stm.context();
                for _ in 0..rounds {
                    tx.atomically(0, mode, |tx| counter.modify(tx, |x| x + 1))
                        .unwrap();
                }
            });
        }
    });
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let stm = Stm::new(StmConfig::default()).unwrap();
    let object = TObject::with_values(&[Value::U64(0); LIST_LEN]);
    let list: Vec<_> = (0..LIST_LEN).map(|i| object.field::<u64>(i)).collect();
    let counter = TVar::new(0_u64);

    let mut g1 = c.benchmark_group("list-scan-update");
    g1.sample_size(20);
    for mode in ["regular", "elastic"] {
        g1.bench_function(BenchmarkId::from_parameter(mode), |b| {
            b.iter(|| scan_and_update(&stm, &list, mode, 100))
        });
    }
    g1.finish();

    let mut g2 = c.benchmark_group("hot-counter");
    g2.sample_size(20);
    for mode in ["regular", "elastic"] {
        g2.bench_function(BenchmarkId::from_parameter(mode), |b| {
            b.iter(|| hot_counter(&stm, &counter, mode, 1000))
        });
    }
    g2.finish();

    let stats = stm.collect_stats();
    println!("{stats}");
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
