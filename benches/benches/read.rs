use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicU64, Ordering};

use elastic_stm::{LastReadEntries, ReadEntry, ReadSet, Stm, StmConfig, TObject, TVar, Value};

pub fn criterion_benchmark(c: &mut Criterion) {
    let stm = Stm::new(StmConfig::default().with_lock_table_bits(16)).unwrap();

    // Raw word against a field read outside any transaction
    let word = black_box(AtomicU64::new(21123));
    let var = black_box(TVar::new(21123_u64));

    let mut g1 = c.benchmark_group("atomic-read");
    g1.bench_function("word", |b| b.iter(|| black_box(word.load(Ordering::Acquire))));
    g1.bench_function("tvar", |b| b.iter(|| black_box(var.read_atomic())));
    g1.finish();

    // Transactional scans, one attempt per iteration
    let mut g2 = c.benchmark_group("tx-scan");
    for len in [8, 64, 512] {
        let object = TObject::with_values(&vec![Value::U64(1); len]);
        let fields: Vec<_> = (0..len).map(|i| object.field::<u64>(i)).collect();
        let mut tx = stm.context();

        for mode in ["regular", "elastic"] {
            g2.bench_with_input(BenchmarkId::new(mode, len), &fields, |b, fields| {
                b.iter(|| {
                    tx.atomically(0, mode, |tx| {
                        let mut sum = 0;
                        for field in fields {
                            sum += field.read(tx)?;
                        }
                        Ok(sum)
                    })
                    .unwrap()
                })
            });
        }
    }
    g2.finish();

    // Bookkeeping of one read, before and after the first write
    let object = TObject::new(1);
    let entry = ReadEntry {
        location: object.location(0),
        slot: 0,
        observed: 0,
    };
    let mut g3 = c.benchmark_group("read-log");
    for k in [1, 2, 8] {
        let mut window = LastReadEntries::new(k);
        g3.bench_function(BenchmarkId::new("window", k), |b| {
            b.iter(|| window.push(black_box(entry)))
        });
    }
    let mut set = ReadSet::new();
    g3.bench_function("read-set", |b| {
        b.iter(|| {
            set.push(black_box(entry));
            if set.len() == 1024 {
                set.clear();
            }
        })
    });
    g3.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
