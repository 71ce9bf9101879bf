use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use elastic_stm::{Stm, StmConfig, TObject, Value};

pub fn criterion_benchmark(c: &mut Criterion) {
    let stm = Stm::new(StmConfig::default().with_lock_table_bits(16)).unwrap();

    // Cost of a commit as the write set grows
    let mut g1 = c.benchmark_group("commit-writes");
    for len in [1, 8, 64] {
        let object = TObject::with_values(&vec![Value::I64(0); len]);
        let fields: Vec<_> = (0..len).map(|i| object.field::<i64>(i)).collect();
        let mut tx = stm.context();

        g1.bench_with_input(BenchmarkId::from_parameter(len), &fields, |b, fields| {
            b.iter(|| {
                tx.atomically(0, "", |tx| {
                    for field in fields {
                        field.modify(tx, |x| x + 1)?;
                    }
                    Ok(())
                })
                .unwrap()
            })
        });
    }
    g1.finish();

    // Commit validating a read set after the clock moved past lb + 1
    let mut g2 = c.benchmark_group("commit-validate");
    for reads in [8, 64, 512] {
        let object = TObject::with_values(&vec![Value::I64(1); reads + 2]);
        let fields: Vec<_> = (0..reads).map(|i| object.field::<i64>(i)).collect();
        let target = object.field::<i64>(reads);
        let bump = object.field::<i64>(reads + 1);
        let mut tx = stm.context();
        let mut other = stm.context();

        g2.bench_function(BenchmarkId::from_parameter(reads), |b| {
            b.iter(|| {
                tx.init(0, "");
                let mut sum = 0;
                for field in &fields {
                    sum += field.read(&mut tx).unwrap();
                }
                target.write(&mut tx, black_box(sum)).unwrap();
                // disjoint commit, so the clock is past lb + 1
                other
                    .atomically(1, "", |other| bump.modify(other, |x| x + 1))
                    .unwrap();
                black_box(tx.commit())
            })
        });
    }
    g2.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
