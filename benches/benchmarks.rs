use belief_net::models::{random_chain, random_tree, sprinkler};
use belief_net::Evidence;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bench_bp(c: &mut Criterion) {
    let mut group = c.benchmark_group("BeliefPropagation");
    let n_states = 2;

    for size in [10, 50, 100].iter() {
        let net = random_chain(*size, n_states, 42).expect("chain fixture");
        let last = format!("x{}", size - 1);

        group.bench_with_input(BenchmarkId::new("Chain", size), size, |b, _| {
            b.iter(|| net.predict_proba(black_box(&Evidence::from([(last.as_str(), "1")]))))
        });
    }

    for n_vars in [31, 127].iter() {
        let net = random_tree(*n_vars, n_states, 42).expect("tree fixture");

        group.bench_with_input(BenchmarkId::new("Tree", n_vars), n_vars, |b, _| {
            b.iter(|| net.predict_proba(black_box(&Evidence::from([("x1", "0")]))))
        });
    }

    let net = sprinkler().expect("sprinkler fixture");
    group.bench_function("Sprinkler", |b| {
        b.iter(|| net.predict_proba(black_box(&Evidence::from([("wet", "T")]))))
    });

    group.finish();
}

fn bench_learning(c: &mut Criterion) {
    let mut group = c.benchmark_group("Learning");

    let truth = random_chain(20, 3, 7).expect("chain fixture");
    let rows = truth
        .sample(&mut StdRng::seed_from_u64(7), 10_000)
        .expect("samples");

    group.bench_function("Fit", |b| {
        b.iter_batched(
            || truth.clone(),
            |mut net| net.fit(black_box(&rows), 1.0),
            criterion::BatchSize::SmallInput,
        );
    });

    let mut missing: Vec<Vec<Option<&str>>> = rows[..1_000]
        .iter()
        .map(|r| r.iter().map(|v| Some(v.as_str())).collect())
        .collect();
    for (i, row) in missing.iter_mut().enumerate() {
        row[i % 20] = None;
    }

    group.bench_function("Impute", |b| b.iter(|| truth.impute(black_box(&missing))));

    group.finish();
}

criterion_group!(benches, bench_bp, bench_learning);
criterion_main!(benches);
