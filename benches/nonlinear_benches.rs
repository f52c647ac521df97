use RustedNonlinear::Examples::nonlinear_examples::NonlinearExample;
use RustedNonlinear::numerical::Nonlinear_systems::NL_solver::NonlinearSolver;
use RustedNonlinear::numerical::Nonlinear_systems::config::Strategy;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use strum::IntoEnumIterator;

fn bench_catalogue(c: &mut Criterion) {
    let mut group = c.benchmark_group("nonlinear examples");
    for example in NonlinearExample::iter() {
        group.bench_function(example.to_string(), |b| {
            b.iter(|| black_box(example.solve(None)))
        });
    }
    group.finish();
}

fn bench_robertson_anderson(c: &mut Criterion) {
    let example = NonlinearExample::Robertson;
    c.bench_function("Robertson, Anderson depth 3", |b| {
        b.iter(|| {
            let mut solver = NonlinearSolver::new(Strategy::FixedPointIteration);
            let _ = solver.set_loglevel(None);
            solver.set_anderson(3, 0);
            let mut problem = example.problem();
            black_box(solver.solve(&mut problem, example.initial_guess()))
        })
    });
}

criterion_group!(benches, bench_catalogue, bench_robertson_anderson);
criterion_main!(benches);
