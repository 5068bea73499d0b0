//! Compiler Pipeline Benchmarks
//!
//! Two groups:
//!
//! ### 1. Compilation (`benchmark_compilation`)
//! Time to go from problem text to an assembly unit (parse, differentiate, two-pass emission),
//! and the additional cost of JIT-compiling the six routines.
//!
//! ### 2. Evaluation (`benchmark_evaluation`)
//! Cost of one evaluation of every routine through the three available paths:
//! - **Tree**: recursive `Expr::eval`
//! - **Interpreter**: `StackMachine` executing the emitted instructions
//! - **JIT**: the Cranelift-compiled routine
//!
//! Run with: `cargo bench --bench pipeline`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use postfix_jit::{machine::StackMachine, Problem};

const PROBLEMS: [(&str, &str); 3] = [
    ("polynomial", "0.5 3\nx 3 ^ 2 x * -\nx 2 ^ 4 +\n1 x /\n"),
    ("trigonometric", "0.2 1.2\nx sin x cos *\nx tan 2 /\nx ctg x +\n"),
    (
        "mixed",
        "0.5 2\nx 2.5 ^ x sin * 3 +\n2 x ^ x tan -\ne x ^ x 0.5 ^ / pi *\n",
    ),
];

fn benchmark_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compilation");

    for (name, text) in PROBLEMS {
        let problem: Problem = text.parse().expect("benchmark problem parses");

        group.bench_with_input(BenchmarkId::new("Assemble", name), &problem, |b, problem| {
            b.iter(|| black_box(problem.compile().expect("problem compiles")))
        });

        let compiled = problem.compile().expect("problem compiles");
        group.bench_with_input(BenchmarkId::new("JIT", name), &compiled, |b, compiled| {
            b.iter(|| black_box(compiled.jit().expect("routines compile")))
        });
    }

    group.finish();
}

fn benchmark_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Evaluation");

    for (name, text) in PROBLEMS {
        let problem: Problem = text.parse().expect("benchmark problem parses");
        let compiled = problem.compile().expect("problem compiles");
        let jit = compiled.jit().expect("routines compile");
        let unit = compiled.unit();
        let x = 0.9;

        group.bench_function(BenchmarkId::new("Tree", name), |b| {
            b.iter(|| {
                compiled
                    .trees()
                    .map(|(_, expr)| expr.eval(black_box(x)))
                    .sum::<f64>()
            })
        });

        let mut machine = StackMachine::new();
        group.bench_function(BenchmarkId::new("Interpreter", name), |b| {
            b.iter(|| {
                unit.routines
                    .iter()
                    .map(|routine| {
                        machine
                            .execute(&routine.body, &unit.constants, black_box(x))
                            .unwrap_or(f64::NAN)
                    })
                    .sum::<f64>()
            })
        });

        let functions: Vec<_> = unit
            .routines
            .iter()
            .filter_map(|routine| jit.get(&routine.label).cloned())
            .collect();
        group.bench_function(BenchmarkId::new("JIT", name), |b| {
            b.iter(|| functions.iter().map(|f| f(black_box(x))).sum::<f64>())
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_compilation, benchmark_evaluation);
criterion_main!(benches);
