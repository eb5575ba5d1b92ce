//! Benchmarks for generator pipelines and evaluators.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use evoflow::{
    compute::{
        evaluator::{Evaluator, FitnessCache, FunctionEvaluator},
        generator::{Generator, presets::elitist_pipeline},
    },
    schema::{ChromosomeSpec, Descriptor, PipelineConfig, Population},
};

fn descriptor(genes: usize) -> Descriptor {
    Descriptor::from_specs(vec![
        ChromosomeSpec::float("chr0", genes).with_range(-5.0, 5.0),
        ChromosomeSpec::boolean("mask", genes),
    ])
    .unwrap()
}

fn sphere(population: &Population) -> Vec<f64> {
    let genes = population.chromosome("chr0").unwrap();
    (0..population.len())
        .map(|i| -genes.float_row(i).unwrap().iter().map(|x| x * x).sum::<f64>())
        .collect()
}

fn primed(size: usize, genes: usize) -> Generator {
    let config = PipelineConfig {
        random_seed: Some(7),
        ..Default::default()
    };
    let mut generator = elitist_pipeline(descriptor(genes), size, &config).unwrap();
    let population = generator.generate(size).unwrap();
    generator.set_fitness(sphere(&population)).unwrap();
    generator
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");

    for size in [100, 1000, 10000] {
        let mut generator = primed(size, 16);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let population = generator.generate(black_box(size)).unwrap();
                let fitness = sphere(&population);
                generator.set_fitness(fitness).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let mut generator = primed(1000, 64);
    let population = generator.generate(1000).unwrap();

    for per_call in [0, 10, 100] {
        let mut evaluator = FunctionEvaluator::new(1, sphere).with_individual_per_call(per_call);
        group.bench_with_input(
            BenchmarkId::new("function", per_call),
            &per_call,
            |b, _| {
                b.iter(|| evaluator.evaluate(black_box(&population)).unwrap());
            },
        );
    }

    let mut cached = FitnessCache::new(FunctionEvaluator::new(1, sphere), 5, None);
    group.bench_function("cache_hit", |b| {
        b.iter(|| cached.evaluate(black_box(&population)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_generate, bench_evaluate);
criterion_main!(benches);
