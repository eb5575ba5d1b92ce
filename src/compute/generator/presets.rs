//! Ready-made generator pipelines.

use crate::schema::{ConfigError, Descriptor, GeneType, PipelineConfig};

use super::{
    BinaryMutationLayer, CombineLayer, Concatenate, FilterFirsts, Generator, LayerGraph,
    NameRegistry, NodeId, NodeKind, NumericMutationLayer, Sort,
};

/// Elitist pipeline for `population_size` individuals.
///
/// ```text
/// Sort ─┬─ FilterFirsts(elitism) ────────────────────────────────────┬─ Concatenate
///       └─ Combine ─ Mutation per chromosome ─ FilterFirsts(rest) ──┘
/// ```
///
/// The elite branch is connected first so the best individuals lead the
/// merged population. Float and integer chromosomes get a numeric mutation,
/// boolean chromosomes a bit-flip mutation.
pub fn elitist_pipeline(
    descriptor: Descriptor,
    population_size: usize,
    config: &PipelineConfig,
) -> Result<Generator, ConfigError> {
    config.validate(population_size)?;

    let seed = |offset: u64| config.random_seed.map(|s| s.wrapping_add(offset));
    let mut graph = LayerGraph::with_registry(NameRegistry::new());

    let sort = graph.add(Sort::new());
    let elite = graph.add(FilterFirsts::new(config.elitism));

    let mut combine = CombineLayer::new(config.selection, config.crossover, config.n_combine);
    if let Some(seed) = seed(1) {
        combine = combine.with_seed(seed);
    }
    let mut offspring = vec![graph.add(combine)];

    let mutation = &config.mutation;
    for (i, spec) in descriptor.chromosomes().iter().enumerate() {
        let names = vec![spec.name.clone()];
        let offset = 2 + i as u64;
        let layer: NodeKind = match spec.gene_type {
            GeneType::Float | GeneType::Integer => {
                let mut layer = NumericMutationLayer::new(
                    mutation.function,
                    mutation.existence_rate,
                    mutation.gene_rate,
                    mutation.range,
                )
                .with_chromosomes(names);
                if let Some(seed) = seed(offset) {
                    layer = layer.with_seed(seed);
                }
                layer.into()
            }
            GeneType::Boolean => {
                let mut layer = BinaryMutationLayer::new(mutation.existence_rate, mutation.gene_rate)
                    .with_chromosomes(names);
                if let Some(seed) = seed(offset) {
                    layer = layer.with_seed(seed);
                }
                layer.into()
            }
        };
        offspring.push(graph.add(layer));
    }
    offspring.push(graph.add(FilterFirsts::new(population_size - config.elitism)));

    let concat = graph.add(Concatenate::new());
    graph.connect(sort, elite)?;
    graph.connect(elite, concat)?;
    let mut path: Vec<NodeId> = vec![sort];
    path.extend(offspring);
    path.push(concat);
    graph.chain(&path)?;

    let mut builder = Generator::builder()
        .descriptor(descriptor)
        .graph(graph, sort, concat);
    if let Some(seed) = seed(0) {
        builder = builder.seed(seed);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChromosomeSpec, MutationConfig};

    fn config() -> PipelineConfig {
        PipelineConfig {
            elitism: 2,
            random_seed: Some(7),
            mutation: MutationConfig {
                range: (-1.0, 1.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_layout() {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::float("x", 2),
            ChromosomeSpec::boolean("mask", 3),
        ])
        .unwrap();
        let generator = elitist_pipeline(descriptor, 10, &config()).unwrap();
        assert_eq!(
            generator.layer_names(),
            vec![
                "Sort0",
                "FilterFirsts1",
                "CombineLayer2",
                "NumericMutationLayer3",
                "BinaryMutationLayer4",
                "FilterFirsts5",
                "Concatenate6",
                "FirstGenLayer7",
            ]
        );
        assert_eq!(
            generator.get_parameter("FilterFirsts5", "n_to_pass"),
            Ok(8usize.into())
        );
    }

    #[test]
    fn test_elites_lead_next_generation() {
        let descriptor = Descriptor::single(3, GeneType::Float).unwrap();
        let mut generator = elitist_pipeline(descriptor, 10, &config()).unwrap();

        let first = generator.generate(10).unwrap();
        let fitness = first.chromosome("chr0").unwrap().row_sums();
        generator.set_fitness(fitness.clone()).unwrap();

        let second = generator.generate(10).unwrap();
        let mut best = fitness;
        best.sort_by(|a, b| b.total_cmp(a));
        let leading = second.slice(0..2).chromosome("chr0").unwrap().row_sums();
        assert_eq!(leading, best[..2].to_vec());
    }

    #[test]
    fn test_mixed_types_generate() {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::integer("n", 4).with_range(0.0, 10.0),
            ChromosomeSpec::boolean("b", 4),
        ])
        .unwrap();
        let mut generator = elitist_pipeline(descriptor, 6, &config()).unwrap();
        for _ in 0..3 {
            let population = generator.generate(6).unwrap();
            generator
                .set_fitness(population.chromosome("n").unwrap().row_sums())
                .unwrap();
        }
    }

    #[test]
    fn test_invalid_config() {
        let descriptor = Descriptor::default();
        let config = PipelineConfig {
            elitism: 5,
            ..Default::default()
        };
        assert!(matches!(
            elitist_pipeline(descriptor, 5, &config),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
