//! Generator: owns the validated layer graph and drives one traversal per
//! generation.

use std::collections::BTreeMap;

use crate::schema::{
    ConfigError, Descriptor, ParameterError, Parameters, Population, PopulationError, Value,
};

use super::{Context, FirstGenLayer, LayerGraph, NameRegistry, NodeId, NodeKind, PipelineError};

/// Builder for [`Generator`].
///
/// Use either [`layers`](Self::layers) (chained in order) or
/// [`graph`](Self::graph) with explicit entry and exit nodes, not both.
#[derive(Debug, Default)]
pub struct GeneratorBuilder {
    descriptor: Option<Descriptor>,
    layers: Option<Vec<NodeKind>>,
    graph: Option<(LayerGraph, NodeId, NodeId)>,
    registry: Option<NameRegistry>,
    seed: Option<u64>,
}

impl GeneratorBuilder {
    pub fn descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn layers(mut self, layers: Vec<NodeKind>) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Append one layer to the chained list.
    pub fn layer(mut self, layer: impl Into<NodeKind>) -> Self {
        self.layers.get_or_insert_with(Vec::new).push(layer.into());
        self
    }

    pub fn graph(mut self, graph: LayerGraph, first: NodeId, last: NodeId) -> Self {
        self.graph = Some((graph, first, last));
        self
    }

    /// Registry naming chained layers. Ignored with [`graph`](Self::graph).
    pub fn registry(mut self, registry: NameRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Seed of the injected first-generation layer.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Generator, ConfigError> {
        let (mut graph, ends) = match (self.layers, self.graph) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingLayout),
            (None, Some((graph, first, last))) => (graph, Some((first, last))),
            (layers, None) => {
                let mut graph = LayerGraph::with_registry(self.registry.unwrap_or_default());
                let ids: Vec<NodeId> = layers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|layer| graph.add(layer))
                    .collect();
                graph.chain(&ids)?;
                let ends = ids.first().copied().zip(ids.last().copied());
                (graph, ends)
            }
        };

        let existing = graph.sources().first().and_then(|&id| match graph.node(id)?.kind() {
            NodeKind::Source(source) => Some(source.descriptor().clone()),
            _ => None,
        });

        let descriptor = match (self.descriptor, existing.clone()) {
            (Some(descriptor), _) => descriptor,
            (None, Some(descriptor)) => descriptor,
            (None, None) => {
                log::warn!("No descriptor given; defaulting to a single float gene");
                Descriptor::default()
            }
        };

        let (entry, exit) = if existing.is_some() {
            ends.ok_or_else(|| ConfigError::InvalidValue("empty layer graph".to_string()))?
        } else {
            let mut first_gen = FirstGenLayer::new(descriptor.clone());
            if let Some(seed) = self.seed {
                first_gen = first_gen.with_seed(seed);
            }
            let source = graph.add(first_gen);
            match ends {
                Some((entry, exit)) => {
                    graph.connect(exit, source)?;
                    (entry, source)
                }
                None => (source, source),
            }
        };

        graph.validate(entry, exit)?;

        Ok(Generator {
            graph,
            entry,
            exit,
            descriptor,
            population: None,
            fitness: None,
        })
    }
}

/// Produces one population per generation from a validated layer graph.
#[derive(Debug)]
pub struct Generator {
    graph: LayerGraph,
    entry: NodeId,
    exit: NodeId,
    descriptor: Descriptor,
    population: Option<Population>,
    fitness: Option<Vec<f64>>,
}

impl Generator {
    pub fn builder() -> GeneratorBuilder {
        GeneratorBuilder::default()
    }

    /// Chain `layers` for `descriptor`.
    pub fn new(descriptor: Descriptor, layers: Vec<NodeKind>) -> Result<Self, ConfigError> {
        Self::builder().descriptor(descriptor).layers(layers).build()
    }

    /// Run the pipeline and return a population of exactly `n` individuals.
    ///
    /// The previous population and its fitness, if any, are the input. A
    /// previous population larger than `n` is truncated first.
    pub fn generate(&mut self, n: usize) -> Result<Population, PipelineError> {
        let context = Context::new(n, self.descriptor.chromosome_names());

        let mut population = self.population.clone();
        let mut fitness = population.as_ref().and(self.fitness.clone());
        if let Some(previous) = population.as_mut()
            && previous.len() > n
        {
            log::warn!(
                "Truncating previous population from {} to {} individuals",
                previous.len(),
                n
            );
            previous.truncate(n);
            if let Some(fitness) = fitness.as_mut() {
                fitness.truncate(n);
            }
        }

        self.graph.reset();
        self.graph.run(self.entry, population, fitness, context)?;

        let produced = self
            .graph
            .population(self.exit)
            .cloned()
            .ok_or(PipelineError::NoPopulation)?;
        if produced.len() != n {
            return Err(PipelineError::SizeMismatch {
                expected: n,
                actual: produced.len(),
            });
        }
        if produced.record_type() != &self.descriptor.record_type() {
            return Err(PopulationError::SchemaMismatch(
                "generated population does not match the descriptor".to_string(),
            )
            .into());
        }

        self.population = Some(produced.clone());
        self.fitness = None;
        Ok(produced)
    }

    /// Fitness of the last generated population, one value per individual.
    pub fn set_fitness(&mut self, fitness: Vec<f64>) -> Result<(), PipelineError> {
        let expected = self.population.as_ref().map(Population::len).unwrap_or(0);
        if fitness.len() != expected {
            return Err(PipelineError::FitnessLength {
                expected,
                actual: fitness.len(),
            });
        }
        self.fitness = Some(fitness);
        Ok(())
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn fitness(&self) -> Option<&[f64]> {
        self.fitness.as_deref()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn graph(&self) -> &LayerGraph {
        &self.graph
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn exit(&self) -> NodeId {
        self.exit
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.graph
            .ids()
            .filter_map(|id| self.graph.name(id))
            .collect()
    }

    fn node_kind(&self, layer: &str) -> Result<&NodeKind, PipelineError> {
        self.graph
            .find(layer)
            .and_then(|id| self.graph.node(id))
            .map(|node| node.kind())
            .ok_or_else(|| PipelineError::UnknownLayer(layer.to_string()))
    }

    fn node_kind_mut(&mut self, layer: &str) -> Result<&mut NodeKind, PipelineError> {
        let id = self
            .graph
            .find(layer)
            .ok_or_else(|| PipelineError::UnknownLayer(layer.to_string()))?;
        self.graph
            .node_mut(id)
            .map(|node| node.kind_mut())
            .ok_or_else(|| PipelineError::UnknownLayer(layer.to_string()))
    }

    /// Write one dynamic parameter. Writes to static or locked parameters
    /// are dropped.
    pub fn set_parameter(
        &mut self,
        layer: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), PipelineError> {
        self.node_kind_mut(layer)?.parameters_mut().set(key, value);
        Ok(())
    }

    pub fn set_parameters(
        &mut self,
        layer: &str,
        values: &BTreeMap<String, Value>,
    ) -> Result<(), PipelineError> {
        self.node_kind_mut(layer)?.parameters_mut().update(values);
        Ok(())
    }

    pub fn get_parameter(&self, layer: &str, key: &str) -> Result<Value, PipelineError> {
        self.node_kind(layer)?
            .parameters()
            .get(key)
            .cloned()
            .ok_or_else(|| ParameterError::Missing(key.to_string()).into())
    }

    pub fn get_parameters(&self, layer: &str) -> Result<&Parameters, PipelineError> {
        Ok(self.node_kind(layer)?.parameters())
    }

    pub fn lock_parameter(&mut self, layer: &str, key: &str) -> Result<(), PipelineError> {
        self.node_kind_mut(layer)?.parameters_mut().lock(key);
        Ok(())
    }

    pub fn unlock_parameter(&mut self, layer: &str, key: &str) -> Result<(), PipelineError> {
        self.node_kind_mut(layer)?.parameters_mut().unlock(key);
        Ok(())
    }

    /// Static parameters of every layer keyed `"{layer}/{parameter}"`.
    pub fn get_all_static_parameters(&self) -> BTreeMap<String, Value> {
        self.collect_parameters(Parameters::statics)
    }

    /// Dynamic parameters of every layer keyed `"{layer}/{parameter}"`.
    pub fn get_all_dynamic_parameters(&self) -> BTreeMap<String, Value> {
        self.collect_parameters(Parameters::dynamic)
    }

    fn collect_parameters(
        &self,
        select: impl Fn(&Parameters) -> BTreeMap<String, Value>,
    ) -> BTreeMap<String, Value> {
        let mut all = BTreeMap::new();
        for id in self.graph.ids() {
            if let Some(node) = self.graph.node(id) {
                for (key, value) in select(node.kind().parameters()) {
                    all.insert(format!("{}/{}", node.name(), key), value);
                }
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::generator::{
        Block, CombineLayer, Concatenate, FilterFirsts, NumericMutationLayer, Sort,
    };
    use crate::schema::{ChromosomeSpec, Crossover, GeneType, Genes, MutationFunction, Selection};
    use proptest::prelude::*;

    fn round_trip_generator() -> Generator {
        let descriptor = Descriptor::single(5, GeneType::Float).unwrap();
        Generator::builder()
            .descriptor(descriptor)
            .registry(NameRegistry::new())
            .layer(CombineLayer::new(Selection::Tournament, Crossover::OnePoint, 2).with_seed(1))
            .layer(
                NumericMutationLayer::new(MutationFunction::Sum, 1.0, 0.5, (0.0, 1.0))
                    .with_seed(2),
            )
            .seed(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let mut generator = round_trip_generator();

        let first = generator.generate(5).unwrap();
        assert_eq!(first.len(), 5);
        let chr0 = first.chromosome("chr0").unwrap();
        assert_eq!((chr0.rows(), chr0.width()), (5, 5));

        generator.set_fitness(chr0.row_sums()).unwrap();
        let second = generator.generate(5).unwrap();
        assert_eq!(second.len(), 5);
        assert_eq!(second.chromosome("chr0").unwrap().width(), 5);
        assert_ne!(first, second);
    }

    #[test]
    fn test_layer_names() {
        let generator = round_trip_generator();
        assert_eq!(
            generator.layer_names(),
            vec!["CombineLayer0", "NumericMutationLayer1", "FirstGenLayer2"]
        );
        assert_eq!(generator.graph().name(generator.exit()), Some("FirstGenLayer2"));
    }

    #[test]
    fn test_default_descriptor() {
        let mut generator = Generator::builder().build().unwrap();
        let population = generator.generate(4).unwrap();
        assert_eq!(population.len(), 4);
        assert_eq!(generator.descriptor(), &Descriptor::default());
    }

    #[test]
    fn test_conflicting_layout() {
        let mut graph = LayerGraph::new();
        let sort = graph.add(Sort::new());
        let result = Generator::builder()
            .layers(vec![Sort::new().into()])
            .graph(graph, sort, sort)
            .build();
        assert_eq!(result.err(), Some(ConfigError::ConflictingLayout));
    }

    #[test]
    fn test_size_mismatch() {
        let descriptor = Descriptor::single(1, GeneType::Float).unwrap();
        let mut generator =
            Generator::new(descriptor, vec![FilterFirsts::new(3).into()]).unwrap();

        // The first generation comes straight from the source.
        generator.generate(5).unwrap();
        assert_eq!(
            generator.generate(5),
            Err(PipelineError::SizeMismatch {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_truncates_larger_population() {
        let mut generator = Generator::builder().build().unwrap();
        generator.generate(6).unwrap();
        generator.set_fitness(vec![0.0; 6]).unwrap();
        assert_eq!(generator.generate(4).unwrap().len(), 4);
    }

    #[test]
    fn test_set_fitness_length() {
        let mut generator = Generator::builder().build().unwrap();
        generator.generate(3).unwrap();
        assert_eq!(
            generator.set_fitness(vec![1.0]),
            Err(PipelineError::FitnessLength {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_elitism_graph() {
        let registry = NameRegistry::new();
        let mut graph = LayerGraph::with_registry(registry);
        let sort = graph.add(Sort::new());
        let best = graph.add(FilterFirsts::new(2));
        let rest = graph.add(FilterFirsts::new(2));
        let mutate = graph.add(
            NumericMutationLayer::new(MutationFunction::Sum, 1.0, 0.0, (1.0, 1.0)).with_seed(4),
        );
        let concat = graph.add(Concatenate::new());
        graph.connect(sort, best).unwrap();
        graph.connect(sort, rest).unwrap();
        graph.chain(&[rest, mutate, concat]).unwrap();
        graph.connect(best, concat).unwrap();

        let descriptor = Descriptor::single(1, GeneType::Float).unwrap();
        let mut generator = Generator::builder()
            .descriptor(descriptor)
            .graph(graph, sort, concat)
            .build()
            .unwrap();

        let first = generator.generate(4).unwrap();
        let genes = first.chromosome("chr0").unwrap().row_sums();
        generator.set_fitness(genes.clone()).unwrap();

        let second = generator.generate(4).unwrap();
        let mut sorted = genes.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(
            second.chromosome("chr0").unwrap().row_sums(),
            vec![sorted[0], sorted[1], sorted[0] + 1.0, sorted[1] + 1.0]
        );
    }

    #[test]
    fn test_parameter_api() {
        let descriptor = Descriptor::single(2, GeneType::Float).unwrap();
        let mut generator = Generator::builder()
            .descriptor(descriptor)
            .registry(NameRegistry::new())
            .layer(NumericMutationLayer::new(MutationFunction::Sum, 1.0, 0.5, (0.0, 1.0)))
            .layer(Block::new(None, false))
            .build()
            .unwrap();

        generator
            .set_parameter("NumericMutationLayer0", "gene_rate", 0.25)
            .unwrap();
        assert_eq!(
            generator.get_parameter("NumericMutationLayer0", "gene_rate"),
            Ok(Value::Float(0.25))
        );

        // Static parameters are silently kept.
        generator
            .set_parameter("NumericMutationLayer0", "mutation_function_name", "mul_mutation")
            .unwrap();
        assert_eq!(
            generator.get_parameter("NumericMutationLayer0", "mutation_function_name"),
            Ok(Value::from("sum_mutation"))
        );

        generator.lock_parameter("Block1", "run").unwrap();
        generator.set_parameter("Block1", "run", true).unwrap();
        assert_eq!(generator.get_parameter("Block1", "run"), Ok(Value::Bool(false)));

        assert_eq!(
            generator.set_parameter("Missing", "x", 1.0),
            Err(PipelineError::UnknownLayer("Missing".to_string()))
        );

        let statics = generator.get_all_static_parameters();
        assert!(statics.contains_key("NumericMutationLayer0/mutation_function_name"));
        assert!(statics.contains_key("FirstGenLayer2/initialize_zeros"));
        let dynamics = generator.get_all_dynamic_parameters();
        assert_eq!(
            dynamics.get("NumericMutationLayer0/gene_rate"),
            Some(&Value::Float(0.25))
        );
    }

    #[test]
    fn test_block_layer_freezes_chromosome() {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::float("frozen", 2),
            ChromosomeSpec::float("free", 2),
        ])
        .unwrap();
        let mut generator = Generator::builder()
            .descriptor(descriptor)
            .layer(Block::new(Some(vec!["frozen".to_string()]), true))
            .layer(NumericMutationLayer::new(MutationFunction::Sum, 1.0, 0.0, (1.0, 1.0)))
            .build()
            .unwrap();

        let first = generator.generate(3).unwrap();
        let second = generator.generate(3).unwrap();
        assert_eq!(first.chromosome("frozen"), second.chromosome("frozen"));
        assert_ne!(first.chromosome("free"), second.chromosome("free"));
    }

    #[test]
    fn test_user_supplied_source() {
        let descriptor = Descriptor::single(3, GeneType::Integer).unwrap();
        let mut graph = LayerGraph::new();
        let source = graph.add(FirstGenLayer::new(descriptor.clone()).zeroed());
        let sort = graph.add(Sort::new());
        graph.connect(source, sort).unwrap();

        let mut generator = Generator::builder().graph(graph, source, sort).build().unwrap();
        assert_eq!(generator.descriptor(), &descriptor);
        assert_eq!(generator.layer_names().len(), 2);

        let population = generator.generate(2).unwrap();
        assert_eq!(
            population.chromosome("chr0").unwrap().genes(),
            &Genes::Integer(vec![0; 6])
        );
    }

    fn gene_type() -> impl Strategy<Value = GeneType> {
        prop_oneof![
            Just(GeneType::Float),
            Just(GeneType::Integer),
            Just(GeneType::Boolean)
        ]
    }

    proptest! {
        #[test]
        fn property_generate_matches_descriptor(
            sizes in proptest::collection::vec(1usize..6, 1..4),
            gene_type in gene_type(),
            n in 1usize..20,
            generations in 1usize..4,
        ) {
            let descriptor = Descriptor::new(
                sizes.into_iter().map(|s| vec![s]).collect(),
                vec![],
                vec![gene_type],
                vec![],
            ).unwrap();
            let mut generator = Generator::builder()
                .descriptor(descriptor.clone())
                .layer(Sort::new())
                .layer(CombineLayer::new(Selection::Tournament, Crossover::OnePoint, 2))
                .build()
                .unwrap();

            for _ in 0..generations {
                let population = generator.generate(n).unwrap();
                prop_assert_eq!(population.len(), n);
                prop_assert_eq!(population.record_type(), &descriptor.record_type());
                generator.set_fitness(vec![0.0; n]).unwrap();
            }
        }
    }
}
