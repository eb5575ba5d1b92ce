//! Run history kept in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::compute::evaluator::{Evaluator, Fitness};
use crate::compute::generator::PipelineError;
use crate::schema::{Parameters, Population, Value};

use super::{Callback, CallbackContext, base_parameters};

/// Static configuration captured when the run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigLog {
    /// Keyed `"{layer}/{parameter}"`.
    pub generator: BTreeMap<String, Value>,
    /// Keyed `"{evaluator}/{parameter}"` over the whole evaluator chain.
    pub evaluator: BTreeMap<String, Value>,
}

/// One entry per evaluated generation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationLog {
    pub generation: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitness: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<BTreeMap<String, Value>>,
    /// Unreduced scores, for evaluators that aggregate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f64>>,
    #[serde(skip)]
    pub population: Option<Population>,
}

/// Everything a [`MemoryLogger`] recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryLog {
    pub config: Option<ConfigLog>,
    pub generations: Vec<GenerationLog>,
}

impl MemoryLog {
    /// Populations are not exported.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Shared view of a logger's records, readable after the logger has been
/// handed to an [`Evolver`](crate::compute::Evolver).
#[derive(Debug, Clone, Default)]
pub struct LogHandle(Arc<Mutex<MemoryLog>>);

impl LogHandle {
    pub fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config_log(&self) -> Option<ConfigLog> {
        self.lock().config.clone()
    }

    pub fn generations(&self) -> Vec<GenerationLog> {
        self.lock().generations.clone()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.lock().to_json()
    }
}

/// Records fitness and parameters of every generation.
///
/// Which parts are kept is controlled by the dynamic `log_fitness`,
/// `log_population`, `log_generator`, `log_evaluator` and `log_scores`
/// flags.
#[derive(Debug, Clone)]
pub struct MemoryLogger {
    parameters: Parameters,
    log: LogHandle,
    current: GenerationLog,
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self {
            parameters: base_parameters()
                .with_dynamic("log_fitness", true)
                .with_dynamic("log_population", false)
                .with_dynamic("log_generator", true)
                .with_dynamic("log_evaluator", true)
                .with_dynamic("log_scores", false),
            log: LogHandle::default(),
            current: GenerationLog::default(),
        }
    }

    pub fn with_population(mut self) -> Self {
        self.parameters.set("log_population", true);
        self
    }

    pub fn with_scores(mut self) -> Self {
        self.parameters.set("log_scores", true);
        self
    }

    pub fn handle(&self) -> LogHandle {
        self.log.clone()
    }

    fn flag(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(self.parameters.get_bool(key)?)
    }
}

/// Parameters of `evaluator` and everything it wraps, keyed
/// `"{name}/{parameter}"`. A stage whose name already appeared further out
/// in the chain is keyed `"{name}[{depth}]/{parameter}"`, depth 0 being the
/// outermost stage.
pub fn evaluator_parameters(
    evaluator: &dyn Evaluator,
    select: impl Fn(&Parameters) -> BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut all = BTreeMap::new();
    let mut seen = BTreeSet::new();
    let mut current = Some(evaluator);
    let mut depth = 0;
    while let Some(evaluator) = current {
        let label = if seen.insert(evaluator.name()) {
            evaluator.name().to_string()
        } else {
            format!("{}[{}]", evaluator.name(), depth)
        };
        for (key, value) in select(evaluator.parameters()) {
            all.insert(format!("{}/{}", label, key), value);
        }
        current = evaluator.inner();
        depth += 1;
    }
    all
}

/// Unreduced scores of the outermost stage in the chain that keeps them.
fn last_scores(evaluator: &dyn Evaluator) -> Option<&Fitness> {
    let mut current = Some(evaluator);
    while let Some(evaluator) = current {
        if let Some(scores) = evaluator.last_scores() {
            return Some(scores);
        }
        current = evaluator.inner();
    }
    None
}

impl Callback for MemoryLogger {
    fn name(&self) -> &str {
        "MemoryLogger"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn on_start(&mut self, context: &mut CallbackContext<'_>) -> Result<(), PipelineError> {
        let config = ConfigLog {
            generator: context.generator.get_all_static_parameters(),
            evaluator: evaluator_parameters(context.evaluator, Parameters::statics),
        };
        self.log.lock().config = Some(config);
        Ok(())
    }

    fn on_generator_end(
        &mut self,
        context: &mut CallbackContext<'_>,
        population: &Population,
    ) -> Result<(), PipelineError> {
        self.current = GenerationLog {
            generation: context.generation,
            ..Default::default()
        };
        if self.flag("log_population")? {
            self.current.population = Some(population.clone());
        }
        Ok(())
    }

    fn on_evaluator_end(
        &mut self,
        context: &mut CallbackContext<'_>,
        fitness: &Fitness,
    ) -> Result<(), PipelineError> {
        let mut entry = std::mem::take(&mut self.current);
        entry.generation = context.generation;
        if self.flag("log_fitness")? {
            entry.fitness = Some(fitness.values().to_vec());
        }
        if self.flag("log_generator")? {
            entry.generator = Some(context.generator.get_all_dynamic_parameters());
        }
        if self.flag("log_evaluator")? {
            entry.evaluator = Some(evaluator_parameters(context.evaluator, Parameters::dynamic));
        }
        if self.flag("log_scores")? {
            entry.scores = last_scores(context.evaluator).map(|scores| scores.values().to_vec());
        }
        self.log.lock().generations.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evaluator::{FitnessAggregator, FitnessCache, FunctionEvaluator};
    use crate::compute::generator::{Generator, NameRegistry, NumericMutationLayer};
    use crate::schema::{AggregationMode, Descriptor, GeneType, MutationFunction};

    fn generator() -> Generator {
        Generator::builder()
            .descriptor(Descriptor::single(2, GeneType::Float).unwrap())
            .registry(NameRegistry::new())
            .layer(NumericMutationLayer::new(
                MutationFunction::Sum,
                1.0,
                0.5,
                (-1.0, 1.0),
            ))
            .build()
            .unwrap()
    }

    fn evaluator() -> impl Evaluator {
        let inner = FunctionEvaluator::new(2, |population: &Population| {
            population
                .chromosome("chr0")
                .map(|c| c.row_sums().into_iter().flat_map(|x| [x, -x]).collect())
                .unwrap_or_default()
        });
        FitnessAggregator::new(inner, AggregationMode::Max, None).unwrap()
    }

    #[test]
    fn test_records_every_generation() {
        let mut generator = generator();
        let mut evaluator = evaluator();
        let mut logger = MemoryLogger::new().with_scores();
        let handle = logger.handle();

        let mut context = CallbackContext {
            generator: &mut generator,
            evaluator: &evaluator,
            generation: 0,
        };
        logger.on_start(&mut context).unwrap();

        for generation in 0..3 {
            let population = generator.generate(4).unwrap();
            let fitness = evaluator.evaluate(&population).unwrap();
            let mut context = CallbackContext {
                generator: &mut generator,
                evaluator: &evaluator,
                generation,
            };
            logger.on_generator_end(&mut context, &population).unwrap();
            logger.on_evaluator_end(&mut context, &fitness).unwrap();
            generator.set_fitness(fitness.into_values()).unwrap();
        }

        let config = handle.config_log().unwrap();
        assert!(config.generator.contains_key("NumericMutationLayer0/mutation_function_name"));
        assert!(config.generator.contains_key("FirstGenLayer1/initialize_zeros"));
        assert_eq!(
            config.evaluator.get("FitnessAggregator/mode"),
            Some(&Value::from("MAX"))
        );

        let generations = handle.generations();
        assert_eq!(generations.len(), 3);
        for (i, entry) in generations.iter().enumerate() {
            assert_eq!(entry.generation, i);
            assert_eq!(entry.fitness.as_ref().map(Vec::len), Some(4));
            assert_eq!(entry.scores.as_ref().map(Vec::len), Some(8));
            assert!(entry.population.is_none());
            let generator = entry.generator.as_ref().unwrap();
            assert!(generator.contains_key("NumericMutationLayer0/gene_rate"));
            let evaluator = entry.evaluator.as_ref().unwrap();
            assert!(evaluator.contains_key("FitnessAggregator/weights"));
        }
    }

    #[test]
    fn test_flags_and_json() {
        let mut generator = generator();
        let mut evaluator = FitnessCache::new(evaluator(), 2, None);
        let mut logger = MemoryLogger::new().with_population().with_scores();
        logger.parameters_mut().set("log_generator", false);
        let handle = logger.handle();

        let population = generator.generate(2).unwrap();
        let fitness = evaluator.evaluate(&population).unwrap();
        let mut context = CallbackContext {
            generator: &mut generator,
            evaluator: &evaluator,
            generation: 7,
        };
        logger.on_start(&mut context).unwrap();
        logger.on_generator_end(&mut context, &population).unwrap();
        logger.on_evaluator_end(&mut context, &fitness).unwrap();

        let config = handle.config_log().unwrap();
        assert!(config.evaluator.contains_key("FitnessCache/n_generation_ttl"));
        assert!(config.evaluator.contains_key("FitnessAggregator/mode"));

        let entry = &handle.generations()[0];
        assert_eq!(entry.generation, 7);
        assert!(entry.generator.is_none());
        // Scores come from the aggregator behind the cache.
        assert_eq!(entry.scores.as_ref().map(Vec::len), Some(4));
        assert_eq!(entry.population.as_ref().map(Population::len), Some(2));

        let json: serde_json::Value = serde_json::from_str(&handle.to_json().unwrap()).unwrap();
        let first = &json["generations"][0];
        assert_eq!(first["generation"], 7);
        assert_eq!(first["fitness"].as_array().map(Vec::len), Some(2));
        assert!(first.get("population").is_none());
        assert!(first.get("generator").is_none());
    }

    #[test]
    fn test_repeated_stage_names_kept_apart() {
        let evaluator = FitnessCache::new(FitnessCache::new(evaluator(), 3, None), 7, Some(2));
        let statics = evaluator_parameters(&evaluator, Parameters::statics);

        assert_eq!(
            statics.get("FitnessCache/n_generation_ttl"),
            Some(&Value::from(7usize))
        );
        assert_eq!(
            statics.get("FitnessCache[1]/n_generation_ttl"),
            Some(&Value::from(3usize))
        );
        assert!(statics.contains_key("FitnessAggregator/mode"));
        assert!(!statics.keys().any(|key| key.starts_with("FitnessAggregator[")));
    }
}
