//! Configuration types for generator pipelines and the evolution loop.

use serde::{Deserialize, Serialize};

/// Selection method used by combine layers to pick parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Selection {
    /// Binary tournaments; winners are distinct while the population allows it.
    #[default]
    Tournament,
    /// Fitness-proportionate selection after shifting fitness to be non-negative.
    Roulette,
    /// The first `n` individuals. Expects a population sorted by fitness.
    Rank,
}

impl Selection {
    pub fn name(&self) -> &'static str {
        match self {
            Selection::Tournament => "tournament",
            Selection::Roulette => "roulette",
            Selection::Rank => "rank",
        }
    }

    /// Whether meaningful results require a fitness-sorted population.
    pub fn needs_sort(&self) -> bool {
        matches!(self, Selection::Rank)
    }
}

/// Crossover operator used by combine layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Crossover {
    /// Prefix from the first parent, suffix from the second.
    #[default]
    OnePoint,
    /// Alternate between parents at `points` random cut points.
    NPoint { points: usize },
    /// Gene-wise mean (rounded for integers, majority vote for booleans).
    Mean,
}

impl Crossover {
    pub fn name(&self) -> &'static str {
        match self {
            Crossover::OnePoint => "one_point",
            Crossover::NPoint { .. } => "n_point",
            Crossover::Mean => "mean",
        }
    }
}

/// Per-gene numeric mutation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MutationFunction {
    /// Add a uniform sample from the mutation range.
    #[default]
    Sum,
    /// Multiply by a uniform sample from the mutation range.
    Mul,
    /// Add normal noise centred on the range midpoint with half-range deviation.
    Gaussian,
}

impl MutationFunction {
    pub fn name(&self) -> &'static str {
        match self {
            MutationFunction::Sum => "sum_mutation",
            MutationFunction::Mul => "mul_mutation",
            MutationFunction::Gaussian => "gaussian_mutation",
        }
    }
}

/// Reduction applied over a score axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationMode {
    Max,
    Min,
    #[default]
    Mean,
    Median,
}

impl AggregationMode {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationMode::Max => "MAX",
            AggregationMode::Min => "MIN",
            AggregationMode::Mean => "MEAN",
            AggregationMode::Median => "MEDIAN",
        }
    }

    /// Reduce a non-empty slice.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            AggregationMode::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregationMode::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregationMode::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AggregationMode::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        }
    }
}

/// Mutation settings for preset pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    #[serde(default)]
    pub function: MutationFunction,
    /// Probability that an individual is mutated at all.
    #[serde(default = "default_existence_rate")]
    pub existence_rate: f64,
    /// Probability of mutating one more gene after the first.
    #[serde(default = "default_gene_rate")]
    pub gene_rate: f64,
    /// Range the mutation samples from.
    #[serde(default = "default_mutation_range")]
    pub range: (f64, f64),
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            function: MutationFunction::default(),
            existence_rate: default_existence_rate(),
            gene_rate: default_gene_rate(),
            range: default_mutation_range(),
        }
    }
}

fn default_existence_rate() -> f64 {
    1.0
}
fn default_gene_rate() -> f64 {
    0.5
}
fn default_mutation_range() -> (f64, f64) {
    (-0.1, 0.1)
}

/// Elitist generator pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of best individuals copied unchanged into the next generation.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Parents combined per child.
    #[serde(default = "default_n_combine")]
    pub n_combine: usize,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub crossover: Crossover,
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            elitism: default_elitism(),
            n_combine: default_n_combine(),
            selection: Selection::default(),
            crossover: Crossover::default(),
            mutation: MutationConfig::default(),
            random_seed: None,
        }
    }
}

fn default_elitism() -> usize {
    1
}
fn default_n_combine() -> usize {
    2
}

impl PipelineConfig {
    /// Validate against the population size the pipeline will be driven with.
    pub fn validate(&self, population_size: usize) -> Result<(), ConfigError> {
        if population_size == 0 {
            return Err(ConfigError::InvalidValue(
                "population size must be positive".to_string(),
            ));
        }
        if self.elitism >= population_size {
            return Err(ConfigError::InvalidValue(format!(
                "elitism ({}) must be smaller than the population size ({})",
                self.elitism, population_size
            )));
        }
        if self.n_combine == 0 {
            return Err(ConfigError::InvalidValue(
                "n_combine must be positive".to_string(),
            ));
        }
        if let Crossover::NPoint { points: 0 } = self.crossover {
            return Err(ConfigError::InvalidValue(
                "n-point crossover needs at least one point".to_string(),
            ));
        }
        check_rate(self.mutation.existence_rate, "existence_rate")?;
        check_rate(self.mutation.gene_rate, "gene_rate")?;
        if self.mutation.range.0 > self.mutation.range.1 {
            return Err(ConfigError::InvalidRange {
                name: "mutation".to_string(),
                min: self.mutation.range.0,
                max: self.mutation.range.1,
            });
        }
        Ok(())
    }
}

fn check_rate(rate: f64, name: &str) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(format!(
            "{} must be within [0, 1], got {}",
            name, rate
        )))
    }
}

/// Evolution loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolverConfig {
    /// Individuals per generation.
    pub population_size: usize,
    /// Log a summary line per generation at info level.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            verbose: false,
        }
    }
}

impl EvolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::InvalidValue(
                "population size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Construction-time configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Descriptor needs at least one chromosome")]
    EmptyDescriptor,
    #[error("Descriptor lists {got} {what} for {expected} chromosomes")]
    DescriptorMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("Chromosome `{0}` has an empty or zero-sized shape")]
    InvalidShape(String),
    #[error("Duplicate chromosome name `{0}`")]
    DuplicateChromosome(String),
    #[error("Invalid range for `{name}`: min ({min}) > max ({max})")]
    InvalidRange { name: String, min: f64, max: f64 },
    #[error("Dynamic parameter `{0}` has no value")]
    UnknownParameter(String),
    #[error("Layer graph contains a cycle through `{0}`")]
    Cycle(String),
    #[error("Duplicate layer name `{0}`")]
    DuplicateLayer(String),
    #[error("Layer `{0}` is not on a path from the first to the last layer")]
    Disconnected(String),
    #[error("Layer list must not be combined with a first/last layer pair")]
    ConflictingLayout,
    #[error("Unknown layer id {0}")]
    UnknownNode(usize),
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}
