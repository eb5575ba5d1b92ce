//! Evaluator pipeline: fitness computation for a population.
//!
//! # Overview
//!
//! - **Contract** (`Evaluator`, `Fitness`): `(len, n_scores)` score matrices
//! - **Fitness functions** (`FitnessFunction`, `LazyFitness`): user code with lazy setup
//! - **Evaluators** (`function`, `process`): in-process and worker-pool evaluation
//! - **Stages** (`cache`, `multiple`, `aggregator`): decorators wrapping one inner evaluator
//!
//! # Example
//!
//! ```rust,no_run
//! use evoflow::compute::evaluator::{Evaluator, FitnessAggregator, FitnessCache, FunctionEvaluator};
//! use evoflow::schema::{AggregationMode, Population};
//!
//! let scores = FunctionEvaluator::new(2, |population: &Population| {
//!     let sums = population.chromosome("chr0").unwrap().row_sums();
//!     sums.iter().flat_map(|s| [*s, -s]).collect()
//! });
//! let mut evaluator = FitnessCache::new(
//!     FitnessAggregator::new(scores, AggregationMode::Max, None).unwrap(),
//!     1,
//!     Some(3),
//! );
//! assert_eq!(evaluator.n_scores(), 1);
//! ```

mod aggregator;
mod cache;
mod function;
mod multiple;
mod process;

pub use aggregator::*;
pub use cache::*;
pub use function::*;
pub use multiple::*;
pub use process::*;

use crate::schema::{ConfigError, ParameterError, Parameters, Population};

/// Errors raised while evaluating a population.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("No result within {waited_ms} ms")]
    Timeout { waited_ms: u64 },
    #[error("Population of {len} cannot be split into calls of {per_call} individuals")]
    Indivisible { len: usize, per_call: usize },
    #[error("Fitness function returned {actual} scores, expected {expected}")]
    ScoreShape { expected: usize, actual: usize },
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
    #[error("No worker is available")]
    WorkersUnavailable,
    #[error("Failed to spawn worker: {0}")]
    Spawn(String),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Score matrix of shape `(len, n_scores)`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Fitness {
    n_scores: usize,
    values: Vec<f64>,
}

impl Fitness {
    /// Wrap row-major `values`. Fails unless they form whole rows.
    pub fn new(n_scores: usize, values: Vec<f64>) -> Result<Self, EvaluationError> {
        if n_scores == 0 || values.len() % n_scores != 0 {
            let width = n_scores.max(1);
            return Err(EvaluationError::ScoreShape {
                expected: values.len().div_ceil(width) * width,
                actual: values.len(),
            });
        }
        Ok(Self { n_scores, values })
    }

    /// One score per individual.
    pub fn single(values: Vec<f64>) -> Self {
        Self {
            n_scores: 1,
            values,
        }
    }

    pub fn zeros(len: usize, n_scores: usize) -> Self {
        Self {
            n_scores: n_scores.max(1),
            values: vec![0.0; len * n_scores.max(1)],
        }
    }

    /// Number of individuals.
    pub fn len(&self) -> usize {
        self.values.len() / self.n_scores
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_scores..(i + 1) * self.n_scores]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.values[i * self.n_scores..(i + 1) * self.n_scores]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.n_scores)
    }

    /// Scores of column `j` for every individual.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows().map(|row| row[j]).collect()
    }

    /// Largest score of any individual, ignoring NaN.
    pub fn max(&self) -> Option<f64> {
        self.values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .max_by(|a, b| a.total_cmp(b))
    }
}

/// A fitness computation stage.
///
/// Stages wrapping another evaluator expose it through [`inner`](Self::inner)
/// so loggers can walk the chain.
pub trait Evaluator: Send {
    fn name(&self) -> &str;

    /// Scores per individual. Fixed for the lifetime of the evaluator.
    fn n_scores(&self) -> usize;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Fitness of every individual of `population`, in order.
    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError>;

    fn inner(&self) -> Option<&dyn Evaluator> {
        None
    }

    /// Scores before this stage reduced them, when it keeps them.
    fn last_scores(&self) -> Option<&Fitness> {
        None
    }
}

impl Evaluator for Box<dyn Evaluator> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn n_scores(&self) -> usize {
        self.as_ref().n_scores()
    }

    fn parameters(&self) -> &Parameters {
        self.as_ref().parameters()
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        self.as_mut().parameters_mut()
    }

    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError> {
        self.as_mut().evaluate(population)
    }

    fn inner(&self) -> Option<&dyn Evaluator> {
        self.as_ref().inner()
    }

    fn last_scores(&self) -> Option<&Fitness> {
        self.as_ref().last_scores()
    }
}

/// User fitness code.
///
/// `evaluate` returns `len * n_scores` values in row-major order. Closures
/// `FnMut(&Population) -> Vec<f64>` implement this trait with a no-op setup.
pub trait FitnessFunction {
    /// One-time initialisation, run before the first evaluation.
    fn setup(&mut self) {}

    fn evaluate(&mut self, population: &Population) -> Vec<f64>;

    /// Run [`setup`](Self::setup) before every evaluation.
    fn reset_every_call(&self) -> bool {
        false
    }
}

impl<F> FitnessFunction for F
where
    F: FnMut(&Population) -> Vec<f64>,
{
    fn evaluate(&mut self, population: &Population) -> Vec<f64> {
        self(population)
    }
}

/// Runs a fitness function's setup lazily.
#[derive(Debug)]
pub struct LazyFitness<F> {
    function: F,
    ready: bool,
}

impl<F: FitnessFunction> LazyFitness<F> {
    pub fn new(function: F) -> Self {
        Self {
            function,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn call(&mut self, population: &Population) -> Vec<f64> {
        if !self.ready || self.function.reset_every_call() {
            self.function.setup();
            self.ready = true;
        }
        self.function.evaluate(population)
    }
}

/// Split `len` individuals into calls of `per_call` (0 means one call).
pub(crate) fn chunk_ranges(
    len: usize,
    per_call: usize,
) -> Result<Vec<std::ops::Range<usize>>, EvaluationError> {
    if per_call == 0 || len == 0 {
        return Ok(if len == 0 { Vec::new() } else { vec![0..len] });
    }
    if len % per_call != 0 {
        return Err(EvaluationError::Indivisible { len, per_call });
    }
    Ok((0..len / per_call)
        .map(|i| i * per_call..(i + 1) * per_call)
        .collect())
}
