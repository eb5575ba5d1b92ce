//! In-process evaluation of a pure fitness closure.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::schema::{Parameters, Population};

use super::{EvaluationError, Evaluator, Fitness, chunk_ranges};

/// Calls `function` on slices of `individual_per_call` individuals.
///
/// With the `parallel` feature the slices are evaluated on the rayon pool,
/// so the closure must be `Sync`. Stateful fitness functions belong in a
/// [`ProcessEvaluator`](super::ProcessEvaluator).
pub struct FunctionEvaluator<F> {
    name: String,
    function: F,
    n_scores: usize,
    parameters: Parameters,
}

impl<F> FunctionEvaluator<F>
where
    F: Fn(&Population) -> Vec<f64> + Send + Sync,
{
    pub fn new(n_scores: usize, function: F) -> Self {
        Self {
            name: "FunctionEvaluator".to_string(),
            function,
            n_scores: n_scores.max(1),
            parameters: Parameters::new()
                .with_static("n_scores", n_scores.max(1))
                .with_static("individual_per_call", 0usize),
        }
    }

    /// Individuals per call; 0 passes the whole population at once.
    pub fn with_individual_per_call(mut self, individual_per_call: usize) -> Self {
        self.parameters
            .force("individual_per_call", individual_per_call);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn call(&self, population: &Population) -> Result<Vec<f64>, EvaluationError> {
        let scores = (self.function)(population);
        let expected = population.len() * self.n_scores;
        if scores.len() != expected {
            return Err(EvaluationError::ScoreShape {
                expected,
                actual: scores.len(),
            });
        }
        Ok(scores)
    }
}

impl<F> Evaluator for FunctionEvaluator<F>
where
    F: Fn(&Population) -> Vec<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn n_scores(&self) -> usize {
        self.n_scores
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError> {
        let per_call = self.parameters.get_usize("individual_per_call")?;
        let ranges = chunk_ranges(population.len(), per_call)?;

        #[cfg(feature = "parallel")]
        let chunks = ranges
            .par_iter()
            .map(|range| self.call(&population.slice(range.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(not(feature = "parallel"))]
        let chunks = ranges
            .iter()
            .map(|range| self.call(&population.slice(range.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        Fitness::new(self.n_scores, chunks.concat())
    }
}
