//! Repeated evaluation of noisy fitness functions.

use crate::schema::{AggregationMode, ConfigError, Parameters, Population};

use super::{EvaluationError, Evaluator, Fitness};

/// Drop the first maximal and/or the first minimal sample.
///
/// The maximum is removed first; the minimum is then taken among the
/// remaining samples. A NaN sample is only dropped when no other sample is
/// left.
pub fn discard_extremes(samples: &[f64], discard_max: bool, discard_min: bool) -> Vec<f64> {
    let mut kept = samples.to_vec();
    if discard_max && let Some(i) = first_extreme(&kept, |a, b| a > b) {
        kept.remove(i);
    }
    if discard_min && let Some(i) = first_extreme(&kept, |a, b| a < b) {
        kept.remove(i);
    }
    kept
}

fn first_extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if !better(v, values[b]) => {}
            _ => best = Some(i),
        }
    }
    best.or(if values.is_empty() { None } else { Some(0) })
}

/// Evaluates the inner evaluator `n_evaluation` times and reduces the
/// samples of each individual and score column.
///
/// `n_evaluation` is dynamic; it is checked against the discards on every
/// call.
pub struct MultipleEvaluation<E> {
    name: String,
    inner: E,
    parameters: Parameters,
    discard_max: bool,
    discard_min: bool,
    aggregation: AggregationMode,
}

impl<E: Evaluator> MultipleEvaluation<E> {
    /// Fails unless at least one sample survives the discards.
    pub fn new(
        inner: E,
        n_evaluation: usize,
        discard_max: bool,
        discard_min: bool,
        aggregation: AggregationMode,
    ) -> Result<Self, ConfigError> {
        check_sample_count(n_evaluation, discard_max, discard_min)?;

        Ok(Self {
            name: "MultipleEvaluation".to_string(),
            inner,
            parameters: Parameters::new()
                .with_dynamic("n_evaluation", n_evaluation)
                .with_static("discard_max", discard_max)
                .with_static("discard_min", discard_min)
                .with_static("aggregate_mode", aggregation.name()),
            discard_max,
            discard_min,
            aggregation,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn check_sample_count(
    n_evaluation: usize,
    discard_max: bool,
    discard_min: bool,
) -> Result<(), ConfigError> {
    let discarded = discard_max as usize + discard_min as usize;
    if n_evaluation <= discarded {
        return Err(ConfigError::InvalidValue(format!(
            "n_evaluation ({}) must exceed the number of discarded samples ({})",
            n_evaluation, discarded
        )));
    }
    Ok(())
}

impl<E: Evaluator> Evaluator for MultipleEvaluation<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_scores(&self) -> usize {
        self.inner.n_scores()
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError> {
        let n_evaluation = self.parameters.get_usize("n_evaluation")?;
        check_sample_count(n_evaluation, self.discard_max, self.discard_min)?;
        let n_scores = self.inner.n_scores();
        let expected = population.len() * n_scores;

        let mut runs = Vec::with_capacity(n_evaluation);
        for _ in 0..n_evaluation {
            let run = self.inner.evaluate(population)?;
            if run.values().len() != expected {
                return Err(EvaluationError::ScoreShape {
                    expected,
                    actual: run.values().len(),
                });
            }
            runs.push(run);
        }

        let mut samples = Vec::with_capacity(n_evaluation);
        let values = (0..expected)
            .map(|k| {
                samples.clear();
                samples.extend(runs.iter().map(|run| run.values()[k]));
                let kept = discard_extremes(&samples, self.discard_max, self.discard_min);
                self.aggregation.reduce(&kept)
            })
            .collect();
        Fitness::new(n_scores, values)
    }

    fn inner(&self) -> Option<&dyn Evaluator> {
        Some(&self.inner)
    }
}
