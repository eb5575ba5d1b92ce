//! Reduction of multi-score fitness to a single score.

use crate::schema::{AggregationMode, ConfigError, Parameters, Population, Value};

use super::{EvaluationError, Evaluator, Fitness};

/// Weights each score column and reduces the row with `mode`.
///
/// `weights` is dynamic so callbacks can rebalance objectives during a run.
/// The unreduced scores of the last call stay available through
/// [`last_scores`](Evaluator::last_scores).
pub struct FitnessAggregator<E> {
    name: String,
    inner: E,
    parameters: Parameters,
    mode: AggregationMode,
    scores: Option<Fitness>,
}

impl<E: Evaluator> FitnessAggregator<E> {
    /// Fails when `weights` does not have one entry per inner score.
    pub fn new(
        inner: E,
        mode: AggregationMode,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, ConfigError> {
        if let Some(weights) = &weights
            && weights.len() != inner.n_scores()
        {
            return Err(ConfigError::InvalidValue(format!(
                "{} weights for {} scores",
                weights.len(),
                inner.n_scores()
            )));
        }

        Ok(Self {
            name: "FitnessAggregator".to_string(),
            inner,
            parameters: Parameters::new()
                .with_static("mode", mode.name())
                .with_dynamic("weights", weights),
            mode,
            scores: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<E: Evaluator> Evaluator for FitnessAggregator<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_scores(&self) -> usize {
        1
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError> {
        let scores = self.inner.evaluate(population)?;
        let weights = self.parameters.get_float_list("weights")?;
        if let Some(weights) = &weights
            && weights.len() != scores.n_scores()
        {
            return Err(EvaluationError::ScoreShape {
                expected: scores.n_scores(),
                actual: weights.len(),
            });
        }

        let mut weighted = Vec::with_capacity(scores.n_scores());
        let values = scores
            .rows()
            .map(|row| {
                weighted.clear();
                match &weights {
                    Some(weights) => weighted.extend(row.iter().zip(weights).map(|(s, w)| s * w)),
                    None => weighted.extend_from_slice(row),
                }
                self.mode.reduce(&weighted)
            })
            .collect();

        self.scores = Some(scores);
        Ok(Fitness::single(values))
    }

    fn inner(&self) -> Option<&dyn Evaluator> {
        Some(&self.inner)
    }

    fn last_scores(&self) -> Option<&Fitness> {
        self.scores.as_ref()
    }
}

impl<E> FitnessAggregator<E> {
    /// Current weights, if any.
    pub fn weights(&self) -> Option<&[f64]> {
        self.parameters.get("weights").and_then(Value::as_float_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evaluator::FunctionEvaluator;
    use crate::schema::{Chromosome, Descriptor, GeneType, Genes};

    fn population() -> Population {
        let record = Descriptor::single(1, GeneType::Float).unwrap().record_type();
        Population::new(
            record,
            vec![Chromosome::new(1, Genes::Float(vec![1.0, 2.0])).unwrap()],
        )
        .unwrap()
    }

    /// Scores `(x, 10 - x, 2x)` per individual.
    fn three_scores() -> FunctionEvaluator<impl Fn(&Population) -> Vec<f64> + Send + Sync> {
        FunctionEvaluator::new(3, |population: &Population| {
            population
                .chromosome("chr0")
                .map(|c| {
                    c.row_sums()
                        .into_iter()
                        .flat_map(|x| [x, 10.0 - x, 2.0 * x])
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    #[test]
    fn test_modes() {
        let cases = [
            (AggregationMode::Max, vec![9.0, 8.0]),
            (AggregationMode::Min, vec![1.0, 2.0]),
            (AggregationMode::Mean, vec![4.0, 14.0 / 3.0]),
            (AggregationMode::Median, vec![2.0, 4.0]),
        ];
        for (mode, expected) in cases {
            let mut evaluator = FitnessAggregator::new(three_scores(), mode, None).unwrap();
            let fitness = evaluator.evaluate(&population()).unwrap();
            assert_eq!(fitness.values(), expected.as_slice(), "{:?}", mode);
            assert_eq!(fitness.n_scores(), 1);
        }
    }

    #[test]
    fn test_weights_and_last_scores() {
        let mut evaluator = FitnessAggregator::new(
            three_scores(),
            AggregationMode::Max,
            Some(vec![1.0, 0.0, -1.0]),
        )
        .unwrap();
        let fitness = evaluator.evaluate(&population()).unwrap();
        assert_eq!(fitness.values(), &[1.0, 2.0]);
        assert_eq!(
            evaluator.last_scores().map(|s| s.row(0).to_vec()),
            Some(vec![1.0, 9.0, 2.0])
        );

        assert!(evaluator.parameters_mut().set("weights", vec![0.0, 1.0, 0.0]));
        assert_eq!(evaluator.evaluate(&population()).unwrap().values(), &[9.0, 8.0]);
        assert_eq!(evaluator.weights(), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[test]
    fn test_weight_length() {
        assert!(matches!(
            FitnessAggregator::new(three_scores(), AggregationMode::Mean, Some(vec![1.0])),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut evaluator =
            FitnessAggregator::new(three_scores(), AggregationMode::Mean, None).unwrap();
        evaluator.parameters_mut().set("weights", vec![1.0]);
        assert_eq!(
            evaluator.evaluate(&population()),
            Err(EvaluationError::ScoreShape {
                expected: 3,
                actual: 1
            })
        );
    }
}
