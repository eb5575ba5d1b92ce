//! Combine layer: selection followed by crossover, one child per individual.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::schema::{Chromosome, Crossover, Genes, Parameters, PopulationError, Selection};

use super::{Blend, ChromosomeOperator, Context, PipelineError, cross, select};

/// Replaces every individual by a child of `n_combine` selected parents.
#[derive(Debug, Clone)]
pub struct CombineLayer {
    parameters: Parameters,
    selection: Selection,
    crossover: Crossover,
    n_combine: usize,
    names: Option<Vec<String>>,
    rng: StdRng,
}

impl CombineLayer {
    pub fn new(selection: Selection, crossover: Crossover, n_combine: usize) -> Self {
        let mut parameters = Parameters::new()
            .with_static("selection_function_name", selection.name())
            .with_static("crossover_function_name", crossover.name())
            .with_static("n_combine", n_combine);
        if let Crossover::NPoint { points } = crossover {
            parameters = parameters.with_static("crossover_points", points);
        }

        Self {
            parameters,
            selection,
            crossover,
            n_combine: n_combine.max(1),
            names: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Restrict the layer to the given chromosomes.
    pub fn with_chromosomes(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn combine_rows<T: Blend>(&mut self, genes: &[T], width: usize, fitness: &[f64]) -> Vec<T> {
        let rows = genes.len() / width;
        let mut out = Vec::with_capacity(genes.len());
        let mut parents: Vec<&[T]> = Vec::with_capacity(self.n_combine);

        for _ in 0..rows {
            parents.clear();
            for index in select(self.selection, fitness, self.n_combine, &mut self.rng) {
                parents.push(&genes[index * width..(index + 1) * width]);
            }
            out.extend(cross(self.crossover, &parents, &mut self.rng));
        }
        out
    }
}

impl ChromosomeOperator for CombineLayer {
    fn kind(&self) -> &'static str {
        "CombineLayer"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn chromosome_names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    fn call_chromosome(
        &mut self,
        chromosome: &Chromosome,
        fitness: &[f64],
        context: &mut Context,
        _name: Option<&str>,
    ) -> Result<Chromosome, PipelineError> {
        if self.selection.needs_sort() && !context.sorted() {
            log::debug!(
                "{} selection used on an unsorted population",
                self.selection.name()
            );
        }

        let width = chromosome.width();
        let genes = match chromosome.genes() {
            Genes::Float(v) => Genes::Float(self.combine_rows(v, width, fitness)),
            Genes::Integer(v) => Genes::Integer(self.combine_rows(v, width, fitness)),
            Genes::Boolean(v) => Genes::Boolean(self.combine_rows(v, width, fitness)),
        };
        Chromosome::new(width, genes).ok_or_else(|| {
            PipelineError::Population(PopulationError::SchemaMismatch(
                "combined chromosome has a partial row".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::generator::apply_chromosome_operator;
    use crate::schema::{ChromosomeSpec, Descriptor, Population};

    fn population() -> (Population, Context) {
        let descriptor = Descriptor::from_specs(vec![
            ChromosomeSpec::float("x", 3),
            ChromosomeSpec::boolean("b", 2),
        ])
        .unwrap();
        let record = descriptor.record_type();
        let population = Population::new(
            record,
            vec![
                Chromosome::new(3, Genes::Float(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])).unwrap(),
                Chromosome::new(2, Genes::Boolean(vec![false, false, true, true])).unwrap(),
            ],
        )
        .unwrap();
        (population, Context::new(2, descriptor.chromosome_names()))
    }

    #[test]
    fn test_parameters() {
        let layer = CombineLayer::new(Selection::Tournament, Crossover::OnePoint, 2);
        let params = layer.parameters();
        assert_eq!(
            params.get("selection_function_name").and_then(|v| v.as_str()),
            Some("tournament")
        );
        assert_eq!(
            params.get("crossover_function_name").and_then(|v| v.as_str()),
            Some("one_point")
        );
        assert!(params.dynamic().is_empty());
    }

    #[test]
    fn test_rank_mean_combines_best_two() {
        let (population, mut context) = population();
        let mut layer = CombineLayer::new(Selection::Rank, Crossover::Mean, 2).with_seed(3);
        let (out, fitness) =
            apply_chromosome_operator(&mut layer, population, vec![1.0, 0.0], &mut context)
                .unwrap();

        assert_eq!(fitness, vec![1.0, 0.0]);
        assert_eq!(
            out.chromosome("x").unwrap().genes(),
            &Genes::Float(vec![0.5; 6])
        );
        // Boolean ties go to the first parent.
        assert_eq!(
            out.chromosome("b").unwrap().genes(),
            &Genes::Boolean(vec![false; 4])
        );
    }

    #[test]
    fn test_restricted_chromosomes() {
        let (population, mut context) = population();
        let mut layer = CombineLayer::new(Selection::Rank, Crossover::Mean, 2)
            .with_chromosomes(vec!["x".to_string()]);
        let (out, _) = apply_chromosome_operator(
            &mut layer,
            population.clone(),
            vec![1.0, 0.0],
            &mut context,
        )
        .unwrap();
        assert_eq!(out.chromosome("b"), population.chromosome("b"));
    }

    #[test]
    fn test_children_come_from_parents() {
        let (population, mut context) = population();
        let mut layer =
            CombineLayer::new(Selection::Tournament, Crossover::OnePoint, 2).with_seed(8);
        let (out, _) =
            apply_chromosome_operator(&mut layer, population, vec![0.0, 1.0], &mut context)
                .unwrap();
        let x = out.chromosome("x").unwrap();
        assert_eq!(x.rows(), 2);
        for i in 0..2 {
            let row = x.float_row(i).unwrap();
            assert!(row.iter().all(|&g| g == 0.0 || g == 1.0));
        }
    }
}
