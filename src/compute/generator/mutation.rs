//! Mutation layers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::schema::{Chromosome, Genes, MutationFunction, Parameters};

use super::{ChromosomeOperator, Context, PipelineError};

/// Uniform sample from `[min, max)`, or `min` for an empty range.
fn uniform<R: Rng>(rng: &mut R, (min, max): (f64, f64)) -> f64 {
    if min < max { rng.gen_range(min..max) } else { min }
}

/// Mutated value of a single gene.
pub fn mutate_gene<R: Rng>(
    function: MutationFunction,
    gene: f64,
    range: (f64, f64),
    rng: &mut R,
) -> f64 {
    match function {
        MutationFunction::Sum => gene + uniform(rng, range),
        MutationFunction::Mul => gene * uniform(rng, range),
        MutationFunction::Gaussian => {
            let z: f64 = rng.sample(StandardNormal);
            gene + z * (range.1 - range.0) / 2.0 + (range.0 + range.1) / 2.0
        }
    }
}

/// Visit the genes of one row to mutate.
///
/// With probability `existence_rate` the row is mutated at all; the first
/// gene is always changed, each further gene with probability `gene_rate`,
/// and never more genes than the row holds.
fn mutate_row<R: Rng>(
    width: usize,
    existence_rate: f64,
    gene_rate: f64,
    rng: &mut R,
    mut mutate: impl FnMut(usize, &mut R),
) {
    if rng.r#gen::<f64>() >= existence_rate {
        return;
    }
    let mut count = 0;
    while (count == 0 || rng.r#gen::<f64>() < gene_rate) && count < width {
        let index = rng.gen_range(0..width);
        mutate(index, rng);
        count += 1;
    }
}

/// Numeric mutation of float and integer chromosomes.
///
/// `existence_rate`, `gene_rate`, `mutation_range_min` and
/// `mutation_range_max` are dynamic. Integer genes are rounded after
/// mutation.
#[derive(Debug, Clone)]
pub struct NumericMutationLayer {
    parameters: Parameters,
    function: MutationFunction,
    names: Option<Vec<String>>,
    rng: StdRng,
}

impl NumericMutationLayer {
    pub fn new(
        function: MutationFunction,
        existence_rate: f64,
        gene_rate: f64,
        range: (f64, f64),
    ) -> Self {
        Self {
            parameters: Parameters::new()
                .with_static("mutation_function_name", function.name())
                .with_dynamic("existence_rate", existence_rate)
                .with_dynamic("gene_rate", gene_rate)
                .with_dynamic("mutation_range_min", range.0)
                .with_dynamic("mutation_range_max", range.1),
            function,
            names: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_chromosomes(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl ChromosomeOperator for NumericMutationLayer {
    fn kind(&self) -> &'static str {
        "NumericMutationLayer"
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
        _fitness: &[f64],
        _context: &mut Context,
        _name: Option<&str>,
    ) -> Result<Chromosome, PipelineError> {
        let existence_rate = self.parameters.get_f64("existence_rate")?;
        let gene_rate = self.parameters.get_f64("gene_rate")?;
        let range = (
            self.parameters.get_f64("mutation_range_min")?,
            self.parameters.get_f64("mutation_range_max")?,
        );
        let function = self.function;
        let width = chromosome.width();

        let mut result = chromosome.clone();
        match result.genes_mut() {
            Genes::Float(genes) => {
                for row in genes.chunks_mut(width) {
                    mutate_row(width, existence_rate, gene_rate, &mut self.rng, |i, rng| {
                        row[i] = mutate_gene(function, row[i], range, rng);
                    });
                }
            }
            Genes::Integer(genes) => {
                for row in genes.chunks_mut(width) {
                    mutate_row(width, existence_rate, gene_rate, &mut self.rng, |i, rng| {
                        row[i] = mutate_gene(function, row[i] as f64, range, rng).round() as i64;
                    });
                }
            }
            Genes::Boolean(_) => {
                return Err(PipelineError::UnsupportedGeneType {
                    layer: self.kind(),
                    gene_type: chromosome.gene_type(),
                });
            }
        }
        Ok(result)
    }
}

/// Bit-flip mutation of boolean chromosomes. Integer chromosomes are treated
/// as 0/1 strings.
#[derive(Debug, Clone)]
pub struct BinaryMutationLayer {
    parameters: Parameters,
    names: Option<Vec<String>>,
    rng: StdRng,
}

impl BinaryMutationLayer {
    pub fn new(existence_rate: f64, gene_rate: f64) -> Self {
        Self {
            parameters: Parameters::new()
                .with_dynamic("existence_rate", existence_rate)
                .with_dynamic("gene_rate", gene_rate),
            names: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_chromosomes(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl ChromosomeOperator for BinaryMutationLayer {
    fn kind(&self) -> &'static str {
        "BinaryMutationLayer"
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
        _fitness: &[f64],
        _context: &mut Context,
        _name: Option<&str>,
    ) -> Result<Chromosome, PipelineError> {
        let existence_rate = self.parameters.get_f64("existence_rate")?;
        let gene_rate = self.parameters.get_f64("gene_rate")?;
        let width = chromosome.width();

        let mut result = chromosome.clone();
        match result.genes_mut() {
            Genes::Boolean(genes) => {
                for row in genes.chunks_mut(width) {
                    mutate_row(width, existence_rate, gene_rate, &mut self.rng, |i, _| {
                        row[i] = !row[i];
                    });
                }
            }
            Genes::Integer(genes) => {
                for row in genes.chunks_mut(width) {
                    mutate_row(width, existence_rate, gene_rate, &mut self.rng, |i, _| {
                        row[i] = if row[i] == 0 { 1 } else { 0 };
                    });
                }
            }
            Genes::Float(_) => {
                return Err(PipelineError::UnsupportedGeneType {
                    layer: self.kind(),
                    gene_type: chromosome.gene_type(),
                });
            }
        }
        Ok(result)
    }
}
