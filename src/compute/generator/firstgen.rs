//! Source layer producing the initial population.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::schema::{
    Chromosome, ChromosomeSpec, Descriptor, GeneType, Genes, Parameters, Population,
};

use super::{ChromosomeOperator, Context, PipelineError, apply_chromosome_operator};

/// Produces a random (or zeroed) population when none exists yet.
///
/// Once a population flows through it, the layer passes it on unchanged
/// unless `run` is set, in which case the targeted chromosomes are drawn
/// again from their descriptor ranges.
#[derive(Debug, Clone)]
pub struct FirstGenLayer {
    parameters: Parameters,
    descriptor: Descriptor,
    names: Option<Vec<String>>,
    rng: StdRng,
}

impl FirstGenLayer {
    pub fn new(descriptor: Descriptor) -> Self {
        Self {
            parameters: Parameters::new()
                .with_static("initialize_zeros", false)
                .with_dynamic("run", false),
            descriptor,
            names: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Start from all-zero genes instead of random ones.
    pub fn zeroed(mut self) -> Self {
        self.parameters.force("initialize_zeros", true);
        self
    }

    pub fn with_chromosomes(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Full population of `context.population_size()` individuals.
    pub fn produce_initial(&mut self, context: &Context) -> Result<Population, PipelineError> {
        let size = context.population_size();
        let record = self.descriptor.record_type();
        if self.parameters.get_bool("initialize_zeros")? {
            return Ok(Population::zeros(record, size));
        }

        let specs = self.descriptor.chromosomes().to_vec();
        let chromosomes = specs
            .iter()
            .map(|spec| self.random_chromosome(spec, size))
            .collect();
        Ok(Population::new(record, chromosomes)?)
    }

    fn random_chromosome(&mut self, spec: &ChromosomeSpec, rows: usize) -> Chromosome {
        let n = rows * spec.width();
        let (min, max) = spec.range;
        let rng = &mut self.rng;
        let genes = match spec.gene_type {
            GeneType::Float => Genes::Float(
                (0..n)
                    .map(|_| if min < max { rng.gen_range(min..max) } else { min })
                    .collect(),
            ),
            GeneType::Integer => {
                let (lo, hi) = (min.ceil() as i64, max.floor() as i64);
                Genes::Integer(
                    (0..n)
                        .map(|_| if lo < hi { rng.gen_range(lo..hi) } else { lo })
                        .collect(),
                )
            }
            GeneType::Boolean => Genes::Boolean((0..n).map(|_| rng.r#gen::<bool>()).collect()),
        };
        // Width is non-zero for every validated descriptor.
        Chromosome::new(spec.width(), genes)
            .unwrap_or_else(|| Chromosome::zeros(spec.gene_type, rows, spec.width()))
    }

    /// Regenerate the targeted chromosomes while `run` is set.
    pub fn process(
        &mut self,
        population: Population,
        fitness: Vec<f64>,
        context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError> {
        if !self.parameters.get_bool("run")? {
            return Ok((population, fitness));
        }
        apply_chromosome_operator(self, population, fitness, context)
    }
}

impl ChromosomeOperator for FirstGenLayer {
    fn kind(&self) -> &'static str {
        "FirstGenLayer"
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
        name: Option<&str>,
    ) -> Result<Chromosome, PipelineError> {
        let spec = match name {
            Some(name) => self.descriptor.spec(name),
            None => self.descriptor.chromosomes().first(),
        }
        .cloned()
        .ok_or_else(|| PipelineError::UnknownChromosome(name.unwrap_or_default().to_string()))?;

        Ok(self.random_chromosome(&spec, chromosome.rows()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ChromosomeSpec;

    fn descriptor() -> Descriptor {
        Descriptor::from_specs(vec![
            ChromosomeSpec::float("f", 3).with_range(-2.0, 2.0),
            ChromosomeSpec::integer("i", 2).with_range(1.0, 4.0),
            ChromosomeSpec::boolean("b", 4),
        ])
        .unwrap()
    }

    fn context(size: usize) -> Context {
        Context::new(size, descriptor().chromosome_names())
    }

    #[test]
    fn test_initial_population_respects_ranges() {
        let mut layer = FirstGenLayer::new(descriptor()).with_seed(42);
        let population = layer.produce_initial(&context(50)).unwrap();

        assert_eq!(population.len(), 50);
        assert_eq!(population.record_type(), &descriptor().record_type());
        match population.chromosome("f").unwrap().genes() {
            Genes::Float(v) => assert!(v.iter().all(|g| (-2.0..2.0).contains(g))),
            other => panic!("unexpected genes {:?}", other),
        }
        match population.chromosome("i").unwrap().genes() {
            Genes::Integer(v) => assert!(v.iter().all(|g| (1..4).contains(g))),
            other => panic!("unexpected genes {:?}", other),
        }
    }

    #[test]
    fn test_zeroed() {
        let mut layer = FirstGenLayer::new(descriptor()).zeroed();
        let population = layer.produce_initial(&context(3)).unwrap();
        assert_eq!(population, Population::zeros(descriptor().record_type(), 3));
    }

    #[test]
    fn test_passthrough_until_run() {
        let mut layer = FirstGenLayer::new(descriptor()).zeroed().with_seed(1);
        let mut ctx = context(4);
        let zeros = Population::zeros(descriptor().record_type(), 4);

        let (out, _) = layer.process(zeros.clone(), vec![0.0; 4], &mut ctx).unwrap();
        assert_eq!(out, zeros);

        assert!(layer.parameters_mut().set("run", true));
        ctx.block("b").unwrap();
        let (out, _) = layer.process(zeros.clone(), vec![0.0; 4], &mut ctx).unwrap();
        assert_ne!(out.chromosome("f"), zeros.chromosome("f"));
        assert_eq!(out.chromosome("b"), zeros.chromosome("b"));
        assert_eq!(out.len(), 4);
    }
}
