//! Stock layers: ordering, filtering, blocking, predation and fan-in.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::schema::{Parameters, Population};

use super::{Context, Layer, PipelineError};

/// Reorders the population by descending fitness.
#[derive(Debug, Clone, Default)]
pub struct Sort {
    parameters: Parameters,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Indices of `fitness` from best to worst. NaN ranks last; ties keep their order.
pub fn descending_order(fitness: &[f64]) -> Vec<usize> {
    let key = |x: f64| if x.is_nan() { f64::NEG_INFINITY } else { x };
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by(|&a, &b| key(fitness[b]).total_cmp(&key(fitness[a])));
    order
}

impl Layer for Sort {
    fn kind(&self) -> &'static str {
        "Sort"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn call(
        &mut self,
        population: Population,
        fitness: Vec<f64>,
        context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError> {
        let order = descending_order(&fitness);
        let fitness = order.iter().map(|&i| fitness[i]).collect();
        context.set_sorted(true);
        Ok((population.select(&order), fitness))
    }
}

/// Keeps the first `n_to_pass` individuals.
#[derive(Debug, Clone)]
pub struct FilterFirsts {
    parameters: Parameters,
}

impl FilterFirsts {
    pub fn new(n_to_pass: usize) -> Self {
        Self {
            parameters: Parameters::new().with_dynamic("n_to_pass", n_to_pass),
        }
    }
}

impl Layer for FilterFirsts {
    fn kind(&self) -> &'static str {
        "FilterFirsts"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn call(
        &mut self,
        population: Population,
        mut fitness: Vec<f64>,
        _context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError> {
        let n = self.parameters.get_usize("n_to_pass")?;
        fitness.truncate(n);
        Ok((population.slice(0..n), fitness))
    }
}

/// Marks chromosomes as blocked for the rest of the branch while `run` is set.
#[derive(Debug, Clone)]
pub struct Block {
    parameters: Parameters,
}

impl Block {
    /// Blocks `names`, or every chromosome when `None`.
    pub fn new(names: Option<Vec<String>>, run: bool) -> Self {
        Self {
            parameters: Parameters::new()
                .with_static("chromosome_names", names)
                .with_dynamic("run", run),
        }
    }
}

impl Layer for Block {
    fn kind(&self) -> &'static str {
        "Block"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn call(
        &mut self,
        population: Population,
        fitness: Vec<f64>,
        context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError> {
        if self.parameters.get_bool("run")? {
            match self.parameters.get_str_list("chromosome_names")? {
                Some(names) => {
                    for name in &names {
                        context.block(name)?;
                    }
                }
                None => context.set_block_all(true),
            }
        }
        Ok((population, fitness))
    }
}

/// Keeps `n_to_predate` individuals sampled uniformly without replacement.
#[derive(Debug, Clone)]
pub struct RandomPredation {
    parameters: Parameters,
    rng: StdRng,
}

impl RandomPredation {
    pub fn new(n_to_predate: usize) -> Self {
        Self {
            parameters: Parameters::new().with_dynamic("n_to_predate", n_to_predate),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl Layer for RandomPredation {
    fn kind(&self) -> &'static str {
        "RandomPredation"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn call(
        &mut self,
        population: Population,
        fitness: Vec<f64>,
        _context: &mut Context,
    ) -> Result<(Population, Vec<f64>), PipelineError> {
        let requested = self.parameters.get_usize("n_to_predate")?;
        let n = if requested > population.len() {
            log::warn!(
                "RandomPredation asked for {} individuals out of {}; keeping all of them",
                requested,
                population.len()
            );
            population.len()
        } else {
            requested
        };

        let mut kept = rand::seq::index::sample(&mut self.rng, population.len(), n).into_vec();
        kept.sort_unstable();

        let fitness = kept.iter().map(|&i| fitness[i]).collect();
        Ok((population.select(&kept), fitness))
    }
}

/// What a barrier forwards once every predecessor has arrived.
pub type Merged = (Option<Population>, Option<Vec<f64>>);

/// Fan-in barrier: accumulates one batch per predecessor, then forwards the
/// concatenation once.
#[derive(Debug, Clone, Default)]
pub struct Concatenate {
    parameters: Parameters,
    received: usize,
    population: Option<Population>,
    fitness: Vec<f64>,
}

impl Concatenate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Batches received since the last emission.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Record one arrival. Returns the merged batch when this was the
    /// `expected`-th arrival.
    pub fn arrive(
        &mut self,
        population: Option<Population>,
        fitness: Option<Vec<f64>>,
        expected: usize,
    ) -> Result<Option<Merged>, PipelineError> {
        if let Some(population) = population {
            let fitness = fitness.unwrap_or_else(|| vec![0.0; population.len()]);
            match self.population.as_mut() {
                Some(buffer) => {
                    buffer.concat(&population)?;
                    self.fitness.extend(fitness);
                }
                None => {
                    self.population = Some(population);
                    self.fitness = fitness;
                }
            }
        }

        self.received += 1;
        if self.received < expected {
            return Ok(None);
        }

        self.received = 0;
        let fitness = std::mem::take(&mut self.fitness);
        Ok(Some(match self.population.take() {
            Some(population) => {
                log::debug!(
                    "Concatenate emitting {} individuals from {} branches",
                    population.len(),
                    expected
                );
                (Some(population), Some(fitness))
            }
            None => (None, None),
        }))
    }

    /// Drop partially accumulated batches.
    pub fn reset(&mut self) {
        self.received = 0;
        self.population = None;
        self.fitness.clear();
    }
}
