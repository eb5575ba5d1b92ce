//! The generate → evaluate → feed back loop.

use std::time::Instant;

use crate::compute::callbacks::{Callback, CallbackContext};
use crate::compute::evaluator::{EvaluationError, Evaluator};
use crate::compute::generator::{Generator, PipelineError};
use crate::schema::{ConfigError, EvolverConfig, Population};

/// Errors raised by [`Evolver::evolve`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvolveError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("The evaluator yields {0} scores per individual; aggregate them before evolving")]
    MultiScoreFeedback(usize),
    #[error("At least one generation is required")]
    NoGenerations,
}

/// Result of one [`Evolver::evolve`] call.
#[derive(Debug, Clone)]
pub struct EvolveOutcome {
    /// Fitness of every individual, one row per generation.
    pub history: Vec<Vec<f64>>,
    /// Last generated population.
    pub population: Population,
}

impl EvolveOutcome {
    /// Best fitness of every generation.
    pub fn best_per_generation(&self) -> Vec<f64> {
        self.history
            .iter()
            .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect()
    }
}

/// Drives a [`Generator`] and an [`Evaluator`] through successive
/// generations, invoking callbacks around each step.
pub struct Evolver {
    generator: Generator,
    evaluator: Box<dyn Evaluator>,
    callbacks: Vec<Box<dyn Callback>>,
    config: EvolverConfig,
    started: bool,
    generation: usize,
}

impl Evolver {
    pub fn new(
        generator: Generator,
        evaluator: impl Evaluator + 'static,
        population_size: usize,
    ) -> Self {
        Self {
            generator,
            evaluator: Box::new(evaluator),
            callbacks: Vec::new(),
            config: EvolverConfig {
                population_size,
                ..Default::default()
            },
            started: false,
            generation: 0,
        }
    }

    /// Callbacks run in insertion order.
    pub fn with_callback(mut self, callback: impl Callback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn with_config(mut self, config: EvolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut Generator {
        &mut self.generator
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    pub fn callbacks(&self) -> &[Box<dyn Callback>] {
        &self.callbacks
    }

    pub fn config(&self) -> &EvolverConfig {
        &self.config
    }

    /// Generations completed so far, across calls.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Run `n_generations` generations. Start hooks only fire on the first
    /// call; stop hooks fire at the end of every call.
    pub fn evolve(&mut self, n_generations: usize) -> Result<EvolveOutcome, EvolveError> {
        self.config.validate()?;
        if n_generations == 0 {
            return Err(EvolveError::NoGenerations);
        }
        let n_scores = self.evaluator.n_scores();
        if n_scores != 1 {
            return Err(EvolveError::MultiScoreFeedback(n_scores));
        }

        if !self.started {
            self.started = true;
            for callback in &mut self.callbacks {
                let mut context = CallbackContext {
                    generator: &mut self.generator,
                    evaluator: self.evaluator.as_ref(),
                    generation: self.generation,
                };
                callback.on_start(&mut context)?;
            }
        }

        let size = self.config.population_size;
        let mut history = Vec::with_capacity(n_generations);
        let mut last = None;

        for _ in 0..n_generations {
            let start = Instant::now();

            self.run_hooks(|callback, context| callback.on_generator_start(context))?;
            let population = self.generator.generate(size)?;
            self.run_hooks(|callback, context| callback.on_generator_end(context, &population))?;

            let fitness = self.evaluator.evaluate(&population)?;
            self.run_hooks(|callback, context| callback.on_evaluator_end(context, &fitness))?;

            let values = fitness.into_values();
            self.generator.set_fitness(values.clone())?;

            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if self.config.verbose {
                log::info!(
                    "Generation {} | Max fitness {} | Time {:.3?}",
                    self.generation,
                    max,
                    start.elapsed()
                );
            } else {
                log::debug!(
                    "Generation {} | Max fitness {} | Time {:.3?}",
                    self.generation,
                    max,
                    start.elapsed()
                );
            }

            history.push(values);
            last = Some(population);
            self.generation += 1;
        }

        self.run_hooks(|callback, context| callback.on_stop(context))?;

        let population = last.ok_or(EvolveError::NoGenerations)?;
        Ok(EvolveOutcome {
            history,
            population,
        })
    }

    /// Invoke `hook` on every enabled callback.
    fn run_hooks(
        &mut self,
        mut hook: impl FnMut(
            &mut dyn Callback,
            &mut CallbackContext<'_>,
        ) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        for callback in &mut self.callbacks {
            if !callback.enabled() {
                continue;
            }
            let mut context = CallbackContext {
                generator: &mut self.generator,
                evaluator: self.evaluator.as_ref(),
                generation: self.generation,
            };
            hook(callback.as_mut(), &mut context)?;
        }
        Ok(())
    }
}
