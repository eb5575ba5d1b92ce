//! Evoflow - Evolutionary computation with layered pipelines.
//!
//! This crate evolves populations of structured individuals. A generator
//! graph of selection, crossover and mutation layers produces each
//! generation; a chain of evaluators scores it; callbacks can adjust both
//! between steps.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Descriptors, populations, parameters and configuration types
//! - `compute`: Generator layers, evaluators, callbacks and the `Evolver` loop
//!
//! # Example
//!
//! ```rust,no_run
//! use evoflow::{
//!     compute::{Evolver, evaluator::FunctionEvaluator, generator::presets::elitist_pipeline},
//!     schema::{ChromosomeSpec, Descriptor, PipelineConfig, Population},
//! };
//!
//! // Individuals hold three floats in [-5, 5]
//! let descriptor =
//!     Descriptor::from_specs(vec![ChromosomeSpec::float("chr0", 3).with_range(-5.0, 5.0)]).unwrap();
//! let generator = elitist_pipeline(descriptor, 50, &PipelineConfig::default()).unwrap();
//!
//! // Maximise the negated sum of squares
//! let evaluator = FunctionEvaluator::new(1, |population: &Population| {
//!     let genes = population.chromosome("chr0").unwrap();
//!     (0..population.len())
//!         .map(|i| -genes.float_row(i).unwrap().iter().map(|x| x * x).sum::<f64>())
//!         .collect()
//! });
//!
//! let mut evolver = Evolver::new(generator, evaluator, 50);
//! let outcome = evolver.evolve(100).unwrap();
//! println!("Best fitness: {:?}", outcome.best_per_generation().last());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{EvolveError, EvolveOutcome, Evolver};
pub use schema::{Descriptor, EvolverConfig, Parameters, PipelineConfig, Population};
