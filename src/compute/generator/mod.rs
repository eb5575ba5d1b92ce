//! Generator pipeline: a validated graph of layers that turns the previous
//! generation (and its fitness) into the next one.
//!
//! # Overview
//!
//! - **Context** (`context`): per-traversal side channel (sort flag, block flags, free-form values)
//! - **Layers** (`layer`, `basic`): the `Layer`/`ChromosomeOperator` extension points and stock nodes
//! - **Graph** (`graph`): arena of nodes, depth-first traversal and construction-time validation
//! - **Operators** (`selection`, `crossover`, `combine`, `mutation`, `firstgen`)
//! - **Generator** (`pipeline`, `presets`): orchestration and ready-made pipelines
//!
//! # Example
//!
//! ```rust,no_run
//! use evoflow::compute::generator::{CombineLayer, Generator, NumericMutationLayer};
//! use evoflow::schema::{Crossover, Descriptor, GeneType, MutationFunction, Selection};
//!
//! let descriptor = Descriptor::single(5, GeneType::Float).unwrap();
//! let mut generator = Generator::builder()
//!     .descriptor(descriptor)
//!     .layers(vec![
//!         CombineLayer::new(Selection::Tournament, Crossover::OnePoint, 2).into(),
//!         NumericMutationLayer::new(MutationFunction::Sum, 1.0, 0.5, (0.0, 1.0)).into(),
//!     ])
//!     .build()
//!     .unwrap();
//!
//! let population = generator.generate(5).unwrap();
//! let fitness = population.chromosome("chr0").unwrap().row_sums();
//! generator.set_fitness(fitness).unwrap();
//! let next = generator.generate(5).unwrap();
//! assert_eq!(next.len(), 5);
//! ```

mod basic;
mod combine;
mod context;
mod crossover;
mod firstgen;
mod graph;
mod layer;
mod mutation;
mod pipeline;
pub mod presets;
mod selection;

pub use basic::*;
pub use combine::*;
pub use context::*;
pub use crossover::*;
pub use firstgen::*;
pub use graph::*;
pub use layer::*;
pub use mutation::*;
pub use pipeline::*;
pub use selection::*;

use crate::schema::{ConfigError, GeneType, ParameterError, PopulationError};

/// Errors raised while generating a population.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("The generator produced {actual} individuals, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("The last layer did not produce a population")]
    NoPopulation,
    #[error("No layer named `{0}`")]
    UnknownLayer(String),
    #[error("Chromosome `{0}` is not part of the descriptor")]
    UnknownChromosome(String),
    #[error("Context doesn't have a `{0}` value")]
    MissingContextValue(String),
    #[error("Layer `{layer}` cannot operate on {gene_type:?} chromosomes")]
    UnsupportedGeneType {
        layer: &'static str,
        gene_type: GeneType,
    },
    #[error("Fitness has {actual} entries for {expected} individuals")]
    FitnessLength { expected: usize, actual: usize },
    #[error(transparent)]
    Population(#[from] PopulationError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
