//! Compute module - Generation, evaluation and the evolution loop.

pub mod callbacks;
pub mod evaluator;
mod evolver;
pub mod generator;

pub use evolver::*;
