//! Hooks into the evolution loop.
//!
//! A [`Callback`] observes (and may reconfigure) the generator at five
//! points of every run. All hooks except `on_start` are skipped while the
//! callback's dynamic `run` parameter is false.

mod dynamic_mutation;
mod incremental;
mod logger;

pub use dynamic_mutation::*;
pub use incremental::*;
pub use logger::*;

use crate::compute::evaluator::{Evaluator, Fitness};
use crate::compute::generator::{Generator, PipelineError};
use crate::schema::{Parameters, Population, Value};

/// What a hook may touch.
pub struct CallbackContext<'a> {
    pub generator: &'a mut Generator,
    /// Outermost evaluation stage.
    pub evaluator: &'a dyn Evaluator,
    /// Index of the current generation, counted across `evolve` calls.
    pub generation: usize,
}

pub trait Callback: Send {
    fn name(&self) -> &str;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Value of the `run` parameter; true when absent.
    fn enabled(&self) -> bool {
        self.parameters()
            .get("run")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Once, before the first generation.
    fn on_start(&mut self, _context: &mut CallbackContext<'_>) -> Result<(), PipelineError> {
        Ok(())
    }

    fn on_generator_start(
        &mut self,
        _context: &mut CallbackContext<'_>,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    fn on_generator_end(
        &mut self,
        _context: &mut CallbackContext<'_>,
        _population: &Population,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    fn on_evaluator_end(
        &mut self,
        _context: &mut CallbackContext<'_>,
        _fitness: &Fitness,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    /// After the last generation of every `evolve` call.
    fn on_stop(&mut self, _context: &mut CallbackContext<'_>) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Parameters every callback starts from.
pub(crate) fn base_parameters() -> Parameters {
    Parameters::new().with_dynamic("run", true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::compute::evaluator::FunctionEvaluator;
    use crate::schema::Population;

    /// Row sums of `chr0`.
    pub fn sum_evaluator() -> FunctionEvaluator<impl Fn(&Population) -> Vec<f64> + Send + Sync> {
        FunctionEvaluator::new(1, |population: &Population| {
            population
                .chromosome("chr0")
                .map(|c| c.row_sums())
                .unwrap_or_default()
        })
    }
}
