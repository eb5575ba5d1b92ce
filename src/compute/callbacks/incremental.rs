//! Introduce chromosomes into a running evolution.

use crate::compute::generator::PipelineError;
use crate::schema::Parameters;

use super::{Callback, CallbackContext, base_parameters};

/// Keeps a [`Block`](crate::compute::generator::Block) layer active until
/// `generation_to_start`, then fires a first-generation layer exactly once
/// so the unblocked chromosomes start from fresh random genes.
#[derive(Debug, Clone)]
pub struct IncrementalEvolution {
    parameters: Parameters,
    generation_to_start: usize,
    block_layer: String,
    first_gen_layer: String,
    generation: usize,
}

impl IncrementalEvolution {
    pub fn new(
        generation_to_start: usize,
        block_layer: impl Into<String>,
        first_gen_layer: impl Into<String>,
    ) -> Self {
        let block_layer = block_layer.into();
        let first_gen_layer = first_gen_layer.into();
        Self {
            parameters: base_parameters()
                .with_static("generation_to_start", generation_to_start)
                .with_static("block_layer_name", block_layer.as_str())
                .with_static("first_gen_layer_name", first_gen_layer.as_str()),
            generation_to_start,
            block_layer,
            first_gen_layer,
            generation: 0,
        }
    }
}

impl Callback for IncrementalEvolution {
    fn name(&self) -> &str {
        "IncrementalEvolution"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn on_generator_start(
        &mut self,
        context: &mut CallbackContext<'_>,
    ) -> Result<(), PipelineError> {
        let (block, first_gen) = match self.generation.cmp(&self.generation_to_start) {
            std::cmp::Ordering::Less => (true, false),
            std::cmp::Ordering::Equal => {
                log::debug!(
                    "{}: releasing `{}` at generation {}",
                    self.name(),
                    self.block_layer,
                    self.generation
                );
                (false, true)
            }
            std::cmp::Ordering::Greater => (false, false),
        };
        context
            .generator
            .set_parameter(&self.block_layer, "run", block)?;
        context
            .generator
            .set_parameter(&self.first_gen_layer, "run", first_gen)?;

        self.generation += 1;
        Ok(())
    }
}
