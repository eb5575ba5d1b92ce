//! Mutation-range schedule driven by fitness stagnation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compute::evaluator::Fitness;
use crate::compute::generator::PipelineError;
use crate::schema::{Parameters, Value};

use super::{Callback, CallbackContext, base_parameters};

/// Schedule settings. Patience values count generations without a new best
/// fitness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicMutationConfig {
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_stage_patience")]
    pub refinement_patience: usize,
    #[serde(default = "default_stage_patience")]
    pub exploration_patience: usize,
    #[serde(default = "default_refinement_steps")]
    pub refinement_steps: usize,
    #[serde(default = "default_exploration_steps")]
    pub exploration_steps: usize,
    #[serde(default = "default_factor")]
    pub refinement_divider: f64,
    #[serde(default = "default_factor")]
    pub exploration_multiplier: f64,
}

impl Default for DynamicMutationConfig {
    fn default() -> Self {
        Self {
            patience: default_patience(),
            refinement_patience: default_stage_patience(),
            exploration_patience: default_stage_patience(),
            refinement_steps: default_refinement_steps(),
            exploration_steps: default_exploration_steps(),
            refinement_divider: default_factor(),
            exploration_multiplier: default_factor(),
        }
    }
}

fn default_patience() -> usize {
    10
}
fn default_stage_patience() -> usize {
    2
}
fn default_refinement_steps() -> usize {
    2
}
fn default_exploration_steps() -> usize {
    5
}
fn default_factor() -> f64 {
    2.0
}

/// Stage of the [`DynamicMutation`] schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStage {
    Normal,
    /// Mutation ranges shrunk to fine-tune the current best.
    Refinement,
    /// Mutation ranges widened to escape a plateau.
    Exploration,
}

/// Adapts the mutation ranges of the named layers when fitness stalls.
///
/// After `patience` generations without improvement the ranges are divided
/// by `refinement_divider` (up to `refinement_steps` times, one step per
/// `refinement_patience` stalled generations). If that does not help, the
/// original ranges are multiplied by `exploration_multiplier` in the same
/// fashion. Any improvement during exploration, or running out of
/// exploration steps, restores the original parameters.
///
/// `wait` and `step_count` are reported as locked dynamic parameters.
#[derive(Debug, Clone)]
pub struct DynamicMutation {
    parameters: Parameters,
    layer_names: Vec<String>,
    best_fitness: f64,
    stage: MutationStage,
    saved: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DynamicMutation {
    pub fn new(layer_names: Vec<String>, config: DynamicMutationConfig) -> Self {
        let mut parameters = base_parameters()
            .with_static("layer_names", layer_names.clone())
            .with_dynamic("patience", config.patience)
            .with_dynamic("refinement_patience", config.refinement_patience)
            .with_dynamic("exploration_patience", config.exploration_patience)
            .with_dynamic("refinement_steps", config.refinement_steps)
            .with_dynamic("exploration_steps", config.exploration_steps)
            .with_dynamic("refinement_divider", config.refinement_divider)
            .with_dynamic("exploration_multiplier", config.exploration_multiplier)
            .with_dynamic("wait", 0usize)
            .with_dynamic("step_count", 0usize);
        parameters.lock("wait");
        parameters.lock("step_count");

        Self {
            parameters,
            layer_names,
            best_fitness: f64::NEG_INFINITY,
            stage: MutationStage::Normal,
            saved: BTreeMap::new(),
        }
    }

    pub fn stage(&self) -> MutationStage {
        self.stage
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    fn save(&mut self, context: &CallbackContext<'_>) -> Result<(), PipelineError> {
        for name in &self.layer_names {
            let parameters = context.generator.get_parameters(name)?.all().clone();
            self.saved.insert(name.clone(), parameters);
        }
        Ok(())
    }

    fn restore(&self, context: &mut CallbackContext<'_>) -> Result<(), PipelineError> {
        for (name, parameters) in &self.saved {
            context.generator.set_parameters(name, parameters)?;
        }
        Ok(())
    }

    /// Scale the mutation range of every layer that has one.
    fn scale(&self, context: &mut CallbackContext<'_>, factor: f64) -> Result<(), PipelineError> {
        for name in &self.layer_names {
            let parameters = context.generator.get_parameters(name)?;
            if !parameters.contains("mutation_range_min") {
                continue;
            }
            let min = parameters.get_f64("mutation_range_min")? * factor;
            let max = parameters.get_f64("mutation_range_max")? * factor;
            context
                .generator
                .set_parameter(name, "mutation_range_min", min)?;
            context
                .generator
                .set_parameter(name, "mutation_range_max", max)?;
        }
        Ok(())
    }
}

impl Callback for DynamicMutation {
    fn name(&self) -> &str {
        "DynamicMutation"
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn on_evaluator_end(
        &mut self,
        context: &mut CallbackContext<'_>,
        fitness: &Fitness,
    ) -> Result<(), PipelineError> {
        let p = &self.parameters;
        let patience = p.get_usize("patience")?;
        let refinement_patience = p.get_usize("refinement_patience")?;
        let exploration_patience = p.get_usize("exploration_patience")?;
        let refinement_steps = p.get_usize("refinement_steps")?;
        let exploration_steps = p.get_usize("exploration_steps")?;
        let divider = p.get_f64("refinement_divider")?;
        let multiplier = p.get_f64("exploration_multiplier")?;
        let mut wait = p.get_usize("wait")?;
        let mut step_count = p.get_usize("step_count")?;

        match fitness.max() {
            Some(max) if max > self.best_fitness => {
                self.best_fitness = max;
                wait = 0;
                if self.stage == MutationStage::Exploration {
                    self.stage = MutationStage::Normal;
                    self.restore(context)?;
                    step_count = 0;
                }
            }
            _ => wait += 1,
        }

        match self.stage {
            MutationStage::Normal if wait >= patience => {
                wait = 0;
                self.stage = MutationStage::Refinement;
                step_count = 1;
                self.save(context)?;
                self.scale(context, 1.0 / divider)?;
            }
            MutationStage::Refinement if wait >= refinement_patience => {
                wait = 0;
                if step_count >= refinement_steps {
                    self.stage = MutationStage::Exploration;
                    step_count = 1;
                    self.restore(context)?;
                    self.scale(context, multiplier)?;
                } else {
                    self.scale(context, 1.0 / divider)?;
                    step_count += 1;
                }
            }
            MutationStage::Exploration if wait >= exploration_patience => {
                wait = 0;
                if step_count >= exploration_steps {
                    self.stage = MutationStage::Normal;
                    step_count = 0;
                    self.restore(context)?;
                } else {
                    self.scale(context, multiplier)?;
                    step_count += 1;
                }
            }
            _ => {}
        }

        if self.stage != MutationStage::Normal {
            log::debug!("{}: {:?} step {}", self.name(), self.stage, step_count);
        }
        self.parameters.force("wait", wait);
        self.parameters.force("step_count", step_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::callbacks::test_support::sum_evaluator;
    use crate::compute::generator::{Generator, NameRegistry, NumericMutationLayer};
    use crate::schema::{Descriptor, GeneType, MutationFunction};

    fn generator() -> Generator {
        Generator::builder()
            .descriptor(Descriptor::single(1, GeneType::Float).unwrap())
            .registry(NameRegistry::new())
            .layer(NumericMutationLayer::new(
                MutationFunction::Sum,
                1.0,
                0.5,
                (-8.0, 8.0),
            ))
            .build()
            .unwrap()
    }

    fn range(generator: &Generator) -> (f64, f64) {
        let p = generator.get_parameters("NumericMutationLayer0").unwrap();
        (
            p.get_f64("mutation_range_min").unwrap(),
            p.get_f64("mutation_range_max").unwrap(),
        )
    }

    #[test]
    fn test_schedule() {
        let mut generator = generator();
        let evaluator = sum_evaluator();
        let config = DynamicMutationConfig {
            patience: 2,
            refinement_patience: 1,
            exploration_patience: 1,
            refinement_steps: 2,
            exploration_steps: 2,
            ..Default::default()
        };
        let mut callback = DynamicMutation::new(vec!["NumericMutationLayer0".to_string()], config);
        let flat = Fitness::single(vec![1.0]);

        let step = |callback: &mut DynamicMutation, generator: &mut Generator| {
            let mut context = CallbackContext {
                generator,
                evaluator: &evaluator,
                generation: 0,
            };
            callback.on_evaluator_end(&mut context, &flat).unwrap();
            (callback.stage(), range(context.generator))
        };

        // New best, then two stalled generations.
        assert_eq!(step(&mut callback, &mut generator).0, MutationStage::Normal);
        assert_eq!(step(&mut callback, &mut generator).0, MutationStage::Normal);
        assert_eq!(
            step(&mut callback, &mut generator),
            (MutationStage::Refinement, (-4.0, 4.0))
        );
        assert_eq!(
            step(&mut callback, &mut generator),
            (MutationStage::Refinement, (-2.0, 2.0))
        );
        assert_eq!(
            step(&mut callback, &mut generator),
            (MutationStage::Exploration, (-16.0, 16.0))
        );
        assert_eq!(
            step(&mut callback, &mut generator),
            (MutationStage::Exploration, (-32.0, 32.0))
        );
        assert_eq!(
            step(&mut callback, &mut generator),
            (MutationStage::Normal, (-8.0, 8.0))
        );
    }

    #[test]
    fn test_improvement_ends_exploration() {
        let mut generator = generator();
        let evaluator = sum_evaluator();
        let config = DynamicMutationConfig {
            patience: 1,
            refinement_patience: 1,
            refinement_steps: 1,
            ..Default::default()
        };
        let mut callback = DynamicMutation::new(vec!["NumericMutationLayer0".to_string()], config);

        for value in [1.0, 1.0, 1.0, 2.0] {
            let mut context = CallbackContext {
                generator: &mut generator,
                evaluator: &evaluator,
                generation: 0,
            };
            callback
                .on_evaluator_end(&mut context, &Fitness::single(vec![value]))
                .unwrap();
        }
        assert_eq!(callback.stage(), MutationStage::Normal);
        assert_eq!(range(&generator), (-8.0, 8.0));
        assert_eq!(callback.best_fitness(), 2.0);
    }

    #[test]
    fn test_bookkeeping_is_locked() {
        let mut callback = DynamicMutation::new(vec![], DynamicMutationConfig::default());
        assert!(!callback.parameters_mut().set("wait", 5usize));
        assert!(callback.parameters_mut().set("patience", 3usize));
        assert!(callback.enabled());
    }
}
