//! Per-traversal side channel shared by the layers of one branch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::schema::Value;

use super::PipelineError;

/// State carried alongside the population through one `generate` call.
///
/// A layer that fans out hands each successor its own clone, so block flags
/// and values set on one branch never leak into another. All clones share the
/// same chromosome name list.
#[derive(Debug, Clone)]
pub struct Context {
    population_size: usize,
    sorted: bool,
    block_all: bool,
    blocked: BTreeMap<String, bool>,
    chromosome_names: Arc<[String]>,
    values: HashMap<String, Value>,
}

impl Context {
    pub fn new(population_size: usize, chromosome_names: Vec<String>) -> Self {
        let blocked = chromosome_names
            .iter()
            .map(|name| (name.clone(), false))
            .collect();
        Self {
            population_size,
            sorted: false,
            block_all: false,
            blocked,
            chromosome_names: chromosome_names.into(),
            values: HashMap::new(),
        }
    }

    /// Size requested from the generator.
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn sorted(&self) -> bool {
        self.sorted
    }

    pub fn set_sorted(&mut self, sorted: bool) {
        self.sorted = sorted;
    }

    pub fn block_all(&self) -> bool {
        self.block_all
    }

    pub fn set_block_all(&mut self, block_all: bool) {
        self.block_all = block_all;
    }

    pub fn chromosome_names(&self) -> &[String] {
        &self.chromosome_names
    }

    pub fn block(&mut self, name: &str) -> Result<(), PipelineError> {
        match self.blocked.get_mut(name) {
            Some(flag) => {
                *flag = true;
                Ok(())
            }
            None => Err(PipelineError::UnknownChromosome(name.to_string())),
        }
    }

    pub fn unblock(&mut self, name: &str) {
        if let Some(flag) = self.blocked.get_mut(name) {
            *flag = false;
        }
    }

    pub fn is_blocked(&self, name: &str) -> bool {
        self.block_all || self.blocked.get(name).copied().unwrap_or(false)
    }

    /// Whether any single chromosome is blocked.
    pub fn any_blocked(&self) -> bool {
        self.blocked.values().any(|b| *b)
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Value, PipelineError> {
        self.values
            .get(name)
            .ok_or_else(|| PipelineError::MissingContextValue(name.to_string()))
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Whether two contexts share the same name list allocation.
    pub fn shares_names_with(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.chromosome_names, &other.chromosome_names)
    }
}
