//! Generational fitness cache.

use std::collections::HashMap;

use crate::schema::{Parameters, Population};

use super::{EvaluationError, Evaluator, Fitness};

#[derive(Debug, Clone)]
struct CacheEntry {
    scores: Vec<f64>,
    last_access: usize,
}

/// Memoises the inner evaluator per individual.
///
/// Individuals are keyed by their canonical bytes, with float genes rounded
/// to `max_decimals` when set. Misses of one call are evaluated together in
/// a single inner call. At the end of every call entries not accessed for
/// `n_generation_ttl` generations are evicted and the generation advances.
pub struct FitnessCache<E> {
    name: String,
    inner: E,
    parameters: Parameters,
    ttl: usize,
    max_decimals: Option<u32>,
    entries: HashMap<Vec<u8>, CacheEntry>,
    generation: usize,
    hits: usize,
    misses: usize,
}

impl<E: Evaluator> FitnessCache<E> {
    pub fn new(inner: E, n_generation_ttl: usize, max_decimals: Option<u32>) -> Self {
        Self {
            name: "FitnessCache".to_string(),
            inner,
            parameters: Parameters::new()
                .with_static("n_generation_ttl", n_generation_ttl)
                .with_static("max_decimals", max_decimals.map(|d| d as usize)),
            ttl: n_generation_ttl,
            max_decimals,
            entries: HashMap::new(),
            generation: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cached individuals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Completed evaluation calls.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Total individuals served from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Total distinct individuals sent to the inner evaluator.
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    fn evict(&mut self) {
        let (generation, ttl) = (self.generation, self.ttl);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| generation - entry.last_access < ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            log::debug!("{}: evicted {} entries", self.name, evicted);
        }
    }
}

impl<E: Evaluator> Evaluator for FitnessCache<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_scores(&self) -> usize {
        self.inner.n_scores()
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError> {
        let n_scores = self.inner.n_scores();
        let mut fitness = Fitness::zeros(population.len(), n_scores);

        // Distinct missing keys, with the rows waiting for each.
        let mut pending: Vec<(Vec<u8>, Vec<usize>)> = Vec::new();
        let mut pending_index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut hits = 0;

        for i in 0..population.len() {
            let key = population.individual_key(i, self.max_decimals);
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.last_access = self.generation;
                fitness.row_mut(i).copy_from_slice(&entry.scores);
                hits += 1;
            } else if let Some(&slot) = pending_index.get(&key) {
                pending[slot].1.push(i);
            } else {
                pending_index.insert(key.clone(), pending.len());
                pending.push((key, vec![i]));
            }
        }

        if !pending.is_empty() {
            let first_rows: Vec<usize> = pending.iter().map(|(_, rows)| rows[0]).collect();
            let computed = self.inner.evaluate(&population.select(&first_rows))?;
            if computed.len() != pending.len() || computed.n_scores() != n_scores {
                return Err(EvaluationError::ScoreShape {
                    expected: pending.len() * n_scores,
                    actual: computed.values().len(),
                });
            }
            for (slot, (key, rows)) in pending.iter().enumerate() {
                let scores = computed.row(slot);
                for &i in rows {
                    fitness.row_mut(i).copy_from_slice(scores);
                }
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        scores: scores.to_vec(),
                        last_access: self.generation,
                    },
                );
            }
        }

        log::debug!(
            "{}: {} hits, {} misses",
            self.name,
            hits,
            pending.len()
        );
        self.hits += hits;
        self.misses += pending.len();
        self.evict();
        self.generation += 1;
        Ok(fitness)
    }

    fn inner(&self) -> Option<&dyn Evaluator> {
        Some(&self.inner)
    }
}
