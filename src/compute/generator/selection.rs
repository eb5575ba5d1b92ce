//! Parent selection methods.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::schema::Selection;

/// Pick `n` parent indices from a population with the given fitness.
pub fn select<R: Rng>(method: Selection, fitness: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if fitness.is_empty() {
        return Vec::new();
    }
    match method {
        Selection::Tournament => tournament(fitness, n, rng),
        Selection::Roulette => roulette(fitness, n, rng),
        Selection::Rank => rank(fitness, n),
    }
}

/// Binary tournaments. Winners are distinct as long as `n` does not exceed
/// the population.
pub fn tournament<R: Rng>(fitness: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let size = fitness.len();
    let distinct = n <= size;
    let mut selected = Vec::with_capacity(n);

    while selected.len() < n {
        let a = rng.gen_range(0..size);
        let b = rng.gen_range(0..size);
        let winner = if fitness[a] > fitness[b] { a } else { b };
        if distinct && selected.contains(&winner) {
            continue;
        }
        selected.push(winner);
    }
    selected
}

/// Fitness-proportionate selection after shifting the minimum to zero.
/// Falls back to uniform sampling when every weight is zero.
pub fn roulette<R: Rng>(fitness: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let min = fitness
        .iter()
        .copied()
        .filter(|f| f.is_finite())
        .fold(f64::INFINITY, f64::min);
    let weights = fitness.iter().map(|&f| {
        let w = f - min;
        if w.is_finite() && w > 0.0 { w } else { 0.0 }
    });

    match WeightedIndex::new(weights) {
        Ok(wheel) => (0..n).map(|_| wheel.sample(rng)).collect(),
        Err(_) => (0..n).map(|_| rng.gen_range(0..fitness.len())).collect(),
    }
}

/// The first `n` individuals, wrapping around when `n` exceeds the population.
pub fn rank(fitness: &[f64], n: usize) -> Vec<usize> {
    (0..n).map(|i| i % fitness.len()).collect()
}
