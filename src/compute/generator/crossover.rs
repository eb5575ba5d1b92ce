//! Crossover operators over parent rows.

use rand::Rng;

use crate::schema::Crossover;

/// Gene types crossover can average.
pub trait Blend: Copy {
    fn mean(values: &[Self]) -> Self;
}

impl Blend for f64 {
    fn mean(values: &[Self]) -> Self {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Blend for i64 {
    fn mean(values: &[Self]) -> Self {
        (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64).round() as i64
    }
}

impl Blend for bool {
    /// Majority vote; ties go to the first parent.
    fn mean(values: &[Self]) -> Self {
        let ones = values.iter().filter(|v| **v).count();
        let zeros = values.len() - ones;
        match ones.cmp(&zeros) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => values[0],
        }
    }
}

/// Build one child row from `parents` (all the same width).
pub fn cross<T: Blend, R: Rng>(method: Crossover, parents: &[&[T]], rng: &mut R) -> Vec<T> {
    match method {
        Crossover::OnePoint => n_point(parents, 1, rng),
        Crossover::NPoint { points } => n_point(parents, points, rng),
        Crossover::Mean => mean(parents),
    }
}

/// Copy segments between sorted random cut points, switching to the next
/// parent at each cut. The tail comes from whichever parent is current.
pub fn n_point<T: Copy, R: Rng>(parents: &[&[T]], points: usize, rng: &mut R) -> Vec<T> {
    let width = parents[0].len();
    let mut cuts: Vec<usize> = (0..points).map(|_| rng.gen_range(0..width)).collect();
    cuts.sort_unstable();

    let mut child = Vec::with_capacity(width);
    let mut parent = 0;
    for cut in cuts.into_iter().chain(std::iter::once(width)) {
        let start = child.len();
        if cut > start {
            child.extend_from_slice(&parents[parent % parents.len()][start..cut]);
        }
        parent += 1;
    }
    child
}

/// Gene-wise mean of all parents.
pub fn mean<T: Blend>(parents: &[&[T]]) -> Vec<T> {
    let width = parents[0].len();
    let mut column = Vec::with_capacity(parents.len());
    (0..width)
        .map(|j| {
            column.clear();
            column.extend(parents.iter().map(|p| p[j]));
            T::mean(&column)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_one_point_prefix_suffix() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = [0.0; 6];
        let b = [1.0; 6];
        for _ in 0..20 {
            let child = cross(Crossover::OnePoint, &[&a, &b], &mut rng);
            assert_eq!(child.len(), 6);
            // Zeros first, then ones.
            let switch = child.iter().position(|&g| g == 1.0).unwrap_or(6);
            assert!(child[switch..].iter().all(|&g| g == 1.0));
        }
    }

    #[test]
    fn test_n_point_keeps_width() {
        let mut rng = StdRng::seed_from_u64(2);
        let a = [0i64; 10];
        let b = [1i64; 10];
        let c = [2i64; 10];
        for points in 1..6 {
            let child = n_point(&[&a, &b, &c], points, &mut rng);
            assert_eq!(child.len(), 10);
            assert!(child.iter().all(|g| (0..=2).contains(g)));
        }
    }

    #[test]
    fn test_single_parent_is_copied() {
        let mut rng = StdRng::seed_from_u64(4);
        let a = [true, false, true];
        assert_eq!(n_point(&[&a], 2, &mut rng), a.to_vec());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[&[1.0, 2.0][..], &[3.0, 6.0][..]]), vec![2.0, 4.0]);
        assert_eq!(mean(&[&[1i64, 2][..], &[2, 2][..]]), vec![2, 2]);
        assert_eq!(
            mean(&[&[true, true][..], &[false, true][..], &[false, false][..]]),
            vec![false, true]
        );
        assert_eq!(mean(&[&[true][..], &[false][..]]), vec![true]);
    }
}
