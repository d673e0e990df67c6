//! k-means clustering for partition training.
//!
//! Uses k-means++ initialization with a caller-supplied seed, so repeated
//! fits over the same inputs produce identical centroids. Distances are
//! squared L2 over the raw vectors.

use crate::error::{IndexError, Result};
use crate::simd;
use rayon::prelude::*;

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_EPSILON: f32 = 1e-6;

#[derive(Debug)]
pub(crate) struct KMeans {
    centroids: Vec<Vec<f32>>,
    dim: usize,
    k: usize,
    seed: u64,
}

impl KMeans {
    pub(crate) fn new(dim: usize, k: usize, seed: u64) -> Result<Self> {
        if dim == 0 || k == 0 {
            return Err(IndexError::Index(
                "k-means requires dim > 0 and k > 0".into(),
            ));
        }
        Ok(Self {
            centroids: Vec::new(),
            dim,
            k,
            seed,
        })
    }

    /// Fit centroids over `n` vectors stored flat with stride `dim`.
    pub(crate) fn fit(&mut self, vectors: &[f32], n: usize) -> Result<()> {
        if n == 0 || vectors.len() < n * self.dim {
            return Err(IndexError::Index(format!(
                "k-means sample too small: {} floats for {} vectors at dim {}",
                vectors.len(),
                n,
                self.dim
            )));
        }
        if n < self.k {
            return Err(IndexError::Index(format!(
                "k-means sample of {} vectors cannot support {} clusters",
                n, self.k
            )));
        }

        self.centroids = self.init_plus_plus(vectors, n);

        for _ in 0..MAX_ITERATIONS {
            let assignments = self.assign_all(vectors, n);
            let new_centroids = self.update_centroids(vectors, n, &assignments);

            let moved = self
                .centroids
                .iter()
                .zip(new_centroids.iter())
                .any(|(old, new)| simd::l2_distance_squared(old, new) > CONVERGENCE_EPSILON);

            self.centroids = new_centroids;
            if !moved {
                break;
            }
        }

        Ok(())
    }

    /// k-means++ seeding: first centroid uniform, the rest sampled
    /// proportionally to squared distance from the nearest chosen one.
    fn init_plus_plus(&self, vectors: &[f32], n: usize) -> Vec<Vec<f32>> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(self.k);

        let first = rng.random_range(0..n);
        centroids.push(self.get(vectors, first).to_vec());

        while centroids.len() < self.k {
            let distances: Vec<f32> = (0..n)
                .map(|i| {
                    let v = self.get(vectors, i);
                    centroids
                        .iter()
                        .map(|c| simd::l2_distance_squared(v, c))
                        .fold(f32::INFINITY, f32::min)
                })
                .collect();
            let total: f64 = distances.iter().map(|&d| d as f64).sum();

            let picked = if total > 0.0 {
                let threshold = rng.random::<f64>() * total;
                let mut cumulative = 0.0;
                let mut chosen = n - 1;
                for (i, &d) in distances.iter().enumerate() {
                    cumulative += d as f64;
                    if cumulative >= threshold {
                        chosen = i;
                        break;
                    }
                }
                chosen
            } else {
                // Degenerate sample (all points coincide with a centroid).
                rng.random_range(0..n)
            };
            centroids.push(self.get(vectors, picked).to_vec());
        }

        centroids
    }

    /// Assign every vector to its nearest centroid.
    pub(crate) fn assign_all(&self, vectors: &[f32], n: usize) -> Vec<usize> {
        vectors[..n * self.dim]
            .par_chunks_exact(self.dim)
            .map(|v| nearest_centroid(v, &self.centroids))
            .collect()
    }

    fn update_centroids(&self, vectors: &[f32], n: usize, assignments: &[usize]) -> Vec<Vec<f32>> {
        let mut sums = vec![vec![0.0f32; self.dim]; self.k];
        let mut counts = vec![0usize; self.k];

        for (i, &cluster) in assignments.iter().enumerate().take(n) {
            counts[cluster] += 1;
            for (j, &val) in self.get(vectors, i).iter().enumerate() {
                sums[cluster][j] += val;
            }
        }

        sums.into_iter()
            .zip(counts)
            .enumerate()
            .map(|(idx, (sum, count))| {
                if count > 0 {
                    sum.iter().map(|&s| s / count as f32).collect()
                } else {
                    // Empty cluster: keep the previous centroid.
                    self.centroids[idx].clone()
                }
            })
            .collect()
    }

    fn get<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dim;
        &vectors[start..start + self.dim]
    }

    pub(crate) fn into_centroids(self) -> Vec<Vec<f32>> {
        self.centroids
    }
}

/// Index of the centroid nearest to `v` (squared L2, ties to the lowest
/// index).
pub(crate) fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (idx, c) in centroids.iter().enumerate() {
        let dist = simd::l2_distance_squared(v, c);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn two_obvious_clusters() {
        let mut vectors = Vec::new();
        for i in 0..8 {
            vectors.extend_from_slice(&[i as f32 * 0.01, 0.0]);
        }
        for i in 0..8 {
            vectors.extend_from_slice(&[10.0 + i as f32 * 0.01, 0.0]);
        }
        let mut km = KMeans::new(2, 2, 42).expect("construct");
        km.fit(&vectors, 16).expect("fit");
        let assignments = km.assign_all(&vectors, 16);
        assert_eq!(assignments[0], assignments[7]);
        assert_eq!(assignments[8], assignments[15]);
        assert_ne!(assignments[0], assignments[8]);
    }

    #[test]
    fn more_clusters_than_points_rejected() {
        let mut km = KMeans::new(2, 4, 7).expect("construct");
        let err = km.fit(&[0.0, 0.0, 1.0, 1.0], 2).unwrap_err();
        assert!(matches!(err, IndexError::Index(_)));
    }

    #[test]
    fn identical_points_do_not_hang() {
        let vectors: Vec<f32> = std::iter::repeat(1.0).take(10 * 3).collect();
        let mut km = KMeans::new(3, 2, 1).expect("construct");
        km.fit(&vectors, 10).expect("degenerate fit should succeed");
        let assignments = km.assign_all(&vectors, 10);
        assert_eq!(assignments.len(), 10);
    }

    proptest! {
        #[test]
        fn fit_is_deterministic_given_seed(
            seed in any::<u64>(),
            dim in 1usize..8,
            n in 2usize..32,
            k in 1usize..8,
            raw in proptest::collection::vec(-1.0f32..1.0f32, 2usize..(32 * 8)),
        ) {
            prop_assume!(k <= n);
            prop_assume!(raw.len() >= n * dim);
            let vectors = &raw[..n * dim];

            let mut km1 = KMeans::new(dim, k, seed).unwrap();
            let mut km2 = KMeans::new(dim, k, seed).unwrap();
            km1.fit(vectors, n).unwrap();
            km2.fit(vectors, n).unwrap();

            prop_assert_eq!(km1.assign_all(vectors, n), km2.assign_all(vectors, n));
        }
    }
}
