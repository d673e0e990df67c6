//! Pluggable vector-math backend.
//!
//! The index engine never computes distances itself; everything numeric
//! goes through [`VectorBackend`]: partition training, leaf assignment,
//! coarse query scoring, and exact rescoring. Concrete variants are
//! selected once at construction via [`BackendKind`]; there is no
//! runtime type inspection on the hot path.

pub(crate) mod codebook;
pub(crate) mod kmeans;

pub use codebook::Codebook;

use crate::config::BackendKind;
use crate::error::Result;
use crate::simd;
use kmeans::KMeans;
use std::fmt;

/// Capability set required from a vector-math engine.
pub(crate) trait VectorBackend: Send + Sync + fmt::Debug {
    /// Train `nlist` leaf centroids over a flat sample of `n` vectors.
    fn train_partitions(
        &self,
        sample: &[f32],
        n: usize,
        nlist: usize,
        seed: u64,
    ) -> Result<Vec<Vec<f32>>>;

    /// Train the reordering codebook over a flat sample of `n` residuals,
    /// or `None` when this backend does not carry one.
    fn train_codebook(&self, residuals: &[f32], n: usize, seed: u64) -> Result<Option<Codebook>>;

    /// Leaf whose centroid is coarse-nearest to `vector`.
    fn assign(&self, vector: &[f32], centroids: &[Vec<f32>]) -> usize;

    /// Coarse similarity of `query` to every centroid (higher is closer).
    fn coarse_scores(&self, query: &[f32], centroids: &[Vec<f32>]) -> Vec<f32>;

    /// Exact similarity score (higher is closer).
    fn exact_score(&self, query: &[f32], vector: &[f32]) -> f32;
}

/// Construct the backend for a configured kind.
pub(crate) fn backend_for(kind: BackendKind, dim: usize) -> Box<dyn VectorBackend> {
    match kind {
        BackendKind::Anisotropic => Box::new(AnisotropicBackend { dim }),
        BackendKind::Coarse => Box::new(CoarseBackend { dim }),
    }
}

fn fit_partitions(
    dim: usize,
    sample: &[f32],
    n: usize,
    nlist: usize,
    seed: u64,
) -> Result<Vec<Vec<f32>>> {
    let mut km = KMeans::new(dim, nlist, seed)?;
    km.fit(sample, n)?;
    Ok(km.into_centroids())
}

/// Partition backend with a residual reordering codebook.
#[derive(Debug)]
struct AnisotropicBackend {
    dim: usize,
}

impl VectorBackend for AnisotropicBackend {
    fn train_partitions(
        &self,
        sample: &[f32],
        n: usize,
        nlist: usize,
        seed: u64,
    ) -> Result<Vec<Vec<f32>>> {
        fit_partitions(self.dim, sample, n, nlist, seed)
    }

    fn train_codebook(&self, residuals: &[f32], n: usize, seed: u64) -> Result<Option<Codebook>> {
        // A codebook over a handful of residuals adds noise, not order;
        // fall back to coarse pre-ranking below this.
        if n < 4 {
            return Ok(None);
        }
        Codebook::train(residuals, n, self.dim, seed).map(Some)
    }

    fn assign(&self, vector: &[f32], centroids: &[Vec<f32>]) -> usize {
        kmeans::nearest_centroid(vector, centroids)
    }

    fn coarse_scores(&self, query: &[f32], centroids: &[Vec<f32>]) -> Vec<f32> {
        centroids.iter().map(|c| simd::cosine(query, c)).collect()
    }

    fn exact_score(&self, query: &[f32], vector: &[f32]) -> f32 {
        simd::cosine(query, vector)
    }
}

/// Partition backend without a codebook; candidates inherit their leaf's
/// coarse score until exact rescoring.
#[derive(Debug)]
struct CoarseBackend {
    dim: usize,
}

impl VectorBackend for CoarseBackend {
    fn train_partitions(
        &self,
        sample: &[f32],
        n: usize,
        nlist: usize,
        seed: u64,
    ) -> Result<Vec<Vec<f32>>> {
        fit_partitions(self.dim, sample, n, nlist, seed)
    }

    fn train_codebook(&self, _residuals: &[f32], _n: usize, _seed: u64) -> Result<Option<Codebook>> {
        Ok(None)
    }

    fn assign(&self, vector: &[f32], centroids: &[Vec<f32>]) -> usize {
        kmeans::nearest_centroid(vector, centroids)
    }

    fn coarse_scores(&self, query: &[f32], centroids: &[Vec<f32>]) -> Vec<f32> {
        centroids.iter().map(|c| simd::cosine(query, c)).collect()
    }

    fn exact_score(&self, query: &[f32], vector: &[f32]) -> f32 {
        simd::cosine(query, vector)
    }
}
