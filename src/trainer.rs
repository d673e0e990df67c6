//! Partition-model training.
//!
//! Draws rate-sized random samples of the dataset, trains the leaf
//! centroids through the backend's clustering primitive, then trains the
//! optional reordering codebook on sampled residuals. Sampling is seeded
//! so a fixed (dataset, config, nlist) trains reproducibly.

use crate::backend::VectorBackend;
use crate::config::IndexConfig;
use crate::dataset::DatasetStore;
use crate::error::{IndexError, Result};
use crate::snapshot::PartitionModel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info};

/// Default leaf count for a dataset of `n` vectors.
pub(crate) fn default_nlist(n: usize) -> usize {
    ((n as f64).sqrt().round() as usize).max(1)
}

/// Train a fresh partition model.
///
/// The caller has already validated that the dataset is non-empty and at
/// least `nlist` vectors long.
pub(crate) fn train_new(
    dataset: &DatasetStore,
    backend: &dyn VectorBackend,
    config: &IndexConfig,
    nlist: usize,
    seed: u64,
) -> Result<Arc<PartitionModel>> {
    let n = dataset.len();
    let dim = dataset.dim();
    let mut rng = StdRng::seed_from_u64(seed);

    let sample_n = sample_size(n, config.partition_sample_rate, nlist);
    if sample_n < nlist {
        return Err(IndexError::Index(format!(
            "partition sample of {sample_n} vectors cannot support {nlist} leaves"
        )));
    }
    let sample = gather(dataset, sample_positions(&mut rng, n, sample_n), dim);
    debug!(sample_n, nlist, "training partition centroids");
    let centroids = backend.train_partitions(&sample, sample_n, nlist, seed)?;

    let residual_n = sample_size(n, config.codebook_sample_rate, 1);
    let positions = sample_positions(&mut rng, n, residual_n);
    let mut residuals = Vec::with_capacity(residual_n * dim);
    for &pos in &positions {
        let v = dataset.vector(pos);
        let leaf = backend.assign(v, &centroids);
        let centroid = &centroids[leaf];
        residuals.extend(v.iter().zip(centroid.iter()).map(|(x, c)| x - c));
    }
    let codebook = backend.train_codebook(&residuals, residual_n, seed.wrapping_add(1))?;

    info!(
        nlist,
        sample_n,
        residual_n,
        codebook = codebook.is_some(),
        "partition model trained"
    );
    Ok(Arc::new(PartitionModel {
        centroids,
        codebook,
    }))
}

/// `ceil(rate * n)` clamped to `[floor, n]`.
fn sample_size(n: usize, rate: f32, floor: usize) -> usize {
    let raw = (rate as f64 * n as f64).ceil() as usize;
    raw.max(floor).min(n)
}

fn sample_positions(rng: &mut StdRng, n: usize, amount: usize) -> Vec<usize> {
    let mut positions: Vec<usize> = rand::seq::index::sample(rng, n, amount).into_iter().collect();
    positions.sort_unstable();
    positions
}

fn gather(dataset: &DatasetStore, positions: Vec<usize>, dim: usize) -> Vec<f32> {
    let mut flat = Vec::with_capacity(positions.len() * dim);
    for pos in positions {
        flat.extend_from_slice(dataset.vector(pos));
    }
    flat
}

/// Run `f` with the requested parallelism: a dedicated pool of `threads`
/// workers when positive, the engine-chosen default otherwise.
pub(crate) fn run_with_threads<T: Send>(
    threads: i32,
    f: impl FnOnce() -> Result<T> + Send,
) -> Result<T> {
    if threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .build()
            .map_err(|e| IndexError::Internal(format!("thread pool: {e}")))?;
        pool.install(f)
    } else {
        f()
    }
}
