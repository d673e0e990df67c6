//! Incremental index builder.
//!
//! Assigns every dataset position beyond the current indexed high-water
//! mark to its nearest leaf and appends it to that leaf's posting list,
//! producing a full replacement snapshot. The replacement only becomes
//! visible once the entire batch has succeeded; a failure leaves the
//! prior snapshot published and the dataset ahead of the index.

use crate::backend::codebook::CodeStrip;
use crate::backend::VectorBackend;
use crate::dataset::DatasetStore;
use crate::error::{IndexError, Result};
use crate::simd;
use crate::snapshot::{IndexSnapshot, PartitionModel};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Build a snapshot covering the whole dataset from a freshly trained
/// model.
pub(crate) fn build_full(
    dataset: &DatasetStore,
    model: Arc<PartitionModel>,
    backend: &dyn VectorBackend,
) -> Result<IndexSnapshot> {
    build_prefix(dataset, model, backend, dataset.len(), false)
}

/// Build a snapshot covering positions `0..end` only. Used on reload,
/// where the persisted high-water mark may trail the dataset.
pub(crate) fn build_prefix(
    dataset: &DatasetStore,
    model: Arc<PartitionModel>,
    backend: &dyn VectorBackend,
    end: usize,
    extended: bool,
) -> Result<IndexSnapshot> {
    let mut snapshot = IndexSnapshot {
        postings: vec![Vec::new(); model.nlist()],
        model: Some(model),
        codes: Vec::new(),
        norms: Vec::new(),
        indexed_len: 0,
        extended,
    };
    index_range(dataset, &mut snapshot, backend, end)?;
    Ok(snapshot)
}

/// Build a replacement snapshot that extends `prev` over the unindexed
/// dataset tail, reusing its model.
pub(crate) fn extend(
    dataset: &DatasetStore,
    prev: &IndexSnapshot,
    backend: &dyn VectorBackend,
) -> Result<IndexSnapshot> {
    let model = prev
        .model
        .clone()
        .ok_or_else(|| IndexError::Internal("extend called without a trained model".into()))?;
    let mut snapshot = IndexSnapshot {
        model: Some(model),
        postings: prev.postings.clone(),
        codes: prev.codes.clone(),
        norms: prev.norms.clone(),
        indexed_len: prev.indexed_len,
        extended: true,
    };
    index_range(dataset, &mut snapshot, backend, dataset.len())?;
    Ok(snapshot)
}

/// Assign positions `snapshot.indexed_len .. end` into the snapshot.
fn index_range(
    dataset: &DatasetStore,
    snapshot: &mut IndexSnapshot,
    backend: &dyn VectorBackend,
    end: usize,
) -> Result<()> {
    let model = snapshot
        .model
        .as_ref()
        .ok_or_else(|| IndexError::Internal("indexing without a trained model".into()))?
        .clone();
    let start = snapshot.indexed_len as usize;
    let end = end.min(dataset.len());
    if start >= end {
        snapshot.indexed_len = end as u64;
        return Ok(());
    }

    let stride = model.codebook.as_ref().map_or(0, |cb| cb.num_books());
    let assigned: Vec<(usize, CodeStrip, f32)> = (start..end)
        .into_par_iter()
        .map(|pos| {
            let v = dataset.vector(pos);
            let leaf = backend.assign(v, &model.centroids);
            let norm = simd::norm(v);
            let codes = match model.codebook.as_ref() {
                Some(cb) => {
                    let centroid = &model.centroids[leaf];
                    let residual: Vec<f32> =
                        v.iter().zip(centroid.iter()).map(|(x, c)| x - c).collect();
                    cb.encode(&residual)
                }
                None => CodeStrip::new(),
            };
            (leaf, codes, norm)
        })
        .collect();

    snapshot
        .codes
        .try_reserve(assigned.len() * stride)
        .map_err(|e| IndexError::Allocation(e.to_string()))?;
    snapshot
        .norms
        .try_reserve(assigned.len())
        .map_err(|e| IndexError::Allocation(e.to_string()))?;

    for (offset, (leaf, codes, norm)) in assigned.into_iter().enumerate() {
        let pos = (start + offset) as u64;
        snapshot.postings[leaf].push(pos);
        snapshot.codes.extend_from_slice(&codes);
        snapshot.norms.push(norm);
    }
    snapshot.indexed_len = end as u64;

    debug!(
        indexed = end - start,
        total = end,
        leaves = snapshot.nlist(),
        "indexed dataset tail"
    );
    Ok(())
}
