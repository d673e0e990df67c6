//! Immutable index snapshots.
//!
//! A snapshot pairs the partition model with everything derived from it:
//! per-leaf posting lists, per-position reorder codes and norms, and the
//! indexed high-water mark. Snapshots are never edited; training builds a
//! full replacement off to the side and publishes it with a single
//! pointer swap, so readers observe either generation in its entirety.

use crate::backend::Codebook;
use std::sync::Arc;

/// Leaf centroids plus the optional reordering codebook.
#[derive(Debug)]
pub(crate) struct PartitionModel {
    pub(crate) centroids: Vec<Vec<f32>>,
    pub(crate) codebook: Option<Codebook>,
}

impl PartitionModel {
    pub(crate) fn nlist(&self) -> usize {
        self.centroids.len()
    }
}

/// One generation of the searchable structure.
#[derive(Debug)]
pub(crate) struct IndexSnapshot {
    /// Model that produced this snapshot; `None` until the first
    /// successful training.
    pub(crate) model: Option<Arc<PartitionModel>>,
    /// Dataset positions per leaf, in insertion order.
    pub(crate) postings: Vec<Vec<u64>>,
    /// Reorder codes per indexed position, stride = codebook books.
    /// Empty when the model carries no codebook.
    pub(crate) codes: Vec<u8>,
    /// L2 norm per indexed position.
    pub(crate) norms: Vec<f32>,
    /// Positions `0..indexed_len` are covered by `postings`.
    pub(crate) indexed_len: u64,
    /// Whether Add-mode training has extended this structure.
    pub(crate) extended: bool,
}

impl IndexSnapshot {
    /// Snapshot of an untrained handle.
    pub(crate) fn empty() -> Self {
        Self {
            model: None,
            postings: Vec::new(),
            codes: Vec::new(),
            norms: Vec::new(),
            indexed_len: 0,
            extended: false,
        }
    }

    pub(crate) fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub(crate) fn nlist(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.nlist())
    }
}
