//! Index configuration and operation parameters.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};

/// Brute-force threshold applied when the config leaves it at 0.
pub const DEFAULT_BRUTE_THRESHOLD: u64 = 4096;

/// Default fraction of the dataset sampled for partition training.
pub const DEFAULT_PARTITION_SAMPLE_RATE: f32 = 0.2;

/// Default fraction of the dataset sampled for codebook training.
pub const DEFAULT_CODEBOOK_SAMPLE_RATE: f32 = 0.1;

/// Vector-math backend variant, selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// k-means partitions plus a residual reordering codebook. Candidates
    /// are pre-ranked by quantized scores before exact rescoring.
    Anisotropic,
    /// k-means partitions only. Candidates are pre-ranked by their leaf's
    /// coarse score; exact rescoring does the rest.
    Coarse,
}

/// Where the index image lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Filesystem directory; `persist` writes a reloadable image.
    Durable,
    /// In-process only; `persist` snapshots to memory and release
    /// discards everything irrecoverably.
    Memory,
}

/// Training mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainMode {
    /// New when no model exists yet, otherwise Add.
    Default,
    /// Build a fresh partition model from scratch. Refused over a model
    /// that Add-mode training has already extended.
    New,
    /// Extend the existing model with the unindexed dataset tail.
    Add,
}

/// Configuration fixed for the lifetime of an index handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimension. Every inserted vector and query must match.
    pub dim: usize,
    /// Backend variant.
    pub backend: BackendKind,
    /// Datasets at or below this size are always searched exhaustively.
    /// 0 selects [`DEFAULT_BRUTE_THRESHOLD`].
    pub brute_threshold: u64,
    /// Fraction of the dataset sampled when training partitions.
    pub partition_sample_rate: f32,
    /// Fraction of the dataset sampled when training the reordering
    /// codebook.
    pub codebook_sample_rate: f32,
    /// Storage kind.
    pub storage: StorageKind,
}

impl IndexConfig {
    /// Config with defaults for the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            backend: BackendKind::Anisotropic,
            brute_threshold: DEFAULT_BRUTE_THRESHOLD,
            partition_sample_rate: DEFAULT_PARTITION_SAMPLE_RATE,
            codebook_sample_rate: DEFAULT_CODEBOOK_SAMPLE_RATE,
            storage: StorageKind::Durable,
        }
    }

    /// Effective brute-force threshold (0 maps to the default).
    pub fn effective_brute_threshold(&self) -> u64 {
        if self.brute_threshold == 0 {
            DEFAULT_BRUTE_THRESHOLD
        } else {
            self.brute_threshold
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(IndexError::Data("dimension must be greater than 0".into()));
        }
        for (name, rate) in [
            ("partition_sample_rate", self.partition_sample_rate),
            ("codebook_sample_rate", self.codebook_sample_rate),
        ] {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(IndexError::Data(format!(
                    "{name} must be in (0, 1], got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Per-query search parameters.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Number of results returned per query.
    pub topk: u32,
    /// Candidate-set size exactly rescored before truncation to `topk`.
    /// Must be at least `topk`.
    pub reorder_topk: u32,
    /// Number of partition leaves probed per query; clamped to the leaf
    /// count of the current snapshot.
    pub nprobe: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            topk: 10,
            reorder_topk: 100,
            nprobe: 10,
        }
    }
}

impl SearchParams {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.topk == 0 {
            return Err(IndexError::Data("topk must be greater than 0".into()));
        }
        if self.reorder_topk < self.topk {
            return Err(IndexError::Data(format!(
                "reorder_topk ({}) must be at least topk ({})",
                self.reorder_topk, self.topk
            )));
        }
        if self.nprobe == 0 {
            return Err(IndexError::Data("nprobe must be greater than 0".into()));
        }
        Ok(())
    }
}
