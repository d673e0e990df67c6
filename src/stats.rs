//! Point-in-time index statistics.

use crate::lifecycle::LifecycleState;
use serde::Serialize;

/// Snapshot of the handle's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Number of vectors in the dataset.
    pub dataset_size: u64,
    /// Number of stored external ids (equals `dataset_size`).
    pub id_count: u64,
    /// Number of positions covered by the published snapshot.
    pub indexed_size: u64,
    /// Effective brute-force threshold.
    pub brute_threshold: u64,
    /// Leaf count of the current model, 0 when untrained.
    pub leaf_count: u32,
    /// Configured vector dimension.
    pub dim: u32,
    /// Whether queries currently take the exhaustive path.
    pub is_brute: bool,
    /// Reported lifecycle state (the transient op when one is active).
    pub state: LifecycleState,
}
