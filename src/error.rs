//! Error types for quiver.

use crate::lifecycle::LifecycleState;
use thiserror::Error;

/// Errors that can occur during index operations.
///
/// Every public operation returns one of these kinds; there are no
/// out-of-band status codes and no panics on the non-test path.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Generic internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// The operation is illegal for the current lifecycle state, or the
    /// handle is busy with an exclusive operation.
    #[error("not ready: index is {0}")]
    NotReady(LifecycleState),

    /// Memory reservation failed.
    #[error("allocation failure: {0}")]
    Allocation(String),

    /// The operation is disallowed for the current state/config
    /// combination (e.g. a fresh retrain over an incrementally extended
    /// model).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed input or corrupt persisted data.
    #[error("data error: {0}")]
    Data(String),

    /// Training failed at the backend level (empty, undersized, or
    /// degenerate sample).
    #[error("index error: {0}")]
    Index(String),

    /// The dataset was appended but incremental indexing failed, leaving
    /// the dataset ahead of the index. The caller may retrigger
    /// reindexing; neither the dataset nor the published snapshot is torn.
    #[error("reindex failure: {indexed} of {dataset} positions indexed")]
    Reindex { indexed: u64, dataset: u64 },

    /// Operation on a released handle.
    #[error("index handle has been released")]
    Released,

    /// I/O error from durable storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
