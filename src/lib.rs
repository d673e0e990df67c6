//! quiver: an embedded partition-trained ANN vector index.
//!
//! A [`VectorIndex`] owns an append-only dataset of fixed-dimension
//! float vectors, a trainable partitioned search structure, and its
//! storage. Operation legality is governed by a small lifecycle state
//! machine; training publishes immutable snapshots with an atomic
//! pointer swap so searches never observe a half-built index.
//!
//! # Search modes
//!
//! Small or untrained datasets are scanned exhaustively (brute force).
//! Trained datasets above the brute threshold take the partitioned
//! path: probe the `nprobe` coarse-nearest leaves, pre-rank their
//! postings by quantized score, exact-rescore the best `reorder_topk`,
//! and return the top `topk` by cosine similarity. With `nprobe` equal
//! to the leaf count and `reorder_topk` covering the dataset, the
//! partitioned path degrades gracefully into exact search.
//!
//! # Usage
//!
//! ```rust,no_run
//! use quiver::{IndexConfig, SearchParams, TrainMode, VectorIndex};
//!
//! # fn main() -> quiver::Result<()> {
//! let index = VectorIndex::initialize(Some("idx".as_ref()), IndexConfig::new(128))?;
//! index.insert(&vec![0.1; 128 * 3], &[10, 11, 12])?;
//! index.train(TrainMode::Default, 0, 0)?;
//!
//! let hits = index.query(&vec![0.1; 128], SearchParams::default())?;
//! println!("{:?}", hits[0]);
//!
//! index.persist()?;
//! index.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! One handle, many callers. At most one exclusive operation (insert
//! write phase, train, dump) runs at a time; searches and stats run
//! concurrently with each other and with any exclusive operation,
//! always against a complete snapshot.

mod backend;
mod builder;
mod config;
mod dataset;
mod error;
mod index;
mod lifecycle;
mod persistence;
mod search;
mod simd;
mod snapshot;
mod stats;
mod trainer;

pub use config::{
    BackendKind, IndexConfig, SearchParams, StorageKind, TrainMode, DEFAULT_BRUTE_THRESHOLD,
    DEFAULT_CODEBOOK_SAMPLE_RATE, DEFAULT_PARTITION_SAMPLE_RATE,
};
pub use error::{IndexError, Result};
pub use index::VectorIndex;
pub use lifecycle::LifecycleState;
pub use search::SearchHit;
pub use stats::IndexStats;
