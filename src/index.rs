//! The index handle.
//!
//! [`VectorIndex`] is an exclusively-owned resource tying together the
//! dataset store, the lifecycle gate, the vector-math backend, the
//! published snapshot, and storage. Every public operation routes
//! through the gate first; mutating operations claim the exclusive-op
//! slot, read-only operations consult the base state only.
//!
//! Snapshot publication is a pointer swap: training builds the full
//! replacement aside and installs it under a short write lock, so a
//! concurrent search observes either generation in its entirety.

use crate::backend::{backend_for, VectorBackend};
use crate::builder;
use crate::config::{IndexConfig, SearchParams, StorageKind, TrainMode};
use crate::dataset::DatasetStore;
use crate::error::{IndexError, Result};
use crate::lifecycle::{LifecycleGate, LifecycleState};
use crate::persistence::{self, Directory, FsDirectory, MemoryDirectory};
use crate::search::{self, SearchHit};
use crate::snapshot::IndexSnapshot;
use crate::stats::IndexStats;
use crate::trainer;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info};

/// Training RNG seed. Fixed so that a given (dataset, config, nlist)
/// trains to the same model across runs and across reloads.
const TRAIN_SEED: u64 = 0x5157_5652_0001;

/// An embedded ANN index over fixed-dimension float vectors.
#[derive(Debug)]
pub struct VectorIndex {
    config: IndexConfig,
    gate: LifecycleGate,
    dataset: RwLock<DatasetStore>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    backend: Box<dyn VectorBackend>,
    storage: Mutex<Option<Box<dyn Directory>>>,
    /// Serializes insert callers against each other; insert still fails
    /// busy against an in-flight train or dump.
    writer: Mutex<()>,
    released: AtomicBool,
}

impl VectorIndex {
    /// Open a handle.
    ///
    /// With durable storage, `dir` is required and a valid persisted
    /// image found there is reloaded; a corrupt image is a data error.
    /// With memory storage, `dir` is ignored and the handle starts (and
    /// stays) in-process.
    pub fn initialize(dir: Option<&Path>, config: IndexConfig) -> Result<VectorIndex> {
        config.validate()?;
        let backend = backend_for(config.backend, config.dim);

        let storage: Box<dyn Directory> = match config.storage {
            StorageKind::Durable => {
                let dir = dir.ok_or_else(|| {
                    IndexError::Data("durable storage requires an index directory".into())
                })?;
                Box::new(FsDirectory::new(dir)?)
            }
            StorageKind::Memory => Box::new(MemoryDirectory::new()),
        };

        let (dataset, snapshot, state) = match persistence::load_image(storage.as_ref(), &config)? {
            Some(image) => {
                let snapshot = match image.model {
                    Some(model) => builder::build_prefix(
                        &image.dataset,
                        Arc::new(model),
                        backend.as_ref(),
                        image.indexed_len as usize,
                        image.extended,
                    )?,
                    None => IndexSnapshot::empty(),
                };
                let derived = derive_state(&image.dataset, &snapshot);
                if derived != image.state {
                    return Err(IndexError::Data(format!(
                        "image state {} is inconsistent with its contents ({derived})",
                        image.state
                    )));
                }
                (image.dataset, snapshot, derived)
            }
            None => (
                DatasetStore::new(config.dim),
                IndexSnapshot::empty(),
                LifecycleState::NoInit,
            ),
        };

        info!(
            dim = config.dim,
            dataset_len = dataset.len(),
            state = %state,
            "index handle initialized"
        );
        Ok(VectorIndex {
            gate: LifecycleGate::new(state),
            dataset: RwLock::new(dataset),
            snapshot: RwLock::new(Arc::new(snapshot)),
            backend,
            storage: Mutex::new(Some(storage)),
            writer: Mutex::new(()),
            config,
            released: AtomicBool::new(false),
        })
    }

    /// Append a flat batch of vectors with matching external ids.
    ///
    /// Ids are opaque to the engine: duplicates are stored verbatim and
    /// no value is reserved. Appending never touches the published
    /// snapshot; a dataset that runs ahead of the index is searchable
    /// through the brute-force tail until the next train.
    pub fn insert(&self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        self.ensure_open()?;
        let _writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Internal("writer lock poisoned".into()))?;
        let guard = self.gate.begin(
            LifecycleState::Add,
            &[
                LifecycleState::NoInit,
                LifecycleState::NoIndex,
                LifecycleState::Ready,
            ],
        )?;

        let snapshot = self.read_snapshot()?;
        let mut dataset = self
            .dataset
            .write()
            .map_err(|_| IndexError::Internal("dataset lock poisoned".into()))?;
        dataset.append_batch(vectors, ids)?;
        let len = dataset.len();
        drop(dataset);

        debug!(added = ids.len(), total = len, "insert batch appended");
        guard.finish(next_base(len, &snapshot));
        Ok(())
    }

    /// Train the partition model and (re)index the dataset.
    ///
    /// `nlist` is honored by New-mode training only; 0 selects
    /// `round(sqrt(dataset_size))`. `threads <= 0` lets the engine pick
    /// its parallelism.
    pub fn train(&self, mode: TrainMode, nlist: u32, threads: i32) -> Result<()> {
        self.ensure_open()?;
        let guard = self.gate.begin(
            LifecycleState::Train,
            &[
                LifecycleState::NoInit,
                LifecycleState::NoIndex,
                LifecycleState::Ready,
            ],
        )?;

        let dataset_guard = self.read_dataset()?;
        let dataset = &*dataset_guard;
        let n = dataset.len();
        if dataset.is_empty() {
            return Err(IndexError::Index("cannot train on an empty dataset".into()));
        }
        let prev = self.read_snapshot()?;

        // Default resolves to New on an untrained handle, Add otherwise.
        let fresh = match mode {
            TrainMode::New => true,
            TrainMode::Add => false,
            TrainMode::Default => !prev.is_trained(),
        };

        let backend = self.backend.as_ref();
        let new_snapshot = if fresh {
            if prev.extended {
                return Err(IndexError::PermissionDenied(
                    "fresh training would discard an incrementally extended index; \
                     use Add mode or a new handle"
                        .into(),
                ));
            }
            let nlist = if nlist == 0 {
                trainer::default_nlist(n)
            } else {
                nlist as usize
            };
            if n < nlist {
                return Err(IndexError::Index(format!(
                    "dataset of {n} vectors cannot support {nlist} leaves"
                )));
            }
            let config = &self.config;
            trainer::run_with_threads(threads, move || {
                let model = trainer::train_new(dataset, backend, config, nlist, TRAIN_SEED)?;
                builder::build_full(dataset, model, backend)
            })?
        } else {
            if !prev.is_trained() {
                return Err(IndexError::PermissionDenied(
                    "Add-mode training requires an existing model".into(),
                ));
            }
            let prev_ref = &*prev;
            trainer::run_with_threads(threads, move || builder::extend(dataset, prev_ref, backend))
                .map_err(|_| IndexError::Reindex {
                    indexed: prev.indexed_len,
                    dataset: n as u64,
                })?
        };

        let indexed = new_snapshot.indexed_len;
        *self
            .snapshot
            .write()
            .map_err(|_| IndexError::Internal("snapshot lock poisoned".into()))? =
            Arc::new(new_snapshot);

        info!(fresh, indexed, total = n, "trained and published new snapshot");
        let next = if indexed == n as u64 && n > 0 {
            LifecycleState::Ready
        } else {
            LifecycleState::NoIndex
        };
        guard.finish(next);
        Ok(())
    }

    /// Run a batch of top-k queries.
    ///
    /// `queries` is a flat buffer of `count * dim` floats; results are
    /// returned per query in input order. Fewer than `topk` hits is
    /// valid when the candidate pool is smaller.
    pub fn query(&self, queries: &[f32], params: SearchParams) -> Result<Vec<Vec<SearchHit>>> {
        self.ensure_open()?;
        let base = self.gate.base();
        if !matches!(base, LifecycleState::NoIndex | LifecycleState::Ready) {
            return Err(IndexError::NotReady(self.gate.reported()));
        }
        params.validate()?;
        let dim = self.config.dim;
        if queries.is_empty() {
            return Err(IndexError::Data("empty query batch".into()));
        }
        if queries.len() % dim != 0 {
            return Err(IndexError::Data(format!(
                "query batch length {} is not a multiple of dimension {dim}",
                queries.len()
            )));
        }

        let dataset = self.read_dataset()?;
        let snapshot = self.read_snapshot()?;
        let brute = is_brute(&dataset, &snapshot, &self.config);

        let mut results = Vec::with_capacity(queries.len() / dim);
        for q in queries.chunks_exact(dim) {
            let hits = if brute {
                search::brute_search(&dataset, q, self.backend.as_ref(), params.topk as usize)
            } else {
                search::partitioned_search(&dataset, &snapshot, q, self.backend.as_ref(), &params)?
            };
            results.push(hits);
        }
        Ok(results)
    }

    /// Serialize a consistent point-in-time copy to storage.
    ///
    /// Blocks train/add/dump, not search. With memory storage this is a
    /// pure in-memory snapshot that dies with the handle.
    pub fn persist(&self) -> Result<()> {
        self.ensure_open()?;
        let guard = self.gate.begin(
            LifecycleState::Dump,
            &[LifecycleState::NoIndex, LifecycleState::Ready],
        )?;
        let base = self.gate.base();

        let dataset = self.read_dataset()?;
        let snapshot = self.read_snapshot()?;
        let storage = self
            .storage
            .lock()
            .map_err(|_| IndexError::Internal("storage lock poisoned".into()))?;
        let dir = storage
            .as_ref()
            .ok_or_else(|| IndexError::Internal("storage already released".into()))?;
        persistence::save_image(dir.as_ref(), &self.config, base, &dataset, &snapshot)?;

        guard.finish(base);
        Ok(())
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> Result<IndexStats> {
        self.ensure_open()?;
        let dataset = self.read_dataset()?;
        let snapshot = self.read_snapshot()?;
        Ok(IndexStats {
            dataset_size: dataset.len() as u64,
            id_count: dataset.ids().len() as u64,
            indexed_size: snapshot.indexed_len,
            brute_threshold: self.config.effective_brute_threshold(),
            leaf_count: snapshot.nlist() as u32,
            dim: self.config.dim as u32,
            is_brute: is_brute(&dataset, &snapshot, &self.config),
            state: self.gate.reported(),
        })
    }

    /// Release the handle's owned resources exactly once.
    ///
    /// Never persists implicitly. Further operations, including a second
    /// `close`, fail with [`IndexError::Released`] rather than silently
    /// succeeding.
    pub fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(IndexError::Released);
        }
        if let Ok(mut storage) = self.storage.lock() {
            *storage = None;
        }
        if let Ok(mut dataset) = self.dataset.write() {
            *dataset = DatasetStore::new(self.config.dim);
        }
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = Arc::new(IndexSnapshot::empty());
        }
        info!("index handle released");
        Ok(())
    }

    /// The configuration this handle was opened with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(IndexError::Released);
        }
        Ok(())
    }

    fn read_dataset(&self) -> Result<RwLockReadGuard<'_, DatasetStore>> {
        self.dataset
            .read()
            .map_err(|_| IndexError::Internal("dataset lock poisoned".into()))
    }

    fn read_snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        Ok(self
            .snapshot
            .read()
            .map_err(|_| IndexError::Internal("snapshot lock poisoned".into()))?
            .clone())
    }
}

fn next_base(dataset_len: usize, snapshot: &IndexSnapshot) -> LifecycleState {
    if dataset_len == 0 {
        LifecycleState::NoInit
    } else if snapshot.is_trained() && snapshot.indexed_len == dataset_len as u64 {
        LifecycleState::Ready
    } else {
        LifecycleState::NoIndex
    }
}

fn derive_state(dataset: &DatasetStore, snapshot: &IndexSnapshot) -> LifecycleState {
    next_base(dataset.len(), snapshot)
}

fn is_brute(dataset: &DatasetStore, snapshot: &IndexSnapshot, config: &IndexConfig) -> bool {
    !snapshot.is_trained() || dataset.len() as u64 <= config.effective_brute_threshold()
}
