//! Persistence manager.
//!
//! Dumps serialize a consistent point-in-time copy of the dataset, the
//! trained model, and the lifecycle metadata into a [`Directory`];
//! initialization validates and reloads that image into an equivalent
//! in-memory state. The manifest is written last, so a partially written
//! image is never taken for a committed one.

pub(crate) mod directory;
pub(crate) mod format;

pub(crate) use directory::{Directory, FsDirectory, MemoryDirectory};

use crate::config::IndexConfig;
use crate::dataset::DatasetStore;
use crate::error::{IndexError, Result};
use crate::lifecycle::LifecycleState;
use crate::snapshot::{IndexSnapshot, PartitionModel};
use format::{Manifest, DATASET_FILE, FORMAT_VERSION, MANIFEST_FILE, MODEL_FILE};
use tracing::info;

/// Write a complete image of the current state.
pub(crate) fn save_image(
    dir: &dyn Directory,
    config: &IndexConfig,
    state: LifecycleState,
    dataset: &DatasetStore,
    snapshot: &IndexSnapshot,
) -> Result<()> {
    let (dataset_bytes, dataset_crc) = format::encode_dataset(dataset);
    dir.atomic_write(DATASET_FILE, &dataset_bytes)?;

    let model_crc = match snapshot.model.as_deref() {
        Some(model) => {
            let (model_bytes, crc) = format::encode_model(model, config.dim);
            dir.atomic_write(MODEL_FILE, &model_bytes)?;
            Some(crc)
        }
        None => None,
    };

    let manifest = Manifest {
        version: FORMAT_VERSION,
        dim: config.dim as u32,
        backend: config.backend,
        brute_threshold: config.effective_brute_threshold(),
        partition_sample_rate: config.partition_sample_rate,
        codebook_sample_rate: config.codebook_sample_rate,
        state,
        dataset_len: dataset.len() as u64,
        id_count: dataset.len() as u64,
        indexed_len: snapshot.indexed_len,
        leaf_count: snapshot.nlist() as u32,
        extended: snapshot.extended,
        dataset_crc,
        model_crc,
    };
    dir.atomic_write(MANIFEST_FILE, &manifest.to_json()?)?;

    info!(
        dataset_len = dataset.len(),
        indexed_len = snapshot.indexed_len,
        trained = snapshot.is_trained(),
        "index image committed"
    );
    Ok(())
}

/// A validated, reloaded image.
#[derive(Debug)]
pub(crate) struct LoadedImage {
    pub dataset: DatasetStore,
    pub model: Option<PartitionModel>,
    pub indexed_len: u64,
    pub extended: bool,
    pub state: LifecycleState,
}

/// Load and validate a persisted image, or `None` when the directory has
/// no committed manifest.
pub(crate) fn load_image(dir: &dyn Directory, config: &IndexConfig) -> Result<Option<LoadedImage>> {
    if !dir.exists(MANIFEST_FILE) {
        return Ok(None);
    }
    let manifest = Manifest::from_json(&dir.read(MANIFEST_FILE)?)?;

    if manifest.version != FORMAT_VERSION {
        return Err(IndexError::Data(format!(
            "unsupported image version {}",
            manifest.version
        )));
    }
    if manifest.dim as usize != config.dim {
        return Err(IndexError::Data(format!(
            "image dimension {} does not match configured {}",
            manifest.dim, config.dim
        )));
    }
    if manifest.backend != config.backend {
        return Err(IndexError::Data(
            "image backend kind does not match configured backend".into(),
        ));
    }
    if !matches!(
        manifest.state,
        LifecycleState::NoInit | LifecycleState::NoIndex | LifecycleState::Ready
    ) {
        return Err(IndexError::Data(format!(
            "image carries non-resumable state {}",
            manifest.state
        )));
    }

    let (dataset, dataset_crc) = format::decode_dataset(&dir.read(DATASET_FILE)?, config.dim)?;
    if dataset_crc != manifest.dataset_crc {
        return Err(IndexError::Data(
            "dataset image does not match the manifest checksum".into(),
        ));
    }
    if dataset.len() as u64 != manifest.dataset_len {
        return Err(IndexError::Data(format!(
            "dataset image has {} vectors, manifest says {}",
            dataset.len(),
            manifest.dataset_len
        )));
    }

    let model = match manifest.model_crc {
        Some(expected_crc) => {
            let (model, crc) = format::decode_model(&dir.read(MODEL_FILE)?, config.dim)?;
            if crc != expected_crc {
                return Err(IndexError::Data(
                    "model image does not match the manifest checksum".into(),
                ));
            }
            if model.nlist() as u32 != manifest.leaf_count {
                return Err(IndexError::Data(format!(
                    "model image has {} leaves, manifest says {}",
                    model.nlist(),
                    manifest.leaf_count
                )));
            }
            Some(model)
        }
        None => None,
    };

    if manifest.indexed_len > manifest.dataset_len {
        return Err(IndexError::Data(format!(
            "image indexed length {} exceeds dataset length {}",
            manifest.indexed_len, manifest.dataset_len
        )));
    }
    if model.is_none() && manifest.indexed_len != 0 {
        return Err(IndexError::Data(
            "image claims indexed positions without a model".into(),
        ));
    }

    info!(
        dataset_len = manifest.dataset_len,
        indexed_len = manifest.indexed_len,
        trained = model.is_some(),
        state = %manifest.state,
        "index image loaded"
    );
    Ok(Some(LoadedImage {
        dataset,
        model,
        indexed_len: manifest.indexed_len,
        extended: manifest.extended,
        state: manifest.state,
    }))
}
