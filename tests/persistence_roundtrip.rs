//! Persistence round-trip tests.
//!
//! A dump followed by a fresh initialize must reproduce identical stats
//! and identical query results; corrupt images must be rejected with a
//! data error instead of loading a torn index.

use quiver::{
    IndexConfig, IndexError, LifecycleState, SearchParams, StorageKind, TrainMode, VectorIndex,
};
use std::fs;
use std::path::Path;

const DIM: usize = 6;

fn durable_config() -> IndexConfig {
    let mut config = IndexConfig::new(DIM);
    config.brute_threshold = 1;
    config
}

fn corpus(n: usize) -> (Vec<f32>, Vec<i64>) {
    let mut vectors = Vec::with_capacity(n * DIM);
    for i in 0..n {
        for d in 0..DIM {
            vectors.push(((i * DIM + d) as f32 * 0.37).cos() + 0.01 * i as f32);
        }
    }
    let ids = (0..n as i64).map(|i| i * 3).collect();
    (vectors, ids)
}

fn populate(dir: &Path) -> (Vec<f32>, Vec<i64>) {
    let index = VectorIndex::initialize(Some(dir), durable_config()).expect("initialize");
    let (vectors, ids) = corpus(96);
    index.insert(&vectors, &ids).expect("insert");
    index.train(TrainMode::New, 8, 0).expect("train");
    index.persist().expect("persist");
    index.close().expect("close");
    (vectors, ids)
}

#[test]
fn fresh_directory_starts_noinit() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let index = VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("initialize");
    assert_eq!(index.stats().expect("stats").state, LifecycleState::NoInit);
    assert_eq!(index.stats().expect("stats").dataset_size, 0);
}

#[test]
fn durable_storage_without_directory_is_a_data_error() {
    let err = VectorIndex::initialize(None, durable_config()).unwrap_err();
    assert!(matches!(err, IndexError::Data(_)));
}

#[test]
fn dump_then_reload_reproduces_stats_and_query_results() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let params = SearchParams {
        topk: 5,
        reorder_topk: 40,
        nprobe: 4,
    };

    let index = VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("initialize");
    let (vectors, ids) = corpus(96);
    index.insert(&vectors, &ids).expect("insert");
    index.train(TrainMode::New, 8, 0).expect("train");
    let queries = &vectors[..3 * DIM];
    let before_stats = index.stats().expect("stats");
    let before_hits = index.query(queries, params).expect("query");
    index.persist().expect("persist");
    index.close().expect("close");

    let reloaded = VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("reload");
    let stats = reloaded.stats().expect("stats");
    assert_eq!(stats.dataset_size, before_stats.dataset_size);
    assert_eq!(stats.indexed_size, before_stats.indexed_size);
    assert_eq!(stats.leaf_count, before_stats.leaf_count);
    assert_eq!(stats.state, LifecycleState::Ready);
    assert!(!stats.is_brute);

    // Results must be identical hit-for-hit across the reload.
    let after_hits = reloaded.query(queries, params).expect("query");
    assert_eq!(before_hits, after_hits);
}

#[test]
fn reload_preserves_a_stale_tail() {
    let tmp = tempfile::tempdir().expect("tempdir");
    populate(tmp.path());

    // Append without reindexing, then dump.
    let index = VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("reload");
    let mut outlier = vec![0.0; DIM];
    outlier[2] = -5.0;
    index.insert(&outlier, &[999]).expect("insert");
    assert_eq!(index.stats().expect("stats").state, LifecycleState::NoIndex);
    index.persist().expect("persist");
    index.close().expect("close");

    let reloaded = VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("reload");
    let stats = reloaded.stats().expect("stats");
    assert_eq!(stats.dataset_size, 97);
    assert_eq!(stats.indexed_size, 96);
    assert_eq!(stats.state, LifecycleState::NoIndex);

    // The tail is still visible to search.
    let params = SearchParams {
        topk: 1,
        reorder_topk: 97,
        nprobe: 8,
    };
    let hits = reloaded.query(&outlier, params).expect("query");
    assert_eq!(hits[0][0].id, 999);
    assert_eq!(hits[0][0].position, 96);

    // Reindexing after reload completes the picture.
    reloaded.train(TrainMode::Add, 0, 0).expect("reindex");
    assert_eq!(reloaded.stats().expect("stats").state, LifecycleState::Ready);
}

#[test]
fn untrained_image_round_trips() {
    let tmp = tempfile::tempdir().expect("tempdir");
    {
        let index =
            VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("initialize");
        let (vectors, ids) = corpus(10);
        index.insert(&vectors, &ids).expect("insert");
        index.persist().expect("persist");
        index.close().expect("close");
    }

    let reloaded = VectorIndex::initialize(Some(tmp.path()), durable_config()).expect("reload");
    let stats = reloaded.stats().expect("stats");
    assert_eq!(stats.dataset_size, 10);
    assert_eq!(stats.leaf_count, 0);
    assert_eq!(stats.state, LifecycleState::NoIndex);
    assert!(stats.is_brute);
}

#[test]
fn corrupt_manifest_fails_initialize() {
    let tmp = tempfile::tempdir().expect("tempdir");
    populate(tmp.path());

    fs::write(tmp.path().join("manifest.json"), b"{\"version\": 1").expect("corrupt");
    let err = VectorIndex::initialize(Some(tmp.path()), durable_config()).unwrap_err();
    assert!(matches!(err, IndexError::Data(_)));
}

#[test]
fn corrupt_dataset_image_fails_initialize() {
    let tmp = tempfile::tempdir().expect("tempdir");
    populate(tmp.path());

    let path = tmp.path().join("dataset.bin");
    let mut bytes = fs::read(&path).expect("read image");
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    fs::write(&path, bytes).expect("write corrupt image");

    let err = VectorIndex::initialize(Some(tmp.path()), durable_config()).unwrap_err();
    assert!(matches!(err, IndexError::Data(_)));
}

#[test]
fn reload_with_wrong_dimension_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    populate(tmp.path());

    let mut other = durable_config();
    other.dim = DIM + 1;
    let err = VectorIndex::initialize(Some(tmp.path()), other).unwrap_err();
    assert!(matches!(err, IndexError::Data(_)));
}

#[test]
fn memory_storage_dump_dies_with_the_handle() {
    let mut config = IndexConfig::new(DIM);
    config.storage = StorageKind::Memory;

    let index = VectorIndex::initialize(None, config.clone()).expect("initialize");
    let (vectors, ids) = corpus(12);
    index.insert(&vectors, &ids).expect("insert");
    index.persist().expect("in-memory dump should succeed");
    index.close().expect("close");

    // A new memory handle starts empty: the dump was irrecoverably
    // discarded at release.
    let fresh = VectorIndex::initialize(None, config).expect("initialize");
    assert_eq!(fresh.stats().expect("stats").dataset_size, 0);
    assert_eq!(fresh.stats().expect("stats").state, LifecycleState::NoInit);
}
