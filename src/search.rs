//! Brute-force and partitioned top-k search.
//!
//! Scores are cosine similarity, higher is better; ties break toward the
//! lowest internal position so results are deterministic and stable for
//! a fixed snapshot. The partitioned path probes the `nprobe` coarsest
//! leaves, pre-ranks their postings by approximate score, exact-rescores
//! the best `reorder_topk`, then merges exact-scored candidates from the
//! unindexed dataset tail so freshly added vectors stay visible.

use crate::backend::{Codebook, VectorBackend};
use crate::config::SearchParams;
use crate::dataset::DatasetStore;
use crate::error::{IndexError, Result};
use crate::simd;
use crate::snapshot::IndexSnapshot;

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Internal dense position (insertion order).
    pub position: u64,
    /// External id, returned verbatim.
    pub id: i64,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Exhaustive scan over positions `start..end`.
fn brute_scan(
    dataset: &DatasetStore,
    query: &[f32],
    backend: &dyn VectorBackend,
    start: usize,
    end: usize,
) -> Vec<(u64, f32)> {
    dataset
        .iter_range(start, end)
        .map(|(pos, v)| (pos as u64, backend.exact_score(query, v)))
        .collect()
}

/// Sort by score descending, ties by lowest position, truncate to `k`.
fn take_top_k(mut scored: Vec<(u64, f32)>, k: usize) -> Vec<(u64, f32)> {
    scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// Brute-force top-k over the whole dataset.
pub(crate) fn brute_search(
    dataset: &DatasetStore,
    query: &[f32],
    backend: &dyn VectorBackend,
    topk: usize,
) -> Vec<SearchHit> {
    let scored = brute_scan(dataset, query, backend, 0, dataset.len());
    to_hits(dataset, take_top_k(scored, topk))
}

/// Partitioned top-k against a snapshot, with brute-force fallback over
/// the unindexed tail.
pub(crate) fn partitioned_search(
    dataset: &DatasetStore,
    snapshot: &IndexSnapshot,
    query: &[f32],
    backend: &dyn VectorBackend,
    params: &SearchParams,
) -> Result<Vec<SearchHit>> {
    let model = snapshot
        .model
        .as_ref()
        .ok_or_else(|| IndexError::Internal("partitioned search without a model".into()))?;

    // 1. Probe the nprobe coarse-nearest leaves (clamped to leaf count).
    let coarse = backend.coarse_scores(query, &model.centroids);
    let nprobe = (params.nprobe as usize).min(model.nlist());
    let mut leaves: Vec<(usize, f32)> = coarse.iter().copied().enumerate().collect();
    leaves.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    leaves.truncate(nprobe);

    // 2. Pre-rank the union of their postings by approximate score.
    let query_norm = simd::norm(query);
    let lut = model.codebook.as_ref().map(|cb| cb.lut(query));
    let stride = model.codebook.as_ref().map_or(0, |cb| cb.num_books());

    let mut candidates: Vec<(u64, f32)> = Vec::new();
    for &(leaf, leaf_score) in &leaves {
        let centroid_dot = simd::dot(query, &model.centroids[leaf]);
        for &pos in &snapshot.postings[leaf] {
            let approx = match &lut {
                Some(lut) => {
                    let start = pos as usize * stride;
                    let codes = &snapshot.codes[start..start + stride];
                    let dot = centroid_dot + Codebook::approx_dot(lut, codes);
                    approx_cosine(dot, query_norm, snapshot.norms[pos as usize])
                }
                None => leaf_score,
            };
            candidates.push((pos, approx));
        }
    }

    // 3. Exact-rescore exactly the best reorder_topk candidates.
    let shortlist = take_top_k(candidates, params.reorder_topk as usize);
    let mut rescored: Vec<(u64, f32)> = shortlist
        .into_iter()
        .map(|(pos, _)| {
            (
                pos,
                backend.exact_score(query, dataset.vector(pos as usize)),
            )
        })
        .collect();

    // 4. Merge the unindexed tail at exact scores.
    rescored.extend(brute_scan(
        dataset,
        query,
        backend,
        snapshot.indexed_len as usize,
        dataset.len(),
    ));

    Ok(to_hits(
        dataset,
        take_top_k(rescored, params.topk as usize),
    ))
}

fn approx_cosine(dot: f32, query_norm: f32, vector_norm: f32) -> f32 {
    let denom = query_norm * vector_norm;
    if denom > 1e-9 {
        dot / denom
    } else {
        0.0
    }
}

fn to_hits(dataset: &DatasetStore, scored: Vec<(u64, f32)>) -> Vec<SearchHit> {
    scored
        .into_iter()
        .map(|(pos, score)| SearchHit {
            position: pos,
            id: dataset.id(pos as usize),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::backend_for;
    use crate::builder;
    use crate::config::BackendKind;
    use crate::snapshot::PartitionModel;
    use std::sync::Arc;

    fn dataset_of(points: &[[f32; 2]], ids: &[i64]) -> DatasetStore {
        let mut ds = DatasetStore::new(2);
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        ds.append_batch(&flat, ids).expect("append");
        ds
    }

    #[test]
    fn brute_orders_by_score_then_position() {
        let ds = dataset_of(
            &[[1.0, 0.0], [0.0, 1.0], [2.0, 0.0]],
            &[100, 101, 102],
        );
        let backend = backend_for(BackendKind::Coarse, 2);
        let hits = brute_search(&ds, &[1.0, 0.0], backend.as_ref(), 3);

        // Positions 0 and 2 are both perfectly aligned; the lower
        // position wins the tie.
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].id, 100);
        assert_eq!(hits[1].position, 2);
        assert_eq!(hits[2].position, 1);
    }

    #[test]
    fn brute_returns_fewer_than_topk_on_small_dataset() {
        let ds = dataset_of(&[[1.0, 0.0]], &[7]);
        let backend = backend_for(BackendKind::Coarse, 2);
        let hits = brute_search(&ds, &[1.0, 0.0], backend.as_ref(), 10);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn partitioned_sees_unindexed_tail() {
        let mut ds = dataset_of(&[[1.0, 0.1], [-1.0, 0.0]], &[0, 1]);
        let backend = backend_for(BackendKind::Coarse, 2);
        let model = Arc::new(PartitionModel {
            centroids: vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
            codebook: None,
        });
        let snap = builder::build_full(&ds, model, backend.as_ref()).expect("build");

        // Appended after the snapshot; best match for the query.
        ds.append_batch(&[1.0, 0.0], &[2]).expect("append");

        let params = SearchParams {
            topk: 1,
            reorder_topk: 2,
            nprobe: 1,
        };
        let hits = partitioned_search(&ds, &snap, &[1.0, 0.0], backend.as_ref(), &params)
            .expect("search");
        assert_eq!(hits[0].position, 2);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn nprobe_larger_than_leaf_count_is_clamped() {
        let ds = dataset_of(&[[1.0, 0.0], [-1.0, 0.0]], &[0, 1]);
        let backend = backend_for(BackendKind::Coarse, 2);
        let model = Arc::new(PartitionModel {
            centroids: vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
            codebook: None,
        });
        let snap = builder::build_full(&ds, model, backend.as_ref()).expect("build");

        let params = SearchParams {
            topk: 2,
            reorder_topk: 2,
            nprobe: 64,
        };
        let hits = partitioned_search(&ds, &snap, &[1.0, 0.0], backend.as_ref(), &params)
            .expect("search");
        assert_eq!(hits.len(), 2);
    }
}
