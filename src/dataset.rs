//! Append-only dataset store.
//!
//! Vectors live in one flat `f32` buffer (SoA layout, stride = dim) with
//! a parallel external-id column. Positions are dense and assigned in
//! insertion order; records are never mutated or removed.

use crate::error::{IndexError, Result};

#[derive(Debug, Clone)]
pub(crate) struct DatasetStore {
    dim: usize,
    vectors: Vec<f32>,
    ids: Vec<i64>,
}

impl DatasetStore {
    pub(crate) fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            ids: Vec::new(),
        }
    }

    pub(crate) fn from_parts(dim: usize, vectors: Vec<f32>, ids: Vec<i64>) -> Result<Self> {
        if vectors.len() != ids.len() * dim {
            return Err(IndexError::Data(format!(
                "dataset shape mismatch: {} floats for {} ids at dim {}",
                vectors.len(),
                ids.len(),
                dim
            )));
        }
        Ok(Self { dim, vectors, ids })
    }

    pub(crate) fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors.
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn id(&self, pos: usize) -> i64 {
        self.ids[pos]
    }

    pub(crate) fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub(crate) fn vector(&self, pos: usize) -> &[f32] {
        let start = pos * self.dim;
        &self.vectors[start..start + self.dim]
    }

    pub(crate) fn vectors_flat(&self) -> &[f32] {
        &self.vectors
    }

    /// Append a flat batch of vectors with matching external ids.
    ///
    /// The batch length must be a multiple of the dimension and the id
    /// count must equal the vector count. External ids are opaque:
    /// duplicates are stored verbatim and no value is reserved.
    pub(crate) fn append_batch(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        if vectors.len() % self.dim != 0 {
            return Err(IndexError::Data(format!(
                "batch length {} is not a multiple of dimension {}",
                vectors.len(),
                self.dim
            )));
        }
        let count = vectors.len() / self.dim;
        if count != ids.len() {
            return Err(IndexError::Data(format!(
                "batch has {} vectors but {} ids",
                count,
                ids.len()
            )));
        }
        self.vectors
            .try_reserve(vectors.len())
            .map_err(|e| IndexError::Allocation(e.to_string()))?;
        self.ids
            .try_reserve(ids.len())
            .map_err(|e| IndexError::Allocation(e.to_string()))?;
        self.vectors.extend_from_slice(vectors);
        self.ids.extend_from_slice(ids);
        Ok(())
    }

    /// Iterate positions `start..end` in order.
    pub(crate) fn iter_range(
        &self,
        start: usize,
        end: usize,
    ) -> impl Iterator<Item = (usize, &[f32])> {
        let end = end.min(self.len());
        let start = start.min(end);
        self.vectors[start * self.dim..end * self.dim]
            .chunks_exact(self.dim)
            .enumerate()
            .map(move |(i, v)| (start + i, v))
    }
}
