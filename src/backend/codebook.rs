//! Residual reordering codebook.
//!
//! Product quantization over residuals (vector minus its leaf centroid).
//! Each residual is split into `num_books` contiguous subvectors; every
//! subspace trains its own codeword table. At query time a per-subspace
//! lookup table of dot products turns candidate scoring into `num_books`
//! table reads.

use crate::backend::kmeans::KMeans;
use crate::error::{IndexError, Result};
use crate::simd;
use smallvec::SmallVec;

/// Code strip for one vector; `num_books` rarely exceeds 16.
pub(crate) type CodeStrip = SmallVec<[u8; 16]>;

/// Maximum codewords per subspace (codes are stored as `u8`).
const MAX_BOOK_SIZE: usize = 256;

/// Subspace counts tried in order; the first that divides the dimension
/// wins.
const BOOK_CANDIDATES: [usize; 5] = [16, 8, 4, 2, 1];

#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    dim: usize,
    num_books: usize,
    book_size: usize,
    subdim: usize,
    /// `[book][codeword][subdim]`
    codewords: Vec<Vec<Vec<f32>>>,
}

impl Codebook {
    /// Train a codebook over `n` residuals stored flat with stride `dim`.
    ///
    /// The subspace count is the largest candidate dividing `dim`; the
    /// per-subspace table size is 256 clamped to the sample size.
    pub(crate) fn train(residuals: &[f32], n: usize, dim: usize, seed: u64) -> Result<Codebook> {
        if n == 0 || residuals.len() < n * dim {
            return Err(IndexError::Index(
                "codebook sample is empty or undersized".into(),
            ));
        }
        let num_books = BOOK_CANDIDATES
            .iter()
            .copied()
            .find(|&m| dim % m == 0)
            .unwrap_or(1);
        let subdim = dim / num_books;
        let book_size = MAX_BOOK_SIZE.min(n);

        let mut codewords = Vec::with_capacity(num_books);
        for book in 0..num_books {
            let offset = book * subdim;
            let mut subvectors = Vec::with_capacity(n * subdim);
            for i in 0..n {
                let start = i * dim + offset;
                subvectors.extend_from_slice(&residuals[start..start + subdim]);
            }

            let mut km = KMeans::new(subdim, book_size, seed.wrapping_add(book as u64))?;
            km.fit(&subvectors, n)?;
            codewords.push(km.into_centroids());
        }

        Ok(Codebook {
            dim,
            num_books,
            book_size,
            subdim,
            codewords,
        })
    }

    pub(crate) fn from_parts(
        dim: usize,
        num_books: usize,
        book_size: usize,
        codewords: Vec<Vec<Vec<f32>>>,
    ) -> Result<Codebook> {
        if num_books == 0 || dim % num_books != 0 || codewords.len() != num_books {
            return Err(IndexError::Data("malformed codebook layout".into()));
        }
        Ok(Codebook {
            dim,
            num_books,
            book_size,
            subdim: dim / num_books,
            codewords,
        })
    }

    pub(crate) fn num_books(&self) -> usize {
        self.num_books
    }

    pub(crate) fn book_size(&self) -> usize {
        self.book_size
    }

    pub(crate) fn codewords(&self) -> &[Vec<Vec<f32>>] {
        &self.codewords
    }

    /// Quantize one residual to its per-subspace nearest codewords.
    pub(crate) fn encode(&self, residual: &[f32]) -> CodeStrip {
        let mut codes = CodeStrip::with_capacity(self.num_books);
        for book in 0..self.num_books {
            let offset = book * self.subdim;
            let sub = &residual[offset..offset + self.subdim];

            let mut best = 0usize;
            let mut best_dist = f32::INFINITY;
            for (idx, codeword) in self.codewords[book].iter().enumerate() {
                let dist = simd::l2_distance_squared(sub, codeword);
                if dist < best_dist {
                    best_dist = dist;
                    best = idx;
                }
            }
            codes.push(best as u8);
        }
        codes
    }

    /// Per-subspace dot-product lookup table for one query.
    pub(crate) fn lut(&self, query: &[f32]) -> Vec<Vec<f32>> {
        (0..self.num_books)
            .map(|book| {
                let offset = book * self.subdim;
                let query_sub = &query[offset..offset + self.subdim];
                self.codewords[book]
                    .iter()
                    .map(|codeword| simd::dot(query_sub, codeword))
                    .collect()
            })
            .collect()
    }

    /// Approximate `dot(query, residual)` from a code strip and the
    /// query's lookup table.
    pub(crate) fn approx_dot(lut: &[Vec<f32>], codes: &[u8]) -> f32 {
        codes
            .iter()
            .enumerate()
            .map(|(book, &code)| lut[book][code as usize])
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual_sample(n: usize, dim: usize) -> Vec<f32> {
        (0..n * dim)
            .map(|i| ((i * 37 % 101) as f32 / 101.0) - 0.5)
            .collect()
    }

    #[test]
    fn book_count_divides_dimension() {
        let residuals = residual_sample(20, 6);
        let cb = Codebook::train(&residuals, 20, 6, 9).expect("train");
        assert_eq!(cb.num_books(), 2);
        assert_eq!(cb.subdim, 3);
    }

    #[test]
    fn book_size_clamped_to_sample() {
        let residuals = residual_sample(5, 4);
        let cb = Codebook::train(&residuals, 5, 4, 9).expect("train");
        assert_eq!(cb.book_size(), 5);
    }

    #[test]
    fn lut_reproduces_exact_dot_for_codewords() {
        let residuals = residual_sample(12, 4);
        let cb = Codebook::train(&residuals, 12, 4, 3).expect("train");

        let query = [0.5, -0.25, 0.75, 0.1];
        let lut = cb.lut(&query);
        let codes = cb.encode(&residuals[..4]);

        // The LUT score equals the dot of the query with the
        // reconstruction (concatenated chosen codewords).
        let mut reconstructed = Vec::new();
        for (book, &code) in codes.iter().enumerate() {
            reconstructed.extend_from_slice(&cb.codewords()[book][code as usize]);
        }
        let exact = simd::dot(&query, &reconstructed);
        let approx = Codebook::approx_dot(&lut, &codes);
        assert!((exact - approx).abs() < 1e-5);
    }

    #[test]
    fn empty_sample_rejected() {
        let err = Codebook::train(&[], 0, 4, 1).unwrap_err();
        assert!(matches!(err, IndexError::Index(_)));
    }
}
