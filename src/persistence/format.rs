//! On-disk image format.
//!
//! An index image is three files: a JSON manifest (written last, the
//! commit point) and two binary sections with little-endian fields and a
//! trailing CRC32 over everything before it:
//!
//! ```text
//! manifest.json          metadata, counters, section CRCs
//! dataset.bin            "QVDS" | version | count | dim | ids | vectors | crc
//! model.bin              "QVMD" | version | dim | nlist | centroids
//!                        | codebook flag [+ books | book_size | subdim
//!                        | codewords] | crc        (only when trained)
//! ```
//!
//! Posting lists, reorder codes, and norms are not stored; they are
//! rebuilt deterministically from dataset + model on load.

use crate::backend::Codebook;
use crate::config::BackendKind;
use crate::dataset::DatasetStore;
use crate::error::{IndexError, Result};
use crate::lifecycle::LifecycleState;
use crate::snapshot::PartitionModel;
use serde::{Deserialize, Serialize};

pub(crate) const FORMAT_VERSION: u32 = 1;

pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const DATASET_FILE: &str = "dataset.bin";
pub(crate) const MODEL_FILE: &str = "model.bin";

const DATASET_MAGIC: [u8; 4] = *b"QVDS";
const MODEL_MAGIC: [u8; 4] = *b"QVMD";

/// Index metadata; the JSON commit record of a dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub version: u32,
    pub dim: u32,
    pub backend: BackendKind,
    pub brute_threshold: u64,
    pub partition_sample_rate: f32,
    pub codebook_sample_rate: f32,
    pub state: LifecycleState,
    pub dataset_len: u64,
    pub id_count: u64,
    pub indexed_len: u64,
    pub leaf_count: u32,
    pub extended: bool,
    pub dataset_crc: u32,
    pub model_crc: Option<u32>,
}

impl Manifest {
    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| IndexError::Internal(e.to_string()))
    }

    pub(crate) fn from_json(bytes: &[u8]) -> Result<Manifest> {
        serde_json::from_slice(bytes)
            .map_err(|e| IndexError::Data(format!("corrupt manifest: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Little-endian writer/reader helpers
// ---------------------------------------------------------------------------

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(magic: [u8; 4]) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(&magic);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        Self { buf }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append the CRC32 of everything written so far and return the
    /// finished image plus that checksum.
    fn finish(mut self) -> (Vec<u8>, u32) {
        let crc = crc32fast::hash(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        (self.buf, crc)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Validate magic, version, and the trailing CRC, returning a cursor
    /// over the payload.
    fn open(buf: &'a [u8], magic: [u8; 4], what: &str) -> Result<(Self, u32)> {
        if buf.len() < 12 {
            return Err(IndexError::Data(format!("{what}: image truncated")));
        }
        let body = &buf[..buf.len() - 4];
        let tail = &buf[buf.len() - 4..];
        let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(IndexError::Data(format!(
                "{what}: checksum mismatch (expected {stored:#010x}, got {actual:#010x})"
            )));
        }
        let mut reader = Self { buf: body, pos: 0 };
        let found = reader.take(4, what)?;
        if found != magic {
            return Err(IndexError::Data(format!("{what}: bad magic bytes")));
        }
        let version = reader.get_u32(what)?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Data(format!(
                "{what}: unsupported format version {version}"
            )));
        }
        Ok((reader, stored))
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(IndexError::Data(format!("{what}: image truncated")));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn get_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn get_u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_u64(&mut self, what: &str) -> Result<u64> {
        let b = self.take(8, what)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn get_i64(&mut self, what: &str) -> Result<i64> {
        let b = self.take(8, what)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn get_f32(&mut self, what: &str) -> Result<f32> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_f32_vec(&mut self, len: usize, what: &str) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.get_f32(what)?);
        }
        Ok(out)
    }

    fn done(&self, what: &str) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(IndexError::Data(format!("{what}: trailing bytes in image")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dataset section
// ---------------------------------------------------------------------------

pub(crate) fn encode_dataset(dataset: &DatasetStore) -> (Vec<u8>, u32) {
    let mut w = Writer::new(DATASET_MAGIC);
    w.put_u64(dataset.len() as u64);
    w.put_u32(dataset.dim() as u32);
    for &id in dataset.ids() {
        w.put_i64(id);
    }
    for &x in dataset.vectors_flat() {
        w.put_f32(x);
    }
    w.finish()
}

pub(crate) fn decode_dataset(bytes: &[u8], expected_dim: usize) -> Result<(DatasetStore, u32)> {
    let what = "dataset image";
    let (mut r, crc) = Reader::open(bytes, DATASET_MAGIC, what)?;
    let count = r.get_u64(what)? as usize;
    let dim = r.get_u32(what)? as usize;
    if dim != expected_dim {
        return Err(IndexError::Data(format!(
            "{what}: dimension {dim} does not match configured {expected_dim}"
        )));
    }
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(r.get_i64(what)?);
    }
    let vectors = r.get_f32_vec(count * dim, what)?;
    r.done(what)?;
    Ok((DatasetStore::from_parts(dim, vectors, ids)?, crc))
}

// ---------------------------------------------------------------------------
// Model section
// ---------------------------------------------------------------------------

pub(crate) fn encode_model(model: &PartitionModel, dim: usize) -> (Vec<u8>, u32) {
    let mut w = Writer::new(MODEL_MAGIC);
    w.put_u32(dim as u32);
    w.put_u32(model.nlist() as u32);
    for centroid in &model.centroids {
        for &x in centroid {
            w.put_f32(x);
        }
    }
    match &model.codebook {
        Some(cb) => {
            w.put_u8(1);
            w.put_u32(cb.num_books() as u32);
            w.put_u32(cb.book_size() as u32);
            for book in cb.codewords() {
                for codeword in book {
                    for &x in codeword {
                        w.put_f32(x);
                    }
                }
            }
        }
        None => w.put_u8(0),
    }
    w.finish()
}

pub(crate) fn decode_model(bytes: &[u8], expected_dim: usize) -> Result<(PartitionModel, u32)> {
    let what = "model image";
    let (mut r, crc) = Reader::open(bytes, MODEL_MAGIC, what)?;
    let dim = r.get_u32(what)? as usize;
    if dim != expected_dim {
        return Err(IndexError::Data(format!(
            "{what}: dimension {dim} does not match configured {expected_dim}"
        )));
    }
    let nlist = r.get_u32(what)? as usize;
    let mut centroids = Vec::with_capacity(nlist);
    for _ in 0..nlist {
        centroids.push(r.get_f32_vec(dim, what)?);
    }

    let codebook = match r.get_u8(what)? {
        0 => None,
        1 => {
            let num_books = r.get_u32(what)? as usize;
            let book_size = r.get_u32(what)? as usize;
            if num_books == 0 || dim % num_books != 0 {
                return Err(IndexError::Data(format!(
                    "{what}: {num_books} codebooks do not divide dimension {dim}"
                )));
            }
            let subdim = dim / num_books;
            let mut codewords = Vec::with_capacity(num_books);
            for _ in 0..num_books {
                let mut book = Vec::with_capacity(book_size);
                for _ in 0..book_size {
                    book.push(r.get_f32_vec(subdim, what)?);
                }
                codewords.push(book);
            }
            Some(Codebook::from_parts(dim, num_books, book_size, codewords)?)
        }
        other => {
            return Err(IndexError::Data(format!(
                "{what}: invalid codebook flag {other}"
            )))
        }
    };
    r.done(what)?;
    Ok((
        PartitionModel {
            centroids,
            codebook,
        },
        crc,
    ))
}
