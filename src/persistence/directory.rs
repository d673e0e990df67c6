//! Storage backends for persistence.
//!
//! A [`Directory`] is a flat namespace of whole-file images. The durable
//! variant writes through a temp file plus rename so a crashed dump never
//! leaves a half-written file under its final name; the memory variant
//! keeps everything in-process and is discarded with the handle.

use crate::error::{IndexError, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

/// Flat file-image store used by the persistence manager.
pub(crate) trait Directory: Send + Sync + fmt::Debug {
    fn read(&self, name: &str) -> Result<Vec<u8>>;
    fn atomic_write(&self, name: &str, data: &[u8]) -> Result<()>;
    fn exists(&self, name: &str) -> bool;
}

/// Filesystem-backed directory.
#[derive(Debug)]
pub(crate) struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

impl Directory for FsDirectory {
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(name))?)
    }

    fn atomic_write(&self, name: &str, data: &[u8]) -> Result<()> {
        let tmp = self.root.join(format!(".{name}.tmp"));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, self.root.join(name))?;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.root.join(name).exists()
    }
}

/// In-process directory for memory-only storage.
#[derive(Debug, Default)]
pub(crate) struct MemoryDirectory {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Directory for MemoryDirectory {
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .map_err(|_| IndexError::Internal("memory directory lock poisoned".into()))?
            .get(name)
            .cloned()
            .ok_or_else(|| {
                IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such in-memory file: {name}"),
                ))
            })
    }

    fn atomic_write(&self, name: &str, data: &[u8]) -> Result<()> {
        self.files
            .write()
            .map_err(|_| IndexError::Internal("memory directory lock poisoned".into()))?
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_directory_round_trips() {
        let dir = MemoryDirectory::new();
        assert!(!dir.exists("a"));
        dir.atomic_write("a", b"payload").expect("write");
        assert!(dir.exists("a"));
        assert_eq!(dir.read("a").expect("read"), b"payload");
    }

    #[test]
    fn fs_directory_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::new(tmp.path()).expect("open");
        dir.atomic_write("image.bin", b"\x01\x02").expect("write");
        assert!(dir.exists("image.bin"));
        assert_eq!(dir.read("image.bin").expect("read"), b"\x01\x02");
        // No stray temp file left behind.
        assert!(!tmp.path().join(".image.bin.tmp").exists());
    }

    #[test]
    fn fs_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::new(tmp.path()).expect("open");
        assert!(matches!(dir.read("nope").unwrap_err(), IndexError::Io(_)));
    }
}
