//! Asset store: a flat directory of images keyed by filename.
//!
//! The store is the only persistent state the acquisition pipeline has. A
//! descriptor counts as "present" when a regular, non-empty file with its
//! filename exists here. There is no index and no manifest; the directory
//! listing is the truth.
//!
//! Writes go to a hidden temporary sibling (`.name.tmp`) and are renamed over
//! the target, so a reader sees either the old file or the new one, never a
//! half-written image.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Length of the hex fingerprint appended to image URLs.
const FINGERPRINT_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("invalid asset filename: {0:?}")]
    InvalidFilename(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Filesystem-backed asset store.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a filename to its path inside the store.
    ///
    /// Rejects anything that could escape the directory or collide with the
    /// store's own temporaries.
    pub fn path(&self, filename: &str) -> Result<PathBuf, AssetError> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    /// True iff a regular file of non-zero size exists under `filename`.
    ///
    /// Invalid names and IO errors both read as "absent".
    pub fn exists(&self, filename: &str) -> bool {
        let Ok(path) = self.path(filename) else {
            return false;
        };
        fs::metadata(&path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Write `bytes` under `filename`, replacing any previous content.
    pub fn write(&self, filename: &str, bytes: &[u8]) -> Result<(), AssetError> {
        let path = self.path(filename)?;
        write_atomic(&path, bytes)?;
        Ok(())
    }

    pub fn read(&self, filename: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.path(filename)?;
        Ok(fs::read(path)?)
    }

    /// Short content hash used as a cache-busting query string.
    pub fn fingerprint(&self, filename: &str) -> Result<String, AssetError> {
        let bytes = self.read(filename)?;
        Ok(fingerprint_bytes(&bytes))
    }

    /// Plain files currently in the store, sorted by name.
    ///
    /// A missing store directory is an empty store.
    pub fn list(&self) -> Result<Vec<String>, AssetError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                AssetError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| io::Error::other("directory walk failed")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }
}

/// SHA-256 of `bytes`, truncated to the fingerprint length.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..FINGERPRINT_LEN].to_string()
}

/// Write through a hidden temporary sibling, then rename over `path`.
///
/// Creates the parent directory if needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = parent.join(format!(".{name}.tmp"));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Reject anything that is not a plain file name inside the store.
pub fn validate_filename(filename: &str) -> Result<(), AssetError> {
    let bad = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.contains('\0');
    if bad {
        return Err(AssetError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
