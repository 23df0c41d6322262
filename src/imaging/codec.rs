//! Codec adapter trait and shared types.
//!
//! The [`ImageCodec`] trait defines the two operations the rest of the crate
//! needs from an image codec: convert a file on disk to another format, and
//! re-encode in-memory bytes for a target filename.
//!
//! The production implementation is
//! [`RustCodec`](super::rust_codec::RustCodec), pure Rust on top of the
//! `image` crate. Tests use a mock that records its calls.

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("source image not found: {0}")]
    MissingSource(String),
    #[error("unsupported target format: {0}")]
    UnsupportedFormat(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Trait for image codec adapters.
///
/// Codec failures are never retried here; callers decide what a failed
/// conversion means.
pub trait ImageCodec: Sync {
    /// Decode `source` and write it to `target` in the format implied by the
    /// target's extension.
    fn convert(&self, source: &Path, target: &Path) -> Result<(), CodecError>;

    /// Re-encode `bytes` for `target`'s format. Uncompressed targets get the
    /// bytes back unchanged.
    fn encode_for(&self, bytes: &[u8], target: &Path) -> Result<Vec<u8>, CodecError>;
}
