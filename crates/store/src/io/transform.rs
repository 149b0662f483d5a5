//! Byte transforms applied to serialized pages.

use std::{fmt, sync::Arc};

use palimpsest_types::{StorageConfig, TransformKind};

use crate::error::Result;

/// Reversible transform between serialized pages and stored bytes.
///
/// This is where compression or encryption plugs in. Implementations must be
/// stateless across calls.
pub trait ByteTransform: Send + Sync + fmt::Debug {
    /// Transforms serialized page bytes for storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the transform fails.
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Reverses [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the stored bytes are not a
    /// valid encoding.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Stores bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ByteTransform for Identity {
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Zstd compression at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct Zstd {
    level: i32,
}

impl Zstd {
    /// Creates a transform compressing at `level`.
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl ByteTransform for Zstd {
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::stream::encode_all(bytes, self.level)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::stream::decode_all(bytes)?)
    }
}

/// Returns the transform configured for a storage.
pub fn transform_for(config: &StorageConfig) -> Arc<dyn ByteTransform> {
    match config.transform {
        TransformKind::Identity => Arc::new(Identity),
        TransformKind::Zstd => Arc::new(Zstd::new(config.compression_level)),
    }
}
