//! Error types for voxtree

use thiserror::Error;

/// Main error type for volume, storage and octree operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed region or bounds, bad LOD range, write outside the volume, slot exhaustion
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The chunk store could not be opened, read or written
    #[error("Database error: {0}")]
    Database(String),

    /// Corrupt chunk blob or decompressed size mismatch
    #[error("Compression error: {0}")]
    Compression(String),

    /// Missing root node, stale handle, voxel type mismatch on open
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}
