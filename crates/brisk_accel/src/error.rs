//! Errors raised while saving or loading KD-trees.

use brisk_math::Aabb;
use thiserror::Error;

/// Errors that can occur while persisting a tree.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a KD-tree file (bad magic)")]
    BadMagic,

    #[error("Unsupported KD-tree file version {0}")]
    UnsupportedVersion(u32),

    #[error("KD-tree file is truncated")]
    Truncated,

    #[error("Corrupt KD-tree file: {0}")]
    Corrupt(String),

    #[error("KD-tree was built for {stored} primitives, scene has {actual}")]
    PrimitiveCountMismatch { stored: usize, actual: usize },

    #[error("KD-tree was built over bounds {stored:?}, scene spans {actual:?}")]
    BoundsMismatch { stored: Aabb, actual: Aabb },

    #[error("KD-tree file contains no nodes")]
    EmptyTree,
}

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

impl PersistError {
    /// Map an unexpected end of input to [`PersistError::Truncated`].
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            PersistError::Truncated
        } else {
            PersistError::Io(err)
        }
    }
}
