//! Error types for mosaicking.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while building a mosaic.
///
/// `Configuration` and `Storage` abort the run. `Tile` aborts or skips the
/// tile depending on [`OnTileError`](crate::config::OnTileError).
/// `Overview` is logged and never propagated out of a run.
#[derive(Error, Debug)]
pub enum MosaicError {
    /// Bad inputs or options: no tiles, unreadable reference, invalid values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The output store cannot be created, read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// A single input tile failed to open, reproject or decode.
    #[error("tile {path} failed: {message}")]
    Tile { path: PathBuf, message: String },

    /// Overview construction failed.
    #[error("overview error: {0}")]
    Overview(String),
}

impl MosaicError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a Tile error.
    pub fn tile(path: &Path, msg: impl std::fmt::Display) -> Self {
        Self::Tile {
            path: path.to_path_buf(),
            message: msg.to_string(),
        }
    }

    /// Whether the run must stop regardless of the tile error policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Storage(_))
    }
}

/// Result type for mosaic operations.
pub type Result<T> = std::result::Result<T, MosaicError>;
