//! Error types for raster reading.

use std::path::{Path, PathBuf};
use thiserror::Error;

use projection::ProjectionError;

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;

/// Errors raised while opening, decoding or warping a raster.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Unsupported raster {path}: {message}")]
    Unsupported { path: PathBuf, message: String },

    #[error("{path} has no georeferencing (needs ModelTransformation or ModelPixelScale + ModelTiepoint tags)")]
    MissingGeoreference { path: PathBuf },

    #[error("Projection error for {path}: {source}")]
    Projection {
        path: PathBuf,
        #[source]
        source: ProjectionError,
    },
}

impl RasterError {
    pub fn decode(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn unsupported(path: &Path, msg: impl Into<String>) -> Self {
        Self::Unsupported {
            path: path.to_path_buf(),
            message: msg.into(),
        }
    }

    pub fn projection(path: &Path, source: ProjectionError) -> Self {
        Self::Projection {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Path of the raster the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Open { path, .. }
            | Self::Decode { path, .. }
            | Self::Unsupported { path, .. }
            | Self::MissingGeoreference { path }
            | Self::Projection { path, .. } => path,
        }
    }
}
