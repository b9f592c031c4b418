//! GeoTIFF access for the mosaic pipeline.
//!
//! - [`GeoTiffInfo`] reads georeferencing and layout without touching pixels.
//! - [`GeoTiffTile`] decodes strips/tiles on demand through a [`ChunkCache`].
//! - [`WarpedView`] presents a tile on a target [`GridSpec`](mosaic_common::GridSpec),
//!   evaluated block by block.

pub mod cache;
pub mod error;
mod geokeys;
pub mod geotiff;
pub mod resample;
pub mod tile;
pub mod warp;

pub use cache::{CacheStats, ChunkCache};
pub use error::{RasterError, Result};
pub use geotiff::{ChunkKind, ChunkLayout, GeoTiffInfo, SampleType};
pub use resample::Resampling;
pub use tile::GeoTiffTile;
pub use warp::WarpedView;
