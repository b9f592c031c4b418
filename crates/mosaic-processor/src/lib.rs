//! Grid-aligned mosaicking of raster tiles into a Zarr V3 store.
//!
//! Every tile is reprojected virtually onto the reference grid and merged
//! into the output one block at a time, so memory stays bounded by the
//! block size whatever the size of the mosaic or of the tiles.
//!
//! # Architecture
//!
//! ```text
//! discover_tiles ──► resolve_grid ──► MosaicStore::create ──► initialize
//!                                                               │
//!        ┌──────────────────────────────────────────────────────┘
//!        ▼
//! for tile in sorted tiles:
//!     WarpedView::new(tile, grid)
//!     for block in grid.tiling(block_size):
//!         dest = store.read_block(block)
//!         src  = view.read_block(block)      (lazy, per block)
//!         merge_block(dest, src, validity, scale, policy)
//!         store.write_block(block, dest)
//!        │
//!        ▼
//! build_overviews (best-effort) ──► MosaicStore::finish
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mosaic_processor::{MergeOptions, MosaicJob, Mosaicker};
//!
//! let job = MosaicJob::new("inputs/Jan", "reference.tif", "out/2020_Jan_LAI.zarr");
//! let report = Mosaicker::new(MergeOptions::default()).run(&job)?;
//! println!("merged {} tiles", report.tiles_merged.len());
//! ```

pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod grid;
pub mod init;
pub mod merge;
pub mod progress;
pub mod pyramid;
pub mod store;
pub mod validity;

// Re-export commonly used types at crate root
pub use config::{
    Compression, LargeFileMode, MergeOptions, MosaicJob, OnTileError, OverviewMethod, OverviewOptions,
};
pub use discovery::discover_tiles;
pub use driver::{MosaicReport, Mosaicker, OverviewOutcome, SkippedTile};
pub use error::{MosaicError, Result};
pub use grid::{resolve_grid, ResolvedGrid, DEFAULT_NODATA};
pub use init::initialize;
pub use merge::{merge_block, MergePolicy};
pub use progress::{NoopProgress, ProgressSink};
pub use pyramid::{build_overviews, OverviewSummary};
pub use raster_io::Resampling;
pub use store::MosaicStore;
pub use validity::{FiniteNotNodata, ValidityPredicate, ValueRange};
