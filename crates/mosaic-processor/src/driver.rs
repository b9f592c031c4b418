//! The tile merge driver.
//!
//! One run: discover tiles, resolve the output grid, create and initialize
//! the store, merge every tile block by block in path order, build
//! overviews, close the store. Tiles and blocks are processed strictly one
//! at a time, so the value of an overlap pixel depends only on the merge
//! policy and the tile order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use raster_io::{GeoTiffTile, WarpedView};
use tracing::{debug, error, info, warn};

use crate::config::{MergeOptions, MosaicJob, OnTileError};
use crate::discovery::discover_tiles;
use crate::error::{MosaicError, Result};
use crate::grid::{resolve_grid, ResolvedGrid};
use crate::init::initialize;
use crate::merge::merge_block;
use crate::progress::{NoopProgress, ProgressSink};
use crate::pyramid::{build_overviews, OverviewSummary};
use crate::store::MosaicStore;
use crate::validity::{FiniteNotNodata, ValidityPredicate};

/// A tile left out of the mosaic under [`OnTileError::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTile {
    pub path: PathBuf,
    pub reason: String,
}

/// What happened to the overview step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverviewOutcome {
    Disabled,
    Built(OverviewSummary),
    /// Overviews failed; the full-resolution mosaic is intact.
    Failed(String),
}

/// Summary of one run.
#[derive(Debug, Clone)]
pub struct MosaicReport {
    pub output: PathBuf,
    pub tiles_discovered: usize,
    pub tiles_merged: Vec<PathBuf>,
    pub tiles_skipped: Vec<SkippedTile>,
    pub blocks_initialized: usize,
    /// Full-resolution blocks rewritten by the merge (not counting init).
    pub blocks_written: usize,
    pub pixels_written: usize,
    pub overviews: OverviewOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MosaicReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Per-tile counters.
#[derive(Debug, Default, Clone, Copy)]
struct TileStats {
    blocks_visited: usize,
    blocks_written: usize,
    pixels_written: usize,
}

/// Runs mosaic jobs with a fixed set of options.
pub struct Mosaicker {
    options: MergeOptions,
    validity: Arc<dyn ValidityPredicate>,
    progress: Arc<dyn ProgressSink>,
}

impl Mosaicker {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            validity: Arc::new(FiniteNotNodata),
            progress: Arc::new(NoopProgress),
        }
    }

    /// Replace the default finite-and-not-nodata validity rule.
    pub fn with_validity(mut self, validity: Arc<dyn ValidityPredicate>) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Build the mosaic described by `job`.
    ///
    /// Option validation, discovery and grid resolution all happen before
    /// the output is touched, so a configuration error never leaves an
    /// output behind. A failure after the store exists leaves a partially
    /// merged mosaic without overviews.
    pub fn run(&self, job: &MosaicJob) -> Result<MosaicReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        self.options.validate()?;

        let tiles = discover_tiles(&job.input_dir, &self.options.extensions, self.options.recursive)?;
        let grid = resolve_grid(&job.reference, self.options.output_nodata)?;

        info!(
            input = %job.input_dir.display(),
            reference = %job.reference.display(),
            output = %job.output.display(),
            tiles = tiles.len(),
            merge_policy = %self.options.merge_policy,
            resampling = %self.options.resampling,
            block_size = self.options.block_size,
            "Starting mosaic"
        );

        let mut store = MosaicStore::create(&job.output, &grid.spec, grid.output_nodata, &self.options)?;
        let blocks_initialized = initialize(&store, grid.output_nodata)?;

        let mut report = MosaicReport {
            output: job.output.clone(),
            tiles_discovered: tiles.len(),
            tiles_merged: Vec::new(),
            tiles_skipped: Vec::new(),
            blocks_initialized,
            blocks_written: 0,
            pixels_written: 0,
            overviews: OverviewOutcome::Disabled,
            started_at,
            finished_at: started_at,
        };

        self.progress.run_started(tiles.len(), blocks_initialized);
        for (index, path) in tiles.iter().enumerate() {
            self.progress.tile_started(index, path);
            match self.merge_tile(&store, &grid, path) {
                Ok(stats) => {
                    report.blocks_written += stats.blocks_written;
                    report.pixels_written += stats.pixels_written;
                    report.tiles_merged.push(path.clone());
                    self.progress.tile_finished(index, path, true);
                }
                Err(e) if e.is_fatal() || self.options.on_tile_error == OnTileError::Abort => {
                    error!(
                        path = %path.display(),
                        error = %e,
                        output = %job.output.display(),
                        "Mosaic aborted; output is partially merged"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping tile");
                    report.tiles_skipped.push(SkippedTile {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                    self.progress.tile_finished(index, path, false);
                }
            }
        }

        report.overviews = self.finish_overviews(&mut store);
        store.finish()?;
        self.progress.run_finished();

        report.finished_at = Utc::now();
        info!(
            output = %job.output.display(),
            merged = report.tiles_merged.len(),
            skipped = report.tiles_skipped.len(),
            blocks = report.blocks_written,
            pixels = report.pixels_written,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Mosaic complete"
        );

        Ok(report)
    }

    /// Merge one tile into the store.
    ///
    /// Errors raised by the tile itself come back as [`MosaicError::Tile`];
    /// store failures keep their fatal kind.
    fn merge_tile(&self, store: &MosaicStore, grid: &ResolvedGrid, path: &Path) -> Result<TileStats> {
        let timer = Instant::now();
        let nodata = grid.output_nodata;

        let tile = GeoTiffTile::open(path, self.options.tile_cache_bytes()).map_err(|e| MosaicError::tile(path, e))?;
        info!(
            path = %path.display(),
            crs = %tile.info().crs,
            width = tile.info().width,
            height = tile.info().height,
            nodata = ?tile.info().nodata,
            "Merging tile"
        );

        let mut view = WarpedView::new(tile, &grid.spec, nodata, self.options.resampling)
            .map_err(|e| MosaicError::tile(path, e))?;

        let scale = self.options.effective_scale();
        let mut stats = TileStats::default();
        for window in grid.spec.tiling(self.options.block_size) {
            let Some(src) = view.read_block(&window).map_err(|e| MosaicError::tile(path, e))? else {
                continue;
            };
            stats.blocks_visited += 1;

            let mut dest = store.read_block(&window)?;
            let dest_valid = self.validity.mask(&dest, nodata);
            let src_valid = self.validity.mask(&src, nodata);

            let written = merge_block(
                &mut dest,
                &src,
                &dest_valid,
                &src_valid,
                scale,
                self.options.merge_policy,
            );
            // an untouched block is already what is on disk
            if written > 0 {
                store.write_block(&window, &dest)?;
                stats.blocks_written += 1;
                stats.pixels_written += written;
            }
            self.progress.block_done(written);
        }

        let cache = view.tile().cache_stats();
        debug!(
            path = %path.display(),
            blocks_visited = stats.blocks_visited,
            cache_hit_rate = cache.hit_rate(),
            "Tile cache"
        );
        info!(
            path = %path.display(),
            blocks = stats.blocks_written,
            pixels = stats.pixels_written,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Tile merged"
        );

        Ok(stats)
    }

    /// The overview step never fails the run.
    fn finish_overviews(&self, store: &mut MosaicStore) -> OverviewOutcome {
        if !self.options.overviews.enabled || self.options.overviews.factors.is_empty() {
            return OverviewOutcome::Disabled;
        }

        match build_overviews(store, &self.options.overviews, self.validity.as_ref()) {
            Ok(summary) => OverviewOutcome::Built(summary),
            Err(e) => {
                warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Overview build failed; full-resolution mosaic is intact"
                );
                if let Err(cleanup) = store.discard_overviews() {
                    warn!(error = %cleanup, "Could not remove partial overview levels");
                }
                OverviewOutcome::Failed(e.to_string())
            }
        }
    }
}
