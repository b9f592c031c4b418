//! Progress callbacks for long mosaic runs.

use std::path::Path;

/// Receives progress events from [`Mosaicker::run`](crate::Mosaicker::run).
///
/// All methods default to doing nothing.
pub trait ProgressSink: Send + Sync {
    fn run_started(&self, _tiles: usize, _blocks_per_tile: usize) {}

    fn tile_started(&self, _index: usize, _path: &Path) {}

    /// A block of the current tile was merged and written back.
    fn block_done(&self, _pixels_written: usize) {}

    fn tile_finished(&self, _index: usize, _path: &Path, _merged: bool) {}

    fn run_finished(&self) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}
