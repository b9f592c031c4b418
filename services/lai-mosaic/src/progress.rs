//! Terminal progress bar over the tiles of one mosaic.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use mosaic_processor::ProgressSink;

pub struct TileProgressBar {
    bar: ProgressBar,
    label: String,
}

impl TileProgressBar {
    pub fn new(label: impl Into<String>) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {prefix} {bar:40.cyan/blue} {pos}/{len} tiles {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);

        let label = label.into();
        bar.set_prefix(label.clone());
        Self { bar, label }
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            label: String::new(),
        }
    }
}

impl ProgressSink for TileProgressBar {
    fn run_started(&self, tiles: usize, _blocks_per_tile: usize) {
        self.bar.set_length(tiles as u64);
    }

    fn tile_started(&self, _index: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
    }

    fn tile_finished(&self, _index: usize, _path: &Path, _merged: bool) {
        self.bar.inc(1);
    }

    fn run_finished(&self) {
        self.bar.finish_with_message(format!("{} done", self.label));
    }
}
