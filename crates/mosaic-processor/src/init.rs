//! Output initialization.

use tracing::debug;

use crate::error::Result;
use crate::store::MosaicStore;

/// Fill the full-resolution level with `nodata`, one block at a time.
///
/// The store's fill value is never relied on. Edge blocks are clipped to
/// the grid. Returns the number of blocks written.
pub fn initialize(store: &MosaicStore, nodata: f32) -> Result<usize> {
    let tiling = store.grid().tiling(store.block_size());
    let full = vec![nodata; store.block_size() * store.block_size()];

    let mut written = 0;
    for window in tiling {
        store.write_block(&window, &full[..window.len()])?;
        written += 1;
    }

    debug!(path = %store.path().display(), blocks = written, nodata = nodata, "Initialized mosaic");
    Ok(written)
}
