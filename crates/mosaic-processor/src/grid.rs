//! Canonical output grid from a reference raster.

use std::path::Path;

use mosaic_common::GridSpec;
use raster_io::GeoTiffInfo;
use tracing::info;

use crate::error::{MosaicError, Result};

/// Nodata written when neither the options nor the reference declare one.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// The output lattice and the nodata value written into it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGrid {
    /// Reference lattice; `spec.nodata` is the output nodata.
    pub spec: GridSpec,
    pub output_nodata: f32,
}

/// Read the reference raster's lattice and pick the output nodata.
///
/// Nodata precedence: `nodata_override`, then the reference's own nodata,
/// then [`DEFAULT_NODATA`]. The reference is only read, never modified.
pub fn resolve_grid(reference: &Path, nodata_override: Option<f64>) -> Result<ResolvedGrid> {
    let info = GeoTiffInfo::open(reference).map_err(|e| {
        MosaicError::configuration(format!(
            "cannot read reference raster {}: {}; point the reference path at a readable \
             single-band GeoTIFF",
            reference.display(),
            e
        ))
    })?;

    let nodata = nodata_override.or(info.nodata).unwrap_or(DEFAULT_NODATA);
    let spec = info.grid().with_nodata(Some(nodata));

    info!(
        reference = %reference.display(),
        crs = %spec.crs,
        width = spec.width,
        height = spec.height,
        nodata = nodata,
        "Resolved output grid"
    );

    Ok(ResolvedGrid {
        spec,
        output_nodata: nodata as f32,
    })
}
