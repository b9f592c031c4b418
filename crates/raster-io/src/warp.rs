//! Virtual reprojection of a tile onto a target grid.

use mosaic_common::{BoundingBox, GridSpec, Window};
use projection::CrsTransformer;
use tracing::{debug, warn};

use crate::error::{RasterError, Result};
use crate::resample::Resampling;
use crate::tile::GeoTiffTile;

/// Points sampled along each edge when projecting the tile extent.
const FOOTPRINT_DENSIFY: usize = 21;

/// A tile seen through the target grid.
///
/// Nothing is materialized: each [`read_block`](WarpedView::read_block)
/// maps the block's pixel centres back into the tile and samples them there.
pub struct WarpedView {
    tile: GeoTiffTile,
    grid: GridSpec,
    dst_nodata: f32,
    resampling: Resampling,
    /// Target grid CRS to tile CRS.
    to_tile: CrsTransformer,
    footprint: Option<Window>,
}

impl WarpedView {
    pub fn new(tile: GeoTiffTile, grid: &GridSpec, dst_nodata: f32, resampling: Resampling) -> Result<Self> {
        let path = tile.path().to_path_buf();
        let info = tile.info();

        if info.crs.is_unknown() && grid.crs.is_unknown() {
            warn!(
                path = %path.display(),
                "Tile and reference both lack a readable CRS; assuming they share one and merging without reprojection"
            );
        }
        let to_grid = CrsTransformer::new(info.crs.clone(), grid.crs.clone())
            .map_err(|e| RasterError::projection(&path, e))?;
        let to_tile = CrsTransformer::new(grid.crs.clone(), info.crs.clone())
            .map_err(|e| RasterError::projection(&path, e))?;

        let tile_bounds = info.transform.bounds(info.width, info.height);
        let dst_bounds = to_grid
            .transform_bounds(&tile_bounds, FOOTPRINT_DENSIFY)
            .map_err(|e| RasterError::projection(&path, e))?;
        let footprint = footprint(grid, &dst_bounds, resampling.radius() + 1);

        debug!(
            path = %path.display(),
            footprint = ?footprint,
            resampling = %resampling,
            "Warped view ready"
        );

        Ok(Self {
            tile,
            grid: grid.clone(),
            dst_nodata,
            resampling,
            to_tile,
            footprint,
        })
    }

    /// Target-grid window the tile can contribute to, if any.
    pub fn footprint(&self) -> Option<Window> {
        self.footprint
    }

    pub fn tile(&self) -> &GeoTiffTile {
        &self.tile
    }

    /// Reprojected values for `window`, row-major.
    ///
    /// Returns `None` when the window is outside the tile's footprint.
    /// Pixels without a valid source value are `dst_nodata`.
    pub fn read_block(&mut self, window: &Window) -> Result<Option<Vec<f32>>> {
        let Some(footprint) = self.footprint else {
            return Ok(None);
        };
        if footprint.intersection(window).is_none() {
            return Ok(None);
        }

        let mut out = vec![self.dst_nodata; window.len()];
        let tile_transform = self.tile.info().transform;
        let grid_transform = self.grid.transform;
        let resampling = self.resampling;
        let tile_w = self.tile.info().width as f64;
        let tile_h = self.tile.info().height as f64;
        let tile = &mut self.tile;

        for r in 0..window.height {
            let row = window.row + r;
            if row < footprint.row || row >= footprint.row + footprint.height {
                continue;
            }
            for c in 0..window.width {
                let col = window.col + c;
                if col < footprint.col || col >= footprint.col + footprint.width {
                    continue;
                }

                let (x, y) = grid_transform.pixel_center(col, row);
                let Ok((tx, ty)) = self.to_tile.transform(x, y) else {
                    continue;
                };
                let Ok((sx, sy)) = tile_transform.world_to_pixel(tx, ty) else {
                    continue;
                };
                if sx < 0.0 || sy < 0.0 || sx >= tile_w || sy >= tile_h {
                    continue;
                }

                if let Some(v) = resampling.sample(sx, sy, &mut |sc, sr| tile.value(sc, sr))? {
                    out[r * window.width + c] = v;
                }
            }
        }

        Ok(Some(out))
    }
}

/// Grid window covering `bounds`, padded by `pad` pixels and clipped to the grid.
fn footprint(grid: &GridSpec, bounds: &BoundingBox, pad: usize) -> Option<Window> {
    let pixel = grid.transform.pixel_width.abs().max(grid.transform.pixel_height.abs());
    let clipped = bounds.expand(pad as f64 * pixel).intersection(&grid.bbox())?;
    let corners = [
        (clipped.min_x, clipped.min_y),
        (clipped.max_x, clipped.min_y),
        (clipped.min_x, clipped.max_y),
        (clipped.max_x, clipped.max_y),
    ];

    let mut min_c = f64::INFINITY;
    let mut min_r = f64::INFINITY;
    let mut max_c = f64::NEG_INFINITY;
    let mut max_r = f64::NEG_INFINITY;
    for (x, y) in corners {
        let (c, r) = grid.transform.world_to_pixel(x, y).ok()?;
        min_c = min_c.min(c);
        min_r = min_r.min(r);
        max_c = max_c.max(c);
        max_r = max_r.max(r);
    }

    let c0 = min_c.floor().max(0.0);
    let r0 = min_r.floor().max(0.0);
    let c1 = max_c.ceil().min(grid.width as f64);
    let r1 = max_r.ceil().min(grid.height as f64);
    if c1 <= c0 || r1 <= r0 {
        return None;
    }

    Some(Window::new(
        c0 as usize,
        r0 as usize,
        (c1 - c0) as usize,
        (r1 - r0) as usize,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_common::{Crs, GeoTransform};

    fn grid() -> GridSpec {
        GridSpec::new(
            Crs::CONUS_ALBERS,
            GeoTransform::north_up(0.0, 1000.0, 10.0, 10.0),
            100,
            100,
        )
    }

    #[test]
    fn test_footprint_inside() {
        let fp = footprint(&grid(), &BoundingBox::new(200.0, 500.0, 300.0, 600.0), 1).unwrap();
        assert_eq!(fp, Window::new(19, 39, 12, 12));
    }

    #[test]
    fn test_footprint_clipped() {
        let fp = footprint(&grid(), &BoundingBox::new(-500.0, 900.0, 50.0, 2000.0), 0).unwrap();
        assert_eq!(fp, Window::new(0, 0, 5, 10));
    }

    #[test]
    fn test_footprint_disjoint() {
        assert!(footprint(&grid(), &BoundingBox::new(5000.0, 0.0, 6000.0, 100.0), 1).is_none());
    }
}
