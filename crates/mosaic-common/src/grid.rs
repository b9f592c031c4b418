//! Pixel grids, windows and block tiling.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::crs::Crs;
use crate::geotransform::GeoTransform;

/// A georeferenced pixel lattice: CRS, affine transform and dimensions.
///
/// The reference raster defines one of these and every output (full
/// resolution and overviews) is written on it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub crs: Crs,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    /// Nodata declared by the raster this grid was read from, if any.
    pub nodata: Option<f64>,
}

impl GridSpec {
    pub fn new(crs: Crs, transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            crs,
            transform,
            width,
            height,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// World extent of the whole grid.
    pub fn bbox(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn full_window(&self) -> Window {
        Window::new(0, 0, self.width, self.height)
    }

    /// Row-major block tiling of this grid with square blocks.
    pub fn tiling(&self, block_size: usize) -> BlockTiling {
        BlockTiling::new(self.width, self.height, block_size)
    }

    /// Coarser grid with dimensions `ceil(size / factor)`, same origin and CRS.
    pub fn overview(&self, factor: usize) -> GridSpec {
        let factor = factor.max(1);
        GridSpec {
            crs: self.crs.clone(),
            transform: self.transform.scaled(factor as f64),
            width: self.width.div_ceil(factor),
            height: self.height.div_ceil(factor),
            nodata: self.nodata,
        }
    }
}

/// A rectangular pixel window, `col`/`row` of its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(col: usize, row: usize, width: usize, height: usize) -> Self {
        Self {
            col,
            row,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of two windows, `None` if they are disjoint.
    pub fn intersection(&self, other: &Window) -> Option<Window> {
        let col = self.col.max(other.col);
        let row = self.row.max(other.row);
        let end_col = (self.col + self.width).min(other.col + other.width);
        let end_row = (self.row + self.height).min(other.row + other.height);
        if end_col <= col || end_row <= row {
            return None;
        }
        Some(Window::new(col, row, end_col - col, end_row - row))
    }
}

/// Row-major iterator over the blocks covering a `width` x `height` grid.
///
/// Blocks on the right and bottom edges are clipped to the grid, so every
/// pixel belongs to exactly one block.
#[derive(Debug, Clone)]
pub struct BlockTiling {
    width: usize,
    height: usize,
    block_size: usize,
    next: usize,
}

impl BlockTiling {
    pub fn new(width: usize, height: usize, block_size: usize) -> Self {
        Self {
            width,
            height,
            block_size: block_size.max(1),
            next: 0,
        }
    }

    pub fn blocks_x(&self) -> usize {
        self.width.div_ceil(self.block_size)
    }

    pub fn blocks_y(&self) -> usize {
        self.height.div_ceil(self.block_size)
    }

    /// Total number of blocks, regardless of iteration progress.
    pub fn block_count(&self) -> usize {
        self.blocks_x() * self.blocks_y()
    }

    /// Window of block `(bx, by)`.
    pub fn block(&self, bx: usize, by: usize) -> Window {
        let col = bx * self.block_size;
        let row = by * self.block_size;
        Window::new(
            col,
            row,
            self.block_size.min(self.width - col),
            self.block_size.min(self.height - row),
        )
    }
}

impl Iterator for BlockTiling {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let total = self.block_count();
        if self.next >= total {
            return None;
        }
        let bx = self.next % self.blocks_x();
        let by = self.next / self.blocks_x();
        self.next += 1;
        Some(self.block(bx, by))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.block_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockTiling {}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> GridSpec {
        GridSpec::new(
            Crs::CONUS_ALBERS,
            GeoTransform::north_up(0.0, 1000.0, 10.0, 10.0),
            width,
            height,
        )
    }

    #[test]
    fn test_tiling_covers_every_pixel_once() {
        let g = grid(1300, 700);
        let mut seen = vec![0u8; g.pixel_count()];
        for w in g.tiling(512) {
            for r in w.row..w.row + w.height {
                for c in w.col..w.col + w.width {
                    seen[r * g.width + c] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_edge_blocks_clipped() {
        let tiling = BlockTiling::new(1300, 700, 512);
        assert_eq!(tiling.len(), 6);
        let blocks: Vec<Window> = tiling.collect();
        assert_eq!(blocks[0], Window::new(0, 0, 512, 512));
        assert_eq!(blocks[2], Window::new(1024, 0, 276, 512));
        assert_eq!(blocks[5], Window::new(1024, 512, 276, 188));
    }

    #[test]
    fn test_grid_bbox() {
        let g = grid(100, 50);
        assert_eq!(g.bbox(), BoundingBox::new(0.0, 500.0, 1000.0, 1000.0));
    }

    #[test]
    fn test_overview_dims_round_up() {
        let g = grid(1001, 999);
        let o = g.overview(4);
        assert_eq!((o.width, o.height), (251, 250));
        assert_eq!(o.transform.pixel_width, 40.0);
        assert_eq!(o.transform.origin_y, 1000.0);
    }

    #[test]
    fn test_window_intersection() {
        let a = Window::new(0, 0, 10, 10);
        assert_eq!(
            a.intersection(&Window::new(5, 8, 10, 10)),
            Some(Window::new(5, 8, 5, 2))
        );
        assert_eq!(a.intersection(&Window::new(10, 0, 5, 5)), None);
    }
}
