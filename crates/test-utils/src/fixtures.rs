//! Common test fixtures for mosaic tests.
//!
//! All fixtures live on one 30 m CONUS Albers lattice, so a tile placed at
//! pixel offset `(col, row)` lines up exactly with the reference grid.

use std::path::{Path, PathBuf};

use mosaic_common::GeoTransform;
use tempfile::TempDir;

use crate::geotiff::GeoTiffFixture;

/// Upper-left corner of the test lattice, EPSG:5070 metres.
pub const ORIGIN_X: f64 = -1_000_020.0;
pub const ORIGIN_Y: f64 = 1_500_030.0;

/// Pixel size of the test lattice in metres.
pub const PIXEL_SIZE: f64 = 30.0;

/// Nodata used by the encoded u16 input tiles.
pub const TILE_NODATA: u16 = 65535;

/// Transform of the lattice shifted by whole pixels.
pub fn lattice_transform(col_offset: i64, row_offset: i64) -> GeoTransform {
    GeoTransform::north_up(
        ORIGIN_X + col_offset as f64 * PIXEL_SIZE,
        ORIGIN_Y - row_offset as f64 * PIXEL_SIZE,
        PIXEL_SIZE,
        PIXEL_SIZE,
    )
}

/// A temporary working tree: `inputs/`, a reference raster and an output path.
pub struct MosaicScenario {
    pub dir: TempDir,
    pub input_dir: PathBuf,
    pub reference: PathBuf,
    pub output: PathBuf,
}

impl MosaicScenario {
    /// Create the tree with a `width` x `height` f32 reference raster.
    pub fn new(width: u32, height: u32, reference_nodata: Option<f64>) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let input_dir = dir.path().join("inputs");
        std::fs::create_dir_all(&input_dir).expect("create input dir");

        let reference = dir.path().join("reference.tif");
        let mut fixture = GeoTiffFixture::new(width, height, lattice_transform(0, 0));
        if let Some(nodata) = reference_nodata {
            fixture = fixture.nodata(nodata);
        }
        let zeros = vec![0.0f32; (width * height) as usize];
        fixture.write_f32(&reference, &zeros).expect("write reference");

        let output = dir.path().join("out").join("mosaic.zarr");
        Self {
            dir,
            input_dir,
            reference,
            output,
        }
    }

    /// Write an encoded u16 tile at a pixel offset of the reference lattice.
    pub fn add_tile(
        &self,
        name: &str,
        col_offset: i64,
        row_offset: i64,
        width: u32,
        height: u32,
        data: &[u16],
    ) -> PathBuf {
        let path = self.input_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create tile dir");
        }
        GeoTiffFixture::new(width, height, lattice_transform(col_offset, row_offset))
            .nodata(TILE_NODATA as f64)
            .write_u16(&path, data)
            .expect("write tile");
        path
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_transform_offsets() {
        let gt = lattice_transform(2, 3);
        assert_eq!(gt.origin_x, ORIGIN_X + 60.0);
        assert_eq!(gt.origin_y, ORIGIN_Y - 90.0);
        assert_eq!(gt.pixel_height, -PIXEL_SIZE);
    }

    #[test]
    fn test_scenario_layout() {
        let scenario = MosaicScenario::new(8, 4, Some(-9999.0));
        assert!(scenario.reference.exists());
        assert!(scenario.input_dir.is_dir());
        assert!(!scenario.output.exists());

        let tile = scenario.add_tile("a.tif", 0, 0, 2, 2, &[1, 2, 3, 4]);
        assert!(tile.exists());
    }
}
