//! Zarr V3 mosaic store.
//!
//! Layout on disk:
//!
//! ```text
//! <output>/zarr.json   group, attributes describe the raster profile
//! <output>/0/          full-resolution float32 array [height, width]
//! <output>/1 .. /N     overview arrays
//! ```
//!
//! Chunks are `block_size` square, so every block read or write touches
//! exactly one chunk.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use mosaic_common::{Crs, GeoTransform, GridSpec, Window};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::config::{Compression, MergeOptions};
use crate::error::{MosaicError, Result};

/// Format identity recorded in the group attributes.
pub const DRIVER: &str = "zarr-v3";

/// Metadata document marking a directory as a Zarr V3 node.
const ZARR_JSON: &str = "zarr.json";

/// One resolution level of the mosaic.
struct Level {
    factor: usize,
    grid: GridSpec,
    array: Array<FilesystemStore>,
}

/// The mosaic output, open for block-wise read-modify-write.
///
/// Created once per run and owned by the driver until [`finish`](Self::finish).
pub struct MosaicStore {
    path: PathBuf,
    store: Arc<FilesystemStore>,
    group: Group<FilesystemStore>,
    block_size: usize,
    nodata: f32,
    compression: Compression,
    compression_level: u8,
    predictor: bool,
    levels: Vec<Level>,
}

impl MosaicStore {
    /// Create a fresh store at `path` on `grid`.
    ///
    /// Missing parent directories are created. An existing mosaic store at
    /// `path` is replaced; anything else already there is a storage error.
    pub fn create(path: &Path, grid: &GridSpec, nodata: f32, options: &MergeOptions) -> Result<Self> {
        let payload = (grid.pixel_count() as u64) * std::mem::size_of::<f32>() as u64;
        let large_file = options
            .large_file_mode
            .resolve(payload)
            .map_err(|e| MosaicError::storage(format!("{}: {}", path.display(), e)))?;

        prepare_output_dir(path)?;
        let store = Arc::new(open_filesystem(path)?);

        let mut attrs = Map::new();
        attrs.insert("driver".to_string(), json!(DRIVER));
        attrs.insert("width".to_string(), json!(grid.width));
        attrs.insert("height".to_string(), json!(grid.height));
        attrs.insert("crs".to_string(), json!(grid.crs.to_string()));
        attrs.insert("transform".to_string(), json!(grid.transform.to_gdal()));
        attrs.insert("nodata".to_string(), nodata_to_json(nodata));
        attrs.insert("block_size".to_string(), json!(options.block_size));
        attrs.insert("compression".to_string(), json!(options.compression.as_str()));
        attrs.insert("compression_level".to_string(), json!(options.compression_level));
        attrs.insert("predictor".to_string(), json!(options.predictor));
        attrs.insert("large_file".to_string(), json!(large_file));
        attrs.insert("large_file_mode".to_string(), json!(options.large_file_mode.as_str()));
        attrs.insert("scale_factor".to_string(), json!(options.scale_factor));
        attrs.insert("merge_policy".to_string(), json!(options.merge_policy.as_str()));
        attrs.insert("resampling".to_string(), json!(options.resampling.as_str()));
        attrs.insert("created".to_string(), json!(Utc::now().to_rfc3339()));

        let group = GroupBuilder::new()
            .attributes(attrs)
            .build(store.clone(), "/")
            .map_err(|e| storage_error(path, e))?;
        group.store_metadata().map_err(|e| storage_error(path, e))?;

        let mut this = Self {
            path: path.to_path_buf(),
            store,
            group,
            block_size: options.block_size,
            nodata,
            compression: options.compression,
            compression_level: options.compression_level,
            predictor: options.predictor,
            levels: Vec::new(),
        };
        let full = this.build_level(grid.clone(), 1, 0)?;
        this.levels.push(full);

        info!(
            path = %path.display(),
            width = grid.width,
            height = grid.height,
            block_size = options.block_size,
            compression = %options.compression,
            large_file = large_file,
            "Created mosaic store"
        );

        Ok(this)
    }

    /// Open an existing mosaic store, including any recorded overviews.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Arc::new(open_filesystem(path)?);
        let group = Group::open(store.clone(), "/").map_err(|e| storage_error(path, e))?;
        let attrs = group.attributes();

        let driver = attrs.get("driver").and_then(Value::as_str);
        if driver != Some(DRIVER) {
            return Err(MosaicError::storage(format!(
                "{} is not a mosaic store (driver {:?})",
                path.display(),
                driver
            )));
        }

        let width = attr_u64(attrs, "width", path)? as usize;
        let height = attr_u64(attrs, "height", path)? as usize;
        let block_size = attr_u64(attrs, "block_size", path)? as usize;
        let crs = attrs
            .get("crs")
            .and_then(Value::as_str)
            .and_then(|s| Crs::from_str(s).ok())
            .ok_or_else(|| missing_attr(path, "crs"))?;
        let transform: [f64; 6] = attrs
            .get("transform")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .ok_or_else(|| missing_attr(path, "transform"))?;
        let nodata = attrs
            .get("nodata")
            .and_then(nodata_from_json)
            .ok_or_else(|| missing_attr(path, "nodata"))?;
        let compression = attrs
            .get("compression")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Compression::None);
        let compression_level = attrs
            .get("compression_level")
            .and_then(Value::as_u64)
            .unwrap_or(5) as u8;
        let predictor = attrs.get("predictor").and_then(Value::as_bool).unwrap_or(false);
        let factors: Vec<usize> = attrs
            .get("overviews")
            .and_then(|o| o.get("factors"))
            .and_then(|f| serde_json::from_value(f.clone()).ok())
            .unwrap_or_default();

        let grid = GridSpec::new(crs, GeoTransform::from_gdal(transform), width, height)
            .with_nodata(Some(nodata as f64));

        let mut levels = Vec::with_capacity(factors.len() + 1);
        for (index, factor) in std::iter::once(1).chain(factors).enumerate() {
            let array = Array::open(store.clone(), &level_path(index)).map_err(|e| storage_error(path, e))?;
            levels.push(Level {
                factor,
                grid: grid.overview(factor),
                array,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            store,
            group,
            block_size,
            nodata,
            compression,
            compression_level,
            predictor,
            levels,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full-resolution grid.
    pub fn grid(&self) -> &GridSpec {
        &self.levels[0].grid
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of levels, full resolution included.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Grid and decimation factor of a level.
    pub fn level(&self, index: usize) -> Option<(&GridSpec, usize)> {
        self.levels.get(index).map(|l| (&l.grid, l.factor))
    }

    /// Read a full-resolution block.
    pub fn read_block(&self, window: &Window) -> Result<Vec<f32>> {
        self.read_window(0, window)
    }

    /// Write a full-resolution block.
    pub fn write_block(&self, window: &Window, data: &[f32]) -> Result<()> {
        self.write_window(0, window, data)
    }

    /// Read `window` of level `index`, row-major.
    pub fn read_window(&self, index: usize, window: &Window) -> Result<Vec<f32>> {
        let level = self.level_checked(index, window)?;
        let subset = subset(window, &self.path)?;
        level
            .array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(|e| storage_error(&self.path, e))
    }

    /// Write `data` (row-major, `window.len()` values) into level `index`.
    pub fn write_window(&self, index: usize, window: &Window, data: &[f32]) -> Result<()> {
        let level = self.level_checked(index, window)?;
        if data.len() != window.len() {
            return Err(MosaicError::storage(format!(
                "{}: block of {} values does not match window {:?}",
                self.path.display(),
                data.len(),
                window
            )));
        }
        let subset = subset(window, &self.path)?;
        level
            .array
            .store_array_subset_elements::<f32>(&subset, data)
            .map_err(|e| storage_error(&self.path, e))
    }

    /// Append an overview level decimated by `factor` relative to full
    /// resolution. Returns its level index.
    pub fn add_level(&mut self, factor: usize) -> Result<usize> {
        let index = self.levels.len();
        let grid = self.grid().overview(factor);
        let level = self.build_level(grid, factor, index)?;
        self.levels.push(level);
        Ok(index)
    }

    /// Remove every overview level, on disk and in memory.
    pub fn discard_overviews(&mut self) -> Result<()> {
        while self.levels.len() > 1 {
            let index = self.levels.len() - 1;
            self.levels.pop();
            let dir = self.path.join(index.to_string());
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(|e| storage_error(&dir, e))?;
            }
        }
        self.group.attributes_mut().remove("overviews");
        self.group.store_metadata().map_err(|e| storage_error(&self.path, e))
    }

    /// Set a group attribute and persist the group metadata.
    pub fn set_attribute(&mut self, key: &str, value: Value) -> Result<()> {
        self.group.attributes_mut().insert(key.to_string(), value);
        self.group.store_metadata().map_err(|e| storage_error(&self.path, e))
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        self.group.attributes()
    }

    /// Close the store.
    pub fn finish(self) -> Result<PathBuf> {
        self.group.store_metadata().map_err(|e| storage_error(&self.path, e))?;
        debug!(path = %self.path.display(), levels = self.levels.len(), "Closed mosaic store");
        Ok(self.path)
    }

    fn level_checked(&self, index: usize, window: &Window) -> Result<&Level> {
        let level = self.levels.get(index).ok_or_else(|| {
            MosaicError::storage(format!("{}: no level {}", self.path.display(), index))
        })?;
        if window.col + window.width > level.grid.width || window.row + window.height > level.grid.height {
            return Err(MosaicError::storage(format!(
                "{}: window {:?} outside level {} ({}x{})",
                self.path.display(),
                window,
                index,
                level.grid.width,
                level.grid.height
            )));
        }
        Ok(level)
    }

    fn build_level(&self, grid: GridSpec, factor: usize, index: usize) -> Result<Level> {
        let mut attrs = Map::new();
        attrs.insert("factor".to_string(), json!(factor));

        let chunk_grid: zarrs::array::ChunkGrid = vec![self.block_size as u64, self.block_size as u64]
            .try_into()
            .map_err(|e| MosaicError::configuration(format!("invalid block size: {:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            vec![grid.height as u64, grid.width as u64],
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let mut builder = binding.attributes(attrs);
        if let Some(codec) = self.compression_codec()? {
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(self.store.clone(), &level_path(index))
            .map_err(|e| storage_error(&self.path, e))?;
        array.store_metadata().map_err(|e| storage_error(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            level = index,
            factor = factor,
            width = grid.width,
            height = grid.height,
            "Created level array"
        );

        Ok(Level { factor, grid, array })
    }

    fn compression_codec(&self) -> Result<Option<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>>> {
        let compressor = match self.compression {
            Compression::None => return Ok(None),
            Compression::Lz4 => BloscCompressor::LZ4,
            Compression::Zstd => BloscCompressor::Zstd,
            Compression::Zlib => BloscCompressor::Zlib,
        };

        let level = BloscCompressionLevel::try_from(self.compression_level)
            .map_err(|_| MosaicError::configuration("compression_level must be 1-9"))?;

        // typesize is required when shuffling
        let (shuffle, typesize) = if self.predictor {
            (BloscShuffleMode::Shuffle, Some(std::mem::size_of::<f32>()))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| MosaicError::configuration(e.to_string()))?;
        Ok(Some(Arc::new(codec)))
    }
}

/// Node path of level `index`.
fn level_path(index: usize) -> String {
    format!("/{}", index)
}

/// Zarr indexes `[row, col]`.
fn subset(window: &Window, path: &Path) -> Result<ArraySubset> {
    ArraySubset::new_with_start_shape(
        vec![window.row as u64, window.col as u64],
        vec![window.height as u64, window.width as u64],
    )
    .map_err(|e| storage_error(path, e))
}

fn open_filesystem(path: &Path) -> Result<FilesystemStore> {
    FilesystemStore::new(path).map_err(|e| storage_error(path, e))
}

/// Make `path` an empty directory, creating parents as needed.
fn prepare_output_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(MosaicError::storage(format!(
                "{} exists and is not a directory; remove it or choose another output path",
                path.display()
            )));
        }
        if path.join(ZARR_JSON).is_file() {
            debug!(path = %path.display(), "Replacing existing mosaic store");
            std::fs::remove_dir_all(path).map_err(|e| storage_error(path, e))?;
        } else {
            let mut entries = std::fs::read_dir(path).map_err(|e| storage_error(path, e))?;
            if entries.next().is_some() {
                return Err(MosaicError::storage(format!(
                    "{} is a non-empty directory that is not a mosaic store; \
                     remove it or choose another output path",
                    path.display()
                )));
            }
        }
    }

    std::fs::create_dir_all(path).map_err(|e| {
        MosaicError::storage(format!(
            "cannot create output directory {}: {}; check that the location is writable",
            path.display(),
            e
        ))
    })
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> MosaicError {
    MosaicError::storage(format!("{}: {}", path.display(), e))
}

fn missing_attr(path: &Path, key: &str) -> MosaicError {
    MosaicError::storage(format!("{}: missing or invalid attribute '{}'", path.display(), key))
}

fn attr_u64(attrs: &Map<String, Value>, key: &str, path: &Path) -> Result<u64> {
    attrs
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing_attr(path, key))
}

/// JSON has no NaN; a NaN nodata is stored as the string `"nan"`.
fn nodata_to_json(nodata: f32) -> Value {
    if nodata.is_nan() {
        json!("nan")
    } else {
        json!(nodata as f64)
    }
}

fn nodata_from_json(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) if s.eq_ignore_ascii_case("nan") => Some(f32::NAN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LargeFileMode;
    use test_utils::lattice_transform;

    fn grid(width: usize, height: usize) -> GridSpec {
        GridSpec::new(Crs::CONUS_ALBERS, lattice_transform(0, 0), width, height)
    }

    fn options(block_size: usize) -> MergeOptions {
        MergeOptions {
            block_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_writes_profile_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/mosaic.zarr");
        let store = MosaicStore::create(&path, &grid(10, 6), -9999.0, &options(4)).unwrap();

        assert!(path.join("zarr.json").is_file());
        assert!(path.join("0").join("zarr.json").is_file());
        let attrs = store.attributes();
        assert_eq!(attrs["driver"], json!("zarr-v3"));
        assert_eq!(attrs["width"], json!(10));
        assert_eq!(attrs["crs"], json!("EPSG:5070"));
        assert_eq!(attrs["nodata"], json!(-9999.0));
        assert_eq!(attrs["compression"], json!("lz4"));
        assert_eq!(attrs["large_file"], json!(false));
        store.finish().unwrap();
    }

    #[test]
    fn test_block_roundtrip_on_clipped_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.zarr");
        let store = MosaicStore::create(&path, &grid(10, 6), -9999.0, &options(4)).unwrap();

        let edge = Window::new(8, 4, 2, 2);
        store.write_block(&edge, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(store.read_block(&edge).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

        assert!(store.read_block(&Window::new(8, 4, 4, 4)).is_err());
        assert!(store.write_block(&edge, &[1.0]).is_err());
    }

    #[test]
    fn test_reopen_reads_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.zarr");
        let mut store = MosaicStore::create(&path, &grid(9, 9), f32::NAN, &options(4)).unwrap();
        store.add_level(2).unwrap();
        store
            .set_attribute("overviews", json!({"factors": [2], "paths": ["1"], "resampling": "average"}))
            .unwrap();
        store.finish().unwrap();

        let reopened = MosaicStore::open(&path).unwrap();
        assert!(reopened.nodata().is_nan());
        let full = reopened.grid();
        assert_eq!((full.width, full.height, full.crs.clone()), (9, 9, Crs::CONUS_ALBERS));
        assert!(full.transform.approx_eq(&lattice_transform(0, 0), 1e-12));
        assert_eq!(reopened.level_count(), 2);
        let (ov, factor) = reopened.level(1).unwrap();
        assert_eq!((ov.width, ov.height, factor), (5, 5, 2));
    }

    #[test]
    fn test_replaces_existing_store_but_not_foreign_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.zarr");
        MosaicStore::create(&path, &grid(4, 4), 0.0, &options(2)).unwrap().finish().unwrap();
        MosaicStore::create(&path, &grid(4, 4), 0.0, &options(2)).unwrap();

        let foreign = dir.path().join("foreign");
        std::fs::create_dir_all(&foreign).unwrap();
        std::fs::write(foreign.join("keep.txt"), b"x").unwrap();
        let err = MosaicStore::create(&foreign, &grid(4, 4), 0.0, &options(2)).err().unwrap();
        assert!(matches!(err, MosaicError::Storage(_)));
        assert!(foreign.join("keep.txt").exists());
    }

    #[test]
    fn test_large_file_no_rejects_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.zarr");
        let opts = MergeOptions {
            large_file_mode: LargeFileMode::No,
            ..Default::default()
        };
        let err = MosaicStore::create(&path, &grid(40_000, 30_000), -9999.0, &opts).err().unwrap();
        assert!(matches!(err, MosaicError::Storage(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_discard_overviews() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.zarr");
        let mut store = MosaicStore::create(&path, &grid(8, 8), 0.0, &options(4)).unwrap();
        store.add_level(2).unwrap();
        assert!(path.join("1").exists());
        store.discard_overviews().unwrap();
        assert_eq!(store.level_count(), 1);
        assert!(!path.join("1").exists());
    }
}
