//! An open input tile with lazily decoded chunks.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tiff::decoder::{Decoder, DecodingResult};
use tracing::debug;

use crate::cache::{CacheStats, Chunk, ChunkCache};
use crate::error::{RasterError, Result};
use crate::geotiff::{open_decoder, GeoTiffInfo};

/// A GeoTIFF opened for random pixel access.
///
/// Pixels are decoded one strip or tile at a time, on first touch, and kept
/// in a byte-bounded LRU cache. The whole image is never decoded at once.
pub struct GeoTiffTile {
    info: GeoTiffInfo,
    decoder: Decoder<BufReader<File>>,
    cache: ChunkCache,
    nodata: Option<f32>,
    /// Chunk served by the previous lookup; consecutive pixels nearly always
    /// land in the same one.
    last: Option<(u32, Chunk)>,
}

impl GeoTiffTile {
    /// Open `path`, allowing up to `cache_bytes` of decoded chunks in memory.
    ///
    /// A raster whose single strip or tile would not fit in that budget is
    /// rejected up front rather than decoded whole.
    pub fn open(path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        let info = GeoTiffInfo::read(&mut decoder, path)?;

        let chunk_bytes = info.layout.chunk_bytes();
        if chunk_bytes > cache_bytes {
            return Err(RasterError::unsupported(
                path,
                format!(
                    "one {:?} of {}x{} pixels needs {} bytes decoded, more than the {} byte tile cache; \
                     retile the input (gdal_translate -co TILED=YES) or raise tile_cache_mb",
                    info.layout.kind,
                    info.layout.chunk_width,
                    info.layout.chunk_height,
                    chunk_bytes,
                    cache_bytes
                ),
            ));
        }
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            crs = %info.crs,
            nodata = ?info.nodata,
            chunks = info.layout.chunk_count(),
            "Opened tile"
        );

        Ok(Self {
            nodata: info.nodata.map(|v| v as f32),
            info,
            decoder,
            cache: ChunkCache::new(cache_bytes),
            last: None,
        })
    }

    pub fn info(&self) -> &GeoTiffInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Valid value at `(col, row)`.
    ///
    /// `None` when the pixel is outside the image, non-finite or equal to the
    /// tile's nodata.
    pub fn value(&mut self, col: i64, row: i64) -> Result<Option<f32>> {
        if col < 0 || row < 0 || col as usize >= self.info.width || row as usize >= self.info.height {
            return Ok(None);
        }
        let v = self.raw_value(col as usize, row as usize)?;
        if !v.is_finite() || Some(v) == self.nodata {
            return Ok(None);
        }
        Ok(Some(v))
    }

    /// Stored value at an in-extent pixel, nodata included.
    pub fn raw_value(&mut self, col: usize, row: usize) -> Result<f32> {
        let (index, x, y) = self.info.layout.locate(col, row);
        let chunk = self.chunk(index)?;
        chunk
            .data
            .get(y * chunk.width + x)
            .copied()
            .ok_or_else(|| RasterError::decode(&self.info.path, format!("pixel ({}, {}) outside chunk {}", col, row, index)))
    }

    fn chunk(&mut self, index: u32) -> Result<Chunk> {
        if let Some((last, chunk)) = &self.last {
            if *last == index {
                return Ok(chunk.clone());
            }
        }

        let chunk = match self.cache.get(index) {
            Some(chunk) => chunk,
            None => {
                let chunk = self.decode_chunk(index)?;
                self.cache.insert(index, chunk.clone());
                chunk
            }
        };
        self.last = Some((index, chunk.clone()));
        Ok(chunk)
    }

    fn decode_chunk(&mut self, index: u32) -> Result<Chunk> {
        let path = &self.info.path;
        let result = self
            .decoder
            .read_chunk(index)
            .map_err(|e| RasterError::decode(path, format!("chunk {}: {}", index, e)))?;
        let data = to_f32(result).ok_or_else(|| RasterError::unsupported(path, "unsupported sample type"))?;

        // Edge chunks may come back either cropped or padded to full size
        let layout = &self.info.layout;
        let cx = index as usize % layout.chunks_across;
        let cy = index as usize / layout.chunks_across;
        let cropped_w = layout.chunk_width.min(self.info.width - cx * layout.chunk_width);
        let cropped_h = layout.chunk_height.min(self.info.height - cy * layout.chunk_height);

        let width = if data.len() == cropped_w * cropped_h {
            cropped_w
        } else if data.len() == layout.chunk_width * layout.chunk_height {
            layout.chunk_width
        } else {
            return Err(RasterError::decode(
                path,
                format!(
                    "chunk {} has {} samples, expected {}x{}",
                    index,
                    data.len(),
                    cropped_w,
                    cropped_h
                ),
            ));
        };

        Ok(Chunk {
            width,
            data: Arc::from(data),
        })
    }
}

fn to_f32(result: DecodingResult) -> Option<Vec<f32>> {
    Some(match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}
