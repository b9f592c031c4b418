//! GeoTIFF metadata: georeferencing, nodata and chunk layout.
//!
//! Tags are looked up by numeric code. The GeoTIFF and GDAL private tags are
//! not part of baseline TIFF, so every lookup goes through
//! [`Tag::from_u16_exhaustive`] to get the same key the decoder stored.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use mosaic_common::{Crs, GeoTransform, GridSpec};
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{RasterError, Result};
use crate::geokeys::{GeoKeys, GEO_DOUBLE_PARAMS, GT_RASTER_TYPE, RASTER_PIXEL_IS_POINT};

pub const MODEL_PIXEL_SCALE: u16 = 33550;
pub const MODEL_TIEPOINT: u16 = 33922;
pub const MODEL_TRANSFORMATION: u16 = 34264;
pub const GEO_KEY_DIRECTORY: u16 = 34735;
pub const GDAL_NODATA: u16 = 42113;

const TILE_WIDTH: u16 = 322;
const SAMPLE_FORMAT: u16 = 339;

/// How pixel data is chunked on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Strip,
    Tile,
}

/// Chunk geometry of an image: strips are full-width chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub kind: ChunkKind,
    pub chunk_width: usize,
    pub chunk_height: usize,
    pub chunks_across: usize,
    pub chunks_down: usize,
}

impl ChunkLayout {
    /// Chunk index and in-chunk offset for pixel `(col, row)`.
    pub fn locate(&self, col: usize, row: usize) -> (u32, usize, usize) {
        let cx = col / self.chunk_width;
        let cy = row / self.chunk_height;
        let index = (cy * self.chunks_across + cx) as u32;
        (index, col - cx * self.chunk_width, row - cy * self.chunk_height)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks_across * self.chunks_down
    }

    /// Decoded size of one chunk as f32 samples.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_width * self.chunk_height * std::mem::size_of::<f32>()
    }
}

/// Sample type of the single band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl SampleType {
    fn from_format(format: u16, bits: u8) -> Option<Self> {
        Some(match (format, bits) {
            (1, 8) => SampleType::U8,
            (1, 16) => SampleType::U16,
            (1, 32) => SampleType::U32,
            (1, 64) => SampleType::U64,
            (2, 8) => SampleType::I8,
            (2, 16) => SampleType::I16,
            (2, 32) => SampleType::I32,
            (2, 64) => SampleType::I64,
            (3, 32) => SampleType::F32,
            (3, 64) => SampleType::F64,
            _ => return None,
        })
    }
}

/// Everything the pipeline needs to know about a GeoTIFF without reading pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffInfo {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<f64>,
    pub layout: ChunkLayout,
    pub sample_type: SampleType,
}

impl GeoTiffInfo {
    /// Read metadata of the first image in `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        Self::read(&mut decoder, path)
    }

    /// Read metadata from an already positioned decoder.
    pub(crate) fn read<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<Self> {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| RasterError::decode(path, e))?;
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 {
            return Err(RasterError::unsupported(path, "image has zero width or height"));
        }

        let bits = match decoder.colortype().map_err(|e| RasterError::decode(path, e))? {
            ColorType::Gray(bits) => bits,
            other => {
                return Err(RasterError::unsupported(
                    path,
                    format!("only single-band images are supported, found {:?}", other),
                ))
            }
        };
        let format = find_u16_vec(decoder, SAMPLE_FORMAT, path)?
            .and_then(|v| v.first().copied())
            .unwrap_or(1);
        let sample_type = SampleType::from_format(format, bits).ok_or_else(|| {
            RasterError::unsupported(path, format!("sample format {} with {} bits", format, bits))
        })?;

        let directory = find_u16_vec(decoder, GEO_KEY_DIRECTORY, path)?.unwrap_or_default();
        let doubles = find_f64_vec(decoder, GEO_DOUBLE_PARAMS, path)?.unwrap_or_default();
        let geokeys = GeoKeys::parse(&directory, &doubles);
        let mut transform = read_transform(decoder, path)?;
        if geokeys.get(GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
            // tiepoints reference pixel centres
            transform = shift_half_pixel(transform);
        }

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            transform,
            crs: geokeys.crs(),
            nodata: read_nodata(decoder, path)?,
            layout: read_layout(decoder, width, height),
            sample_type,
        })
    }

    /// The pixel lattice of this raster.
    pub fn grid(&self) -> GridSpec {
        GridSpec::new(self.crs.clone(), self.transform, self.width, self.height).with_nodata(self.nodata)
    }
}

pub(crate) fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|source| RasterError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    // chunk sizes are checked against the tile cache budget instead
    Decoder::new(BufReader::new(file))
        .map(|d| d.with_limits(Limits::unlimited()))
        .map_err(|e| RasterError::decode(path, e))
}

fn find<R: Read + Seek>(decoder: &mut Decoder<R>, code: u16, path: &Path) -> Result<Option<Value>> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))
        .map_err(|e| RasterError::decode(path, e))
}

/// Values of a SHORT tag. Single-valued tags come back from the decoder as
/// scalars rather than one-element lists.
fn find_u16_vec<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
    path: &Path,
) -> Result<Option<Vec<u16>>> {
    let Some(value) = find(decoder, code, path)? else {
        return Ok(None);
    };
    let values = match value {
        list @ Value::List(_) => list.into_u16_vec(),
        scalar => scalar.into_u16().map(|v| vec![v]),
    };
    values.map(Some).map_err(|e| RasterError::decode(path, e))
}

fn find_f64_vec<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
    path: &Path,
) -> Result<Option<Vec<f64>>> {
    let Some(value) = find(decoder, code, path)? else {
        return Ok(None);
    };
    let values = match value {
        list @ Value::List(_) => list.into_f64_vec(),
        scalar => scalar.into_f64().map(|v| vec![v]),
    };
    values.map(Some).map_err(|e| RasterError::decode(path, e))
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<GeoTransform> {
    if let Some(m) = find_f64_vec(decoder, MODEL_TRANSFORMATION, path)? {
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = find_f64_vec(decoder, MODEL_PIXEL_SCALE, path)?;
    let tiepoint = find_f64_vec(decoder, MODEL_TIEPOINT, path)?;
    match (scale, tiepoint) {
        (Some(scale), Some(tp)) if scale.len() >= 2 && tp.len() >= 6 => {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            Ok(GeoTransform::from_gdal([
                tp[3] - tp[0] * scale[0],
                scale[0],
                0.0,
                tp[4] + tp[1] * scale[1],
                0.0,
                -scale[1],
            ]))
        }
        _ => Err(RasterError::MissingGeoreference {
            path: path.to_path_buf(),
        }),
    }
}

/// GDAL writes GDAL_NODATA as ASCII; other writers store the same text as
/// BYTE or SHORT arrays, which the decoder widens to integers.
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<Option<f64>> {
    let text = match find(decoder, GDAL_NODATA, path)? {
        Some(Value::Ascii(s)) => s,
        Some(Value::List(items)) => items.into_iter().filter_map(text_char).collect(),
        Some(other) => text_char(other).map(String::from).unwrap_or_default(),
        None => return Ok(None),
    };
    Ok(parse_nodata(&text))
}

fn text_char(value: Value) -> Option<char> {
    let code = match value {
        Value::Byte(b) => u64::from(b),
        Value::Short(v) => u64::from(v),
        Value::Unsigned(v) => u64::from(v),
        Value::UnsignedBig(v) => v,
        _ => return None,
    };
    u8::try_from(code).ok().map(char::from)
}

/// Parse a GDAL_NODATA string. `nan` in any case and sign is NaN.
pub fn parse_nodata(text: &str) -> Option<f64> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.trim_start_matches(['-', '+']).eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse::<f64>().ok()
}

fn read_layout<R: Read + Seek>(decoder: &mut Decoder<R>, width: usize, height: usize) -> ChunkLayout {
    let (cw, ch) = decoder.chunk_dimensions();
    let is_tiled = decoder
        .find_tag(Tag::from_u16_exhaustive(TILE_WIDTH))
        .ok()
        .flatten()
        .is_some();

    if is_tiled {
        let chunk_width = (cw as usize).max(1);
        let chunk_height = (ch as usize).max(1);
        ChunkLayout {
            kind: ChunkKind::Tile,
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            chunks_down: height.div_ceil(chunk_height),
        }
    } else {
        let rows_per_strip = (ch as usize).clamp(1, height);
        ChunkLayout {
            kind: ChunkKind::Strip,
            chunk_width: width,
            chunk_height: rows_per_strip,
            chunks_across: 1,
            chunks_down: height.div_ceil(rows_per_strip),
        }
    }
}

/// Move the origin from the centre of the first pixel to its outer corner.
fn shift_half_pixel(gt: GeoTransform) -> GeoTransform {
    let (x, y) = gt.pixel_to_world(-0.5, -0.5);
    GeoTransform {
        origin_x: x,
        origin_y: y,
        ..gt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufWriter;
    use tiff::encoder::{colortype, TiffEncoder};

    #[test]
    fn test_parse_nodata() {
        assert_eq!(parse_nodata("-9999"), Some(-9999.0));
        assert_eq!(parse_nodata("255\0"), Some(255.0));
        assert_eq!(parse_nodata(" 0 "), Some(0.0));
        assert!(parse_nodata("nan").unwrap().is_nan());
        assert!(parse_nodata("-NaN").unwrap().is_nan());
        assert_eq!(parse_nodata(""), None);
        assert_eq!(parse_nodata("abc"), None);
    }

    #[test]
    fn test_single_valued_short_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.tif");
        {
            let mut encoder = TiffEncoder::new(BufWriter::new(File::create(&path).unwrap())).unwrap();
            let mut image = encoder.new_image::<colortype::Gray16>(2, 2).unwrap();
            image.encoder().write_tag(Tag::Unknown(65000), 7u16).unwrap();
            image.encoder().write_tag(Tag::Unknown(65001), &[1u16, 2, 3][..]).unwrap();
            image.write_data(&[1u16, 2, 3, 4]).unwrap();
        }

        let mut decoder = open_decoder(&path).unwrap();
        assert_eq!(find_u16_vec(&mut decoder, 65000, &path).unwrap(), Some(vec![7]));
        assert_eq!(find_u16_vec(&mut decoder, 65001, &path).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(find_u16_vec(&mut decoder, 65002, &path).unwrap(), None);
        // SampleFormat is a single SHORT too
        assert_eq!(find_u16_vec(&mut decoder, SAMPLE_FORMAT, &path).unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_nodata_from_byte_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodata_bytes.tif");
        {
            let mut encoder = TiffEncoder::new(BufWriter::new(File::create(&path).unwrap())).unwrap();
            let mut image = encoder.new_image::<colortype::Gray16>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::Unknown(GDAL_NODATA), &b"65535\0"[..])
                .unwrap();
            image.write_data(&[1u16, 2, 3, 4]).unwrap();
        }

        let mut decoder = open_decoder(&path).unwrap();
        assert_eq!(read_nodata(&mut decoder, &path).unwrap(), Some(65535.0));
    }

    #[test]
    fn test_locate_tiles() {
        let layout = ChunkLayout {
            kind: ChunkKind::Tile,
            chunk_width: 16,
            chunk_height: 16,
            chunks_across: 3,
            chunks_down: 2,
        };
        assert_eq!(layout.locate(0, 0), (0, 0, 0));
        assert_eq!(layout.locate(33, 17), (5, 1, 1));
        assert_eq!(layout.chunk_count(), 6);
        assert_eq!(layout.chunk_bytes(), 16 * 16 * 4);
    }

    #[test]
    fn test_half_pixel_shift() {
        let gt = shift_half_pixel(GeoTransform::north_up(100.0, 200.0, 10.0, 10.0));
        assert_eq!(gt.origin_x, 95.0);
        assert_eq!(gt.origin_y, 205.0);
    }
}
