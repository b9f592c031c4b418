//! Minimal GeoTIFF writer for test fixtures.
//!
//! Writes north-up, single-band, stripped GeoTIFFs with ModelPixelScale,
//! ModelTiepoint, a GeoKeyDirectory (plus GeoDoubleParams for user-defined
//! projections) and an optional ASCII GDAL_NODATA tag. That is enough for the
//! mosaic reader and mirrors what GDAL emits for simple files.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use mosaic_common::{Crs, GeoTransform};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::TiffResult;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GDAL_NODATA: u16 = 42113;

/// Albers parameters as USGS products write them: lat_1, lat_2, lon_0, lat_0,
/// false easting, false northing. Equivalent to EPSG:5070.
const CONUS_ALBERS_PARAMS: [f64; 6] = [29.5, 45.5, -96.0, 23.0, 0.0, 0.0];

/// Builder describing the georeferencing of a fixture file.
#[derive(Debug, Clone)]
pub struct GeoTiffFixture {
    pub width: u32,
    pub height: u32,
    pub transform: GeoTransform,
    pub crs: Crs,
    nodata: Option<String>,
    pixel_is_point: bool,
    rows_per_strip: Option<u32>,
    user_defined_albers: bool,
}

impl GeoTiffFixture {
    /// A fixture in CONUS Albers without nodata.
    pub fn new(width: u32, height: u32, transform: GeoTransform) -> Self {
        Self {
            width,
            height,
            transform,
            crs: Crs::CONUS_ALBERS,
            nodata: None,
            pixel_is_point: false,
            rows_per_strip: None,
            user_defined_albers: false,
        }
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    pub fn nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(format!("{}", nodata));
        self
    }

    /// Raw GDAL_NODATA text, e.g. `"nan"`.
    pub fn nodata_text(mut self, text: &str) -> Self {
        self.nodata = Some(text.to_string());
        self
    }

    /// Declare RasterPixelIsPoint; the tiepoint then names the first pixel's centre.
    pub fn pixel_is_point(mut self) -> Self {
        self.pixel_is_point = true;
        self
    }

    /// Describe CONUS Albers with user-defined geo keys (ProjectedCSType 32767
    /// on a NAD83 base) instead of the EPSG:5070 code.
    pub fn user_defined_albers(mut self) -> Self {
        self.user_defined_albers = true;
        self
    }

    /// Force several strips so chunked reads cross strip boundaries.
    pub fn rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows);
        self
    }

    pub fn write_u16(&self, path: impl AsRef<Path>, data: &[u16]) -> TiffResult<()> {
        self.write::<colortype::Gray16>(path.as_ref(), data)
    }

    pub fn write_u8(&self, path: impl AsRef<Path>, data: &[u8]) -> TiffResult<()> {
        self.write::<colortype::Gray8>(path.as_ref(), data)
    }

    pub fn write_f32(&self, path: impl AsRef<Path>, data: &[f32]) -> TiffResult<()> {
        self.write::<colortype::Gray32Float>(path.as_ref(), data)
    }

    /// Three-band image, for exercising the single-band check.
    pub fn write_rgb8(&self, path: impl AsRef<Path>, data: &[u8]) -> TiffResult<()> {
        self.write::<colortype::RGB8>(path.as_ref(), data)
    }

    fn write<C>(&self, path: &Path, data: &[C::Inner]) -> TiffResult<()>
    where
        C: ColorType,
        [C::Inner]: TiffValue,
    {
        let file = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(file)?;
        let mut image = encoder.new_image::<C>(self.width, self.height)?;
        if let Some(rows) = self.rows_per_strip {
            image.rows_per_strip(rows)?;
        }

        let gt = &self.transform;
        let (tie_x, tie_y) = if self.pixel_is_point {
            gt.pixel_to_world(0.5, 0.5)
        } else {
            (gt.origin_x, gt.origin_y)
        };
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        let tiepoint = [0.0, 0.0, 0.0, tie_x, tie_y, 0.0];

        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
        image
            .encoder()
            .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), self.geokeys().as_slice())?;
        if self.user_defined_albers {
            image
                .encoder()
                .write_tag(Tag::Unknown(GEO_DOUBLE_PARAMS), &CONUS_ALBERS_PARAMS[..])?;
        }
        if let Some(nodata) = &self.nodata {
            // ASCII, as GDAL writes it
            image
                .encoder()
                .write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str())?;
        }

        image.write_data(data)
    }

    fn geokeys(&self) -> Vec<u16> {
        let raster_type = if self.pixel_is_point { 2 } else { 1 };
        if self.user_defined_albers {
            return vec![
                1, 1, 0, 12, //
                1024, 0, 1, 1, //
                1025, 0, 1, raster_type, //
                2048, 0, 1, 4269, //
                3072, 0, 1, 32767, //
                3075, 0, 1, 11, //
                3076, 0, 1, 9001, //
                3078, GEO_DOUBLE_PARAMS, 1, 0, //
                3079, GEO_DOUBLE_PARAMS, 1, 1, //
                3080, GEO_DOUBLE_PARAMS, 1, 2, //
                3081, GEO_DOUBLE_PARAMS, 1, 3, //
                3082, GEO_DOUBLE_PARAMS, 1, 4, //
                3083, GEO_DOUBLE_PARAMS, 1, 5,
            ];
        }
        let (model_type, crs_key, code) = match &self.crs {
            Crs::Epsg(code) if *code == 4326 || (4000..5000).contains(code) => (2, 2048, *code),
            Crs::Epsg(code) => (1, 3072, *code),
            // user-defined without parameters
            Crs::Proj(_) | Crs::Unknown => (1, 3072, 32767),
        };
        vec![
            1, 1, 0, 3, //
            1024, 0, 1, model_type, //
            1025, 0, 1, raster_type, //
            crs_key, 0, 1, code,
        ]
    }
}
