//! GeoKeyDirectory parsing and CRS resolution.
//!
//! EPSG-coded rasters resolve to [`Crs::Epsg`]. User-defined projections
//! (ProjectedCSType 32767, as written for many CONUS Albers products) are
//! rebuilt as a PROJ string from the projection parameter keys and the
//! geographic base. Anything that cannot be rebuilt is [`Crs::Unknown`].

use mosaic_common::Crs;
use projection::proj_string;

pub const GEO_DOUBLE_PARAMS: u16 = 34736;

pub(crate) const GT_MODEL_TYPE: u16 = 1024;
pub(crate) const GT_RASTER_TYPE: u16 = 1025;
pub(crate) const RASTER_PIXEL_IS_POINT: u16 = 2;

const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_GEODETIC_DATUM: u16 = 2050;
const GEOG_ELLIPSOID: u16 = 2056;
const GEOG_SEMI_MAJOR_AXIS: u16 = 2057;
const GEOG_SEMI_MINOR_AXIS: u16 = 2058;
const GEOG_INV_FLATTENING: u16 = 2059;

const PROJECTED_CS_TYPE: u16 = 3072;
const PROJ_COORD_TRANS: u16 = 3075;
const PROJ_LINEAR_UNITS: u16 = 3076;
const PROJ_STD_PARALLEL_1: u16 = 3078;
const PROJ_STD_PARALLEL_2: u16 = 3079;
const PROJ_NAT_ORIGIN_LONG: u16 = 3080;
const PROJ_NAT_ORIGIN_LAT: u16 = 3081;
const PROJ_FALSE_EASTING: u16 = 3082;
const PROJ_FALSE_NORTHING: u16 = 3083;
const PROJ_FALSE_ORIGIN_LONG: u16 = 3084;
const PROJ_FALSE_ORIGIN_LAT: u16 = 3085;
const PROJ_FALSE_ORIGIN_EASTING: u16 = 3086;
const PROJ_FALSE_ORIGIN_NORTHING: u16 = 3087;
const PROJ_CENTER_LONG: u16 = 3088;
const PROJ_CENTER_LAT: u16 = 3089;
const PROJ_SCALE_AT_NAT_ORIGIN: u16 = 3092;
const PROJ_STRAIGHT_VERT_POLE_LONG: u16 = 3095;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const USER_DEFINED: u16 = 32767;

// ProjCoordTransGeoKey codes
const CT_TRANSVERSE_MERCATOR: u16 = 1;
const CT_MERCATOR: u16 = 7;
const CT_LAMBERT_CONF_CONIC_2SP: u16 = 8;
const CT_LAMBERT_CONF_CONIC_1SP: u16 = 9;
const CT_LAMBERT_AZIM_EQUAL_AREA: u16 = 10;
const CT_ALBERS_EQUAL_AREA: u16 = 11;
const CT_POLAR_STEREOGRAPHIC: u16 = 15;
const CT_EQUIRECTANGULAR: u16 = 17;

/// Parsed GeoKeyDirectory: inline SHORT values and GeoDoubleParams values.
#[derive(Debug, Default)]
pub(crate) struct GeoKeys {
    shorts: Vec<(u16, u16)>,
    doubles: Vec<(u16, f64)>,
}

impl GeoKeys {
    /// `dir` is the GeoKeyDirectory tag, `doubles` the GeoDoubleParams tag.
    pub fn parse(dir: &[u16], doubles: &[f64]) -> Self {
        let mut keys = Self::default();
        if dir.len() < 4 {
            return keys;
        }
        let count = dir[3] as usize;
        for entry in dir[4..].chunks_exact(4).take(count) {
            let (key, location, offset) = (entry[0], entry[1], entry[3]);
            match location {
                0 => keys.shorts.push((key, offset)),
                GEO_DOUBLE_PARAMS => {
                    if let Some(v) = doubles.get(offset as usize) {
                        keys.doubles.push((key, *v));
                    }
                }
                // ASCII citations are not needed
                _ => {}
            }
        }
        keys
    }

    pub fn get(&self, key: u16) -> Option<u16> {
        self.shorts.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn double(&self, key: u16) -> Option<f64> {
        self.doubles.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// First of `keys` that is present.
    fn first_double(&self, keys: &[u16]) -> Option<f64> {
        keys.iter().find_map(|k| self.double(*k))
    }

    /// The raster's CRS. The model type decides which CS key is authoritative,
    /// so a user-defined projection is never mistaken for its geographic base.
    pub fn crs(&self) -> Crs {
        match self.get(GT_MODEL_TYPE) {
            Some(MODEL_TYPE_PROJECTED) => self.projected_crs(),
            Some(MODEL_TYPE_GEOGRAPHIC) => self.geographic_crs(),
            _ if self.get(PROJECTED_CS_TYPE).is_some() || self.get(PROJ_COORD_TRANS).is_some() => {
                self.projected_crs()
            }
            _ => self.geographic_crs(),
        }
    }

    fn projected_crs(&self) -> Crs {
        match self.get(PROJECTED_CS_TYPE) {
            Some(code) if code != 0 && code != USER_DEFINED => Crs::Epsg(code),
            _ => self.user_projection().map(Crs::proj).unwrap_or(Crs::Unknown),
        }
    }

    fn geographic_crs(&self) -> Crs {
        match self.get(GEOGRAPHIC_TYPE) {
            Some(code) if code != 0 && code != USER_DEFINED => Crs::Epsg(code),
            _ => match self.user_datum() {
                Some(datum) => Crs::proj(format!("+proj=longlat {} +no_defs", datum)),
                None => Crs::Unknown,
            },
        }
    }

    /// PROJ string for a user-defined projected CS.
    fn user_projection(&self) -> Option<String> {
        let transform = self.get(PROJ_COORD_TRANS)?;
        let to_metre = match self.get(PROJ_LINEAR_UNITS) {
            None | Some(9001) => 1.0,
            Some(9002) => 0.3048,
            Some(9003) => 1200.0 / 3937.0,
            Some(_) => return None,
        };

        let lat_0 = self
            .first_double(&[PROJ_NAT_ORIGIN_LAT, PROJ_FALSE_ORIGIN_LAT, PROJ_CENTER_LAT])
            .unwrap_or(0.0);
        let lon_0 = self
            .first_double(&[PROJ_NAT_ORIGIN_LONG, PROJ_FALSE_ORIGIN_LONG, PROJ_CENTER_LONG])
            .unwrap_or(0.0);
        // false easting/northing are in the CS linear unit; PROJ wants metres
        let x_0 = self
            .first_double(&[PROJ_FALSE_EASTING, PROJ_FALSE_ORIGIN_EASTING])
            .unwrap_or(0.0)
            * to_metre;
        let y_0 = self
            .first_double(&[PROJ_FALSE_NORTHING, PROJ_FALSE_ORIGIN_NORTHING])
            .unwrap_or(0.0)
            * to_metre;
        let k = self.double(PROJ_SCALE_AT_NAT_ORIGIN).unwrap_or(1.0);
        let lat_1 = self.double(PROJ_STD_PARALLEL_1);
        let lat_2 = self.double(PROJ_STD_PARALLEL_2);
        let offsets = format!("+x_0={} +y_0={}", x_0, y_0);

        let params = match transform {
            CT_ALBERS_EQUAL_AREA => format!(
                "+proj=aea +lat_1={} +lat_2={} +lat_0={} +lon_0={} {}",
                lat_1?, lat_2?, lat_0, lon_0, offsets
            ),
            CT_LAMBERT_CONF_CONIC_2SP => format!(
                "+proj=lcc +lat_1={} +lat_2={} +lat_0={} +lon_0={} {}",
                lat_1?, lat_2?, lat_0, lon_0, offsets
            ),
            CT_LAMBERT_CONF_CONIC_1SP => format!(
                "+proj=lcc +lat_1={} +lat_0={} +lon_0={} +k_0={} {}",
                lat_0, lat_0, lon_0, k, offsets
            ),
            CT_TRANSVERSE_MERCATOR => format!(
                "+proj=tmerc +lat_0={} +lon_0={} +k={} {}",
                lat_0, lon_0, k, offsets
            ),
            CT_MERCATOR => match lat_1 {
                Some(lat_ts) => format!("+proj=merc +lat_ts={} +lon_0={} {}", lat_ts, lon_0, offsets),
                None => format!("+proj=merc +lon_0={} +k={} {}", lon_0, k, offsets),
            },
            CT_LAMBERT_AZIM_EQUAL_AREA => format!("+proj=laea +lat_0={} +lon_0={} {}", lat_0, lon_0, offsets),
            CT_POLAR_STEREOGRAPHIC => {
                let pole = if lat_0 < 0.0 { -90.0 } else { 90.0 };
                let lon_0 = self.double(PROJ_STRAIGHT_VERT_POLE_LONG).unwrap_or(lon_0);
                format!(
                    "+proj=stere +lat_0={} +lat_ts={} +lon_0={} +k={} {}",
                    pole, lat_0, lon_0, k, offsets
                )
            }
            CT_EQUIRECTANGULAR => format!(
                "+proj=eqc +lat_ts={} +lon_0={} {}",
                lat_1.unwrap_or(lat_0),
                lon_0,
                offsets
            ),
            _ => return None,
        };

        // GDAL falls back to WGS84 when the geographic base is not described
        let datum = self.datum().unwrap_or_else(|| "+datum=WGS84".to_string());
        Some(format!("{} {} +units=m +no_defs", params, datum))
    }

    /// Datum/ellipsoid parameters of the geographic base.
    fn datum(&self) -> Option<String> {
        match self.get(GEOGRAPHIC_TYPE) {
            Some(code) if code != 0 && code != USER_DEFINED => datum_of_epsg(code).or_else(|| self.user_datum()),
            _ => self.user_datum(),
        }
    }

    /// Datum parameters from the user-defined datum, ellipsoid or axis keys.
    fn user_datum(&self) -> Option<String> {
        let by_datum = match self.get(GEOG_GEODETIC_DATUM) {
            Some(6326) => Some("+datum=WGS84"),
            Some(6269) => Some("+ellps=GRS80 +towgs84=0,0,0"),
            Some(6267) => Some("+ellps=clrk66"),
            _ => None,
        };
        if let Some(datum) = by_datum {
            return Some(datum.to_string());
        }

        let by_ellipsoid = match self.get(GEOG_ELLIPSOID) {
            Some(7030) => Some("+ellps=WGS84"),
            Some(7019) => Some("+ellps=GRS80"),
            Some(7008) => Some("+ellps=clrk66"),
            _ => None,
        };
        if let Some(ellps) = by_ellipsoid {
            return Some(ellps.to_string());
        }

        let a = self.double(GEOG_SEMI_MAJOR_AXIS)?;
        if let Some(rf) = self.double(GEOG_INV_FLATTENING) {
            return Some(format!("+a={} +rf={}", a, rf));
        }
        let b = self.double(GEOG_SEMI_MINOR_AXIS).unwrap_or(a);
        Some(format!("+a={} +b={}", a, b))
    }
}

/// Datum tokens of a geographic EPSG definition, e.g. `+datum=NAD83` for 4269.
fn datum_of_epsg(code: u16) -> Option<String> {
    let def = proj_string(code)?;
    let tokens: Vec<&str> = def
        .split_whitespace()
        .filter(|t| {
            t.starts_with("+datum=")
                || t.starts_with("+ellps=")
                || t.starts_with("+towgs84=")
                || t.starts_with("+a=")
                || t.starts_with("+b=")
                || t.starts_with("+rf=")
        })
        .collect();
    (!tokens.is_empty()).then(|| tokens.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// USGS-style CONUS Albers: user-defined projected CS on a NAD83 base.
    fn conus_albers_keys() -> GeoKeys {
        GeoKeys::parse(
            &[
                1, 1, 0, 10, //
                1024, 0, 1, 1, //
                1025, 0, 1, 1, //
                2048, 0, 1, 4269, //
                3072, 0, 1, 32767, //
                3075, 0, 1, 11, //
                3076, 0, 1, 9001, //
                3078, 34736, 1, 0, //
                3079, 34736, 1, 1, //
                3080, 34736, 1, 2, //
                3081, 34736, 1, 3,
            ],
            &[29.5, 45.5, -96.0, 23.0],
        )
    }

    #[test]
    fn test_epsg_codes() {
        let projected = GeoKeys::parse(&[1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 5070], &[]);
        assert_eq!(projected.crs(), Crs::Epsg(5070));
        assert_eq!(projected.get(GT_RASTER_TYPE), Some(1));

        let geographic = GeoKeys::parse(&[1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326], &[]);
        assert_eq!(geographic.crs(), Crs::WGS84);

        // no model type: the projected key wins
        let both = GeoKeys::parse(&[1, 1, 0, 2, 2048, 0, 1, 4269, 3072, 0, 1, 5070], &[]);
        assert_eq!(both.crs(), Crs::Epsg(5070));

        assert_eq!(GeoKeys::parse(&[], &[]).crs(), Crs::Unknown);
    }

    #[test]
    fn test_user_defined_projection_never_falls_back_to_base() {
        let keys = GeoKeys::parse(&[1, 1, 0, 3, 1024, 0, 1, 1, 2048, 0, 1, 4269, 3072, 0, 1, 32767], &[]);
        // no projection parameters to rebuild it from
        assert_eq!(keys.crs(), Crs::Unknown);
    }

    #[test]
    fn test_user_defined_albers_rebuilt() {
        let crs = conus_albers_keys().crs();
        let Crs::Proj(def) = &crs else {
            panic!("expected a PROJ definition, got {:?}", crs);
        };
        for token in ["+proj=aea", "+lat_1=29.5", "+lat_2=45.5", "+lat_0=23", "+lon_0=-96", "+x_0=0", "+units=m"] {
            assert!(def.split_whitespace().any(|t| t == token), "{} missing from {}", token, def);
        }
        assert!(def.contains("NAD83") || def.contains("GRS80"), "{}", def);
    }

    #[test]
    fn test_false_easting_in_feet_converted() {
        let keys = GeoKeys::parse(
            &[
                1, 1, 0, 6, //
                1024, 0, 1, 1, //
                3072, 0, 1, 32767, //
                3075, 0, 1, 1, //
                3076, 0, 1, 9002, //
                3080, 34736, 1, 0, //
                3082, 34736, 1, 1,
            ],
            &[-120.0, 1000.0],
        );
        let crs = keys.crs();
        let def = crs.to_string();
        assert!(def.starts_with("+proj=tmerc"), "{}", def);
        assert!(def.contains("+x_0=304.8"), "{}", def);
        assert!(def.contains("+datum=WGS84"), "{}", def);
    }

    #[test]
    fn test_unsupported_transform_is_unknown() {
        // CT_ObliqueMercator
        let keys = GeoKeys::parse(&[1, 1, 0, 3, 1024, 0, 1, 1, 3072, 0, 1, 32767, 3075, 0, 1, 3], &[]);
        assert_eq!(keys.crs(), Crs::Unknown);
    }

    #[test]
    fn test_user_defined_geographic() {
        let keys = GeoKeys::parse(&[1, 1, 0, 3, 1024, 0, 1, 2, 2048, 0, 1, 32767, 2050, 0, 1, 6326], &[]);
        assert_eq!(keys.crs(), Crs::proj("+proj=longlat +datum=WGS84 +no_defs"));
    }
}
