//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// CRS of a raster, as far as the georeferencing tags let us name it.
///
/// A user-defined projection whose parameters can be read from the geo keys
/// becomes a `Proj` definition. Anything else without an EPSG code is
/// `Unknown`. Two `Unknown` values compare equal: a tile and a reference that
/// both lack a definition are assumed to share the same unnamed CRS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// A CRS identified by its EPSG code.
    Epsg(u16),
    /// A CRS given as a PROJ string, e.g. `+proj=aea +lat_1=29.5 ...`.
    Proj(Arc<str>),
    /// A CRS without a usable EPSG code or definition.
    Unknown,
}

impl Crs {
    /// WGS84 geographic (lon/lat in degrees).
    pub const WGS84: Crs = Crs::Epsg(4326);

    /// NAD83 / CONUS Albers, the usual grid for CONUS-wide products.
    pub const CONUS_ALBERS: Crs = Crs::Epsg(5070);

    pub fn proj(definition: impl Into<Arc<str>>) -> Self {
        Crs::Proj(definition.into())
    }

    /// EPSG code, if any.
    pub fn epsg(&self) -> Option<u16> {
        match self {
            Crs::Epsg(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Crs::Unknown)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Proj(def) => f.write_str(def),
            Crs::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for Crs {
    type Err = CrsParseError;

    /// Accepts "EPSG:5070", "epsg:5070", a bare "5070", a PROJ string
    /// starting with "+proj=", or "unknown".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(Crs::Unknown);
        }
        if trimmed.starts_with("+proj=") {
            return Ok(Crs::proj(trimmed));
        }

        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(CrsParseError::UnsupportedCrs(s.to_string())),
            None => trimmed,
        };

        code.trim()
            .parse::<u16>()
            .map(Crs::Epsg)
            .map_err(|_| CrsParseError::UnsupportedCrs(s.to_string()))
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}. Expected 'EPSG:<code>' or a '+proj=' string")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!("EPSG:5070".parse::<Crs>().unwrap(), Crs::Epsg(5070));
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("32610".parse::<Crs>().unwrap(), Crs::Epsg(32610));
        assert_eq!("unknown".parse::<Crs>().unwrap(), Crs::Unknown);
        assert!("ESRI:102003".parse::<Crs>().is_err());
        assert!("EPSG:999999".parse::<Crs>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let crs = Crs::CONUS_ALBERS;
        assert_eq!(crs.to_string(), "EPSG:5070");
        assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
    }

    #[test]
    fn test_proj_string_roundtrip() {
        let def = "+proj=aea +lat_1=29.5 +lat_2=45.5 +lat_0=23 +lon_0=-96 +x_0=0 +y_0=0 +ellps=GRS80 +units=m +no_defs";
        let crs: Crs = def.parse().unwrap();
        assert_eq!(crs, Crs::proj(def));
        assert_eq!(crs.to_string(), def);
        assert_eq!(crs.epsg(), None);
        assert!(!crs.is_unknown());
    }

    #[test]
    fn test_unknown_crs_compare_equal() {
        assert_eq!(Crs::Unknown, Crs::Unknown);
        assert_ne!(Crs::Unknown, Crs::WGS84);
        assert_eq!(Crs::Unknown.epsg(), None);
    }
}
