//! Point and extent transforms between two CRSs, named by EPSG code or
//! given as PROJ strings.

use std::fmt;

use mosaic_common::{BoundingBox, Crs};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("EPSG:{0} is not in the crs-definitions database")]
    UnsupportedCrs(u16),

    #[error(
        "Cannot transform between {src} and {dst}: CRS has no EPSG code or readable projection parameters; \
         reproject the raster to an EPSG CRS (e.g. gdalwarp -t_srs EPSG:5070)"
    )]
    UnknownCrs { src: Crs, dst: Crs },

    #[error("Invalid projection definition for {crs}: {message}")]
    InvalidDefinition { crs: Crs, message: String },

    #[error("Transform failed for ({x}, {y}): {message}")]
    TransformFailed { x: f64, y: f64, message: String },

    #[error("No point of the extent could be transformed")]
    EmptyExtent,
}

/// PROJ string for an EPSG code from the crs-definitions database.
pub fn proj_string(code: u16) -> Option<&'static str> {
    crs_definitions::from_code(code).map(|def| def.proj4)
}

fn is_longlat(def: &str) -> bool {
    def.split_whitespace().any(|token| token == "+proj=longlat" || token == "+proj=latlong")
}

struct Endpoint {
    proj: Proj,
    geographic: bool,
}

impl Endpoint {
    fn new(crs: &Crs) -> Result<Self, ProjectionError> {
        let def: &str = match crs {
            Crs::Epsg(code) => proj_string(*code).ok_or(ProjectionError::UnsupportedCrs(*code))?,
            Crs::Proj(def) => &**def,
            Crs::Unknown => {
                return Err(ProjectionError::InvalidDefinition {
                    crs: Crs::Unknown,
                    message: "no projection definition".to_string(),
                })
            }
        };
        let proj = Proj::from_proj_string(def).map_err(|e| ProjectionError::InvalidDefinition {
            crs: crs.clone(),
            message: format!("{:?}", e),
        })?;
        Ok(Self {
            proj,
            geographic: is_longlat(def),
        })
    }
}

/// Transformer from `src` to `dst` coordinates.
///
/// Built once per tile and reused for every point. When both sides name the
/// same CRS (including two unnamed ones) it is the identity and never touches
/// proj4rs.
pub struct CrsTransformer {
    src: Crs,
    dst: Crs,
    endpoints: Option<(Endpoint, Endpoint)>,
}

impl fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsTransformer")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("identity", &self.is_identity())
            .finish()
    }
}

impl CrsTransformer {
    pub fn new(src: Crs, dst: Crs) -> Result<Self, ProjectionError> {
        if src == dst {
            return Ok(Self {
                src,
                dst,
                endpoints: None,
            });
        }

        if src.is_unknown() || dst.is_unknown() {
            return Err(ProjectionError::UnknownCrs { src, dst });
        }

        let endpoints = (Endpoint::new(&src)?, Endpoint::new(&dst)?);
        Ok(Self {
            src,
            dst,
            endpoints: Some(endpoints),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.endpoints.is_none()
    }

    pub fn src(&self) -> &Crs {
        &self.src
    }

    pub fn dst(&self) -> &Crs {
        &self.dst
    }

    /// Transform a single point.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        let Some((src, dst)) = &self.endpoints else {
            return Ok((x, y));
        };

        // proj4rs works in radians for geographic systems
        let mut point = if src.geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&src.proj, &dst.proj, &mut point).map_err(|e| ProjectionError::TransformFailed {
            x,
            y,
            message: format!("{:?}", e),
        })?;

        let out = if dst.geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out.0.is_finite() || !out.1.is_finite() {
            return Err(ProjectionError::TransformFailed {
                x,
                y,
                message: "non-finite result".to_string(),
            });
        }
        Ok(out)
    }

    /// Transform an extent by sampling `densify` extra points along each edge.
    ///
    /// Curved edges in the destination CRS can bulge past the transformed
    /// corners, so edge samples are included. Points that fail to transform
    /// are skipped; an error is returned only if none succeed.
    pub fn transform_bounds(
        &self,
        bbox: &BoundingBox,
        densify: usize,
    ) -> Result<BoundingBox, ProjectionError> {
        if self.is_identity() {
            return Ok(*bbox);
        }

        let steps = densify + 1;
        let mut points = Vec::with_capacity(4 * steps);
        for i in 0..steps {
            let t = i as f64 / steps as f64;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            points.push((x, bbox.min_y));
            points.push((bbox.max_x - t * bbox.width(), bbox.max_y));
            points.push((bbox.min_x, bbox.max_y - t * bbox.height()));
            points.push((bbox.max_x, y));
        }

        let transformed = points
            .into_iter()
            .filter_map(|(x, y)| self.transform(x, y).ok());
        BoundingBox::from_points(transformed).ok_or(ProjectionError::EmptyExtent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = CrsTransformer::new(Crs::CONUS_ALBERS, Crs::CONUS_ALBERS).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(123.0, -456.0).unwrap(), (123.0, -456.0));

        let t = CrsTransformer::new(Crs::Unknown, Crs::Unknown).unwrap();
        assert!(t.is_identity());
    }

    #[test]
    fn test_unknown_to_named_fails() {
        let err = CrsTransformer::new(Crs::Unknown, Crs::WGS84).unwrap_err();
        assert!(matches!(err, ProjectionError::UnknownCrs { .. }));
    }

    #[test]
    fn test_geographic_detection() {
        assert!(is_longlat(proj_string(4326).unwrap()));
        assert!(is_longlat(proj_string(4269).unwrap()));
        assert!(!is_longlat(proj_string(5070).unwrap()));
        assert!(!is_longlat(proj_string(3857).unwrap()));
    }

    #[test]
    fn test_wgs84_to_mercator_origin() {
        let t = CrsTransformer::new(Crs::WGS84, Crs::Epsg(3857)).unwrap();
        let (x, y) = t.transform(0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_albers_roundtrip() {
        let fwd = CrsTransformer::new(Crs::WGS84, Crs::CONUS_ALBERS).unwrap();
        let inv = CrsTransformer::new(Crs::CONUS_ALBERS, Crs::WGS84).unwrap();

        let (x, y) = fwd.transform(-96.0, 40.0).unwrap();
        // -96 is the central meridian of CONUS Albers
        assert!(x.abs() < 1.0, "x = {}", x);

        let (lon, lat) = inv.transform(x, y).unwrap();
        assert!((lon + 96.0).abs() < 1e-6);
        assert!((lat - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_transform_bounds_contains_corners() {
        let t = CrsTransformer::new(Crs::WGS84, Crs::CONUS_ALBERS).unwrap();
        let src = BoundingBox::new(-100.0, 35.0, -90.0, 45.0);
        let out = t.transform_bounds(&src, 16).unwrap();

        for (lon, lat) in [(-100.0, 35.0), (-90.0, 35.0), (-100.0, 45.0), (-90.0, 45.0)] {
            let (x, y) = t.transform(lon, lat).unwrap();
            assert!(x >= out.min_x && x <= out.max_x);
            assert!(y >= out.min_y && y <= out.max_y);
        }
        // Parallels bow towards the pole, so the bottom edge midpoint sits
        // below both bottom corners.
        let (_, mid_y) = t.transform(-95.0, 35.0).unwrap();
        assert!(out.min_y <= mid_y);
    }

    #[test]
    fn test_proj_definition_matches_epsg() {
        let albers = Crs::proj(
            "+proj=aea +lat_1=29.5 +lat_2=45.5 +lat_0=23 +lon_0=-96 +x_0=0 +y_0=0 +ellps=GRS80 +units=m +no_defs",
        );
        let named = CrsTransformer::new(Crs::WGS84, Crs::CONUS_ALBERS).unwrap();
        let custom = CrsTransformer::new(Crs::WGS84, albers.clone()).unwrap();
        assert!(!custom.is_identity());

        let (x0, y0) = named.transform(-110.0, 42.0).unwrap();
        let (x1, y1) = custom.transform(-110.0, 42.0).unwrap();
        assert!((x0 - x1).abs() < 0.01, "{} vs {}", x0, x1);
        assert!((y0 - y1).abs() < 0.01, "{} vs {}", y0, y1);

        let back = CrsTransformer::new(albers, Crs::WGS84).unwrap();
        let (lon, lat) = back.transform(x1, y1).unwrap();
        assert!((lon + 110.0).abs() < 1e-6);
        assert!((lat - 42.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_proj_definition() {
        let err = CrsTransformer::new(Crs::WGS84, Crs::proj("+proj=nonsense +units=m")).unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_unsupported_code() {
        assert!(matches!(
            CrsTransformer::new(Crs::WGS84, Crs::Epsg(1)),
            Err(ProjectionError::UnsupportedCrs(1))
        ));
    }
}
