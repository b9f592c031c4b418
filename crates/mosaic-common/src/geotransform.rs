//! Affine pixel-to-world transform.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// Six-coefficient affine transform in GDAL order.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(col, row) = (0, 0)` is the outer corner of the top-left pixel, so pixel
/// centers sit at half-integer coordinates. North-up rasters have
/// `pixel_height < 0` and zero rotation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("Geotransform is not invertible (determinant {0})")]
pub struct SingularTransformError(pub f64);

impl GeoTransform {
    /// Build a transform from the six GDAL-ordered coefficients.
    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    /// North-up transform with square or rectangular pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Map fractional pixel coordinates to world coordinates.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// World coordinates of the center of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Map world coordinates back to fractional pixel coordinates.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Result<(f64, f64), SingularTransformError> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det == 0.0 || !det.is_finite() {
            return Err(SingularTransformError(det));
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.row_rotation) / det;
        let row = (dy * self.pixel_width - dx * self.col_rotation) / det;
        Ok((col, row))
    }

    /// Extent covered by a `width` x `height` raster under this transform.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let mut bbox = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (c, r) in corners {
            let (x, y) = self.pixel_to_world(c, r);
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }

    /// Coefficient-wise comparison with a relative tolerance.
    pub fn approx_eq(&self, other: &GeoTransform, rel_tol: f64) -> bool {
        let scale = self.pixel_width.abs().max(self.pixel_height.abs()).max(f64::EPSILON);
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= rel_tol * scale)
    }

    /// Transform for a grid `factor` times coarser, anchored at the same origin.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            origin_x: self.origin_x,
            pixel_width: self.pixel_width * factor,
            row_rotation: self.row_rotation * factor,
            origin_y: self.origin_y,
            col_rotation: self.col_rotation * factor,
            pixel_height: self.pixel_height * factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn albers() -> GeoTransform {
        GeoTransform::north_up(-2_361_000.0, 3_177_000.0, 30.0, 30.0)
    }

    #[test]
    fn test_pixel_world_inverse() {
        let gt = albers();
        let (x, y) = gt.pixel_to_world(12.5, 40.25);
        let (c, r) = gt.world_to_pixel(x, y).unwrap();
        assert!((c - 12.5).abs() < 1e-9);
        assert!((r - 40.25).abs() < 1e-9);
    }

    #[test]
    fn test_rotated_inverse() {
        let gt = GeoTransform::from_gdal([100.0, 2.0, 0.5, 200.0, 0.25, -3.0]);
        let (x, y) = gt.pixel_to_world(7.0, 3.0);
        let (c, r) = gt.world_to_pixel(x, y).unwrap();
        assert!((c - 7.0).abs() < 1e-9);
        assert!((r - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_singular() {
        let gt = GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(gt.world_to_pixel(1.0, 1.0).is_err());
    }

    #[test]
    fn test_bounds_north_up() {
        let gt = albers();
        let b = gt.bounds(100, 50);
        assert_eq!(b.min_x, -2_361_000.0);
        assert_eq!(b.max_x, -2_361_000.0 + 3000.0);
        assert_eq!(b.max_y, 3_177_000.0);
        assert_eq!(b.min_y, 3_177_000.0 - 1500.0);
    }

    #[test]
    fn test_approx_eq() {
        let a = albers();
        let mut b = a;
        b.origin_x += 1e-7;
        assert!(a.approx_eq(&b, 1e-6));
        b.origin_x += 1.0;
        assert!(!a.approx_eq(&b, 1e-6));
    }

    #[test]
    fn test_scaled_keeps_origin() {
        let gt = albers().scaled(4.0);
        assert_eq!(gt.origin_x, -2_361_000.0);
        assert_eq!(gt.pixel_width, 120.0);
        assert_eq!(gt.pixel_height, -120.0);
    }
}
