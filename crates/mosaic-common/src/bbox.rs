//! Axis-aligned world extents.

use serde::{Deserialize, Serialize};

/// Extent in the units of whatever CRS it was computed in (degrees for
/// geographic systems, metres for EPSG:5070).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box enclosing all the given points, or `None` when there are none.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        let mut bbox: Option<Self> = None;
        for (x, y) in points {
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => Self::new(x, y, x, y),
                Some(b) => Self::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            });
        }
        bbox
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Overlap with a non-zero area; boxes sharing only an edge do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        let overlap_x = self.min_x < other.max_x && other.min_x < self.max_x;
        let overlap_y = self.min_y < other.max_y && other.min_y < self.max_y;
        overlap_x && overlap_y
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        self.intersects(other).then(|| {
            Self::new(
                self.min_x.max(other.min_x),
                self.min_y.max(other.min_y),
                self.max_x.min(other.max_x),
                self.max_y.min(other.max_y),
            )
        })
    }

    /// Grow the box by `margin` units on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_of_two_tiles() {
        let west = BoundingBox::new(-120.0, 30.0, -110.0, 40.0);
        let east = BoundingBox::new(-115.0, 35.0, -100.0, 45.0);
        assert_eq!(
            west.intersection(&east),
            Some(BoundingBox::new(-115.0, 35.0, -110.0, 40.0))
        );
        assert_eq!(west.width(), 10.0);
        assert_eq!(east.height(), 10.0);
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let left = BoundingBox::new(0.0, 0.0, 30.0, 30.0);
        let right = BoundingBox::new(30.0, 0.0, 60.0, 30.0);
        assert!(!left.intersects(&right));
        assert_eq!(left.intersection(&right), None);
    }

    #[test]
    fn test_from_points_skips_non_finite() {
        let bbox = BoundingBox::from_points(vec![
            (1.0, 2.0),
            (f64::NAN, 100.0),
            (-3.0, 5.0),
            (f64::INFINITY, 0.0),
        ])
        .unwrap();
        assert_eq!(bbox, BoundingBox::new(-3.0, 2.0, 1.0, 5.0));

        assert!(BoundingBox::from_points(Vec::new()).is_none());
    }

    #[test]
    fn test_expand() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).expand(0.5);
        assert_eq!(bbox, BoundingBox::new(-0.5, -0.5, 1.5, 1.5));
        assert_eq!((bbox.width(), bbox.height()), (2.0, 2.0));
    }
}
