//! Common types shared across the mosaic workspace.
//!
//! Everything here is a plain value type: no I/O, no projection math.
//! The canonical pixel lattice ([`GridSpec`]) and its block tiling
//! ([`BlockTiling`]) are the coordinates every other crate speaks.

pub mod bbox;
pub mod crs;
pub mod geotransform;
pub mod grid;

pub use bbox::BoundingBox;
pub use crs::{Crs, CrsParseError};
pub use geotransform::{GeoTransform, SingularTransformError};
pub use grid::{BlockTiling, GridSpec, Window};
