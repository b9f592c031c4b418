//! Coordinate reference system transformations.
//!
//! Pure Rust: PROJ strings come from the `crs-definitions` EPSG database (or
//! from a raster's own projection parameters) and are evaluated by `proj4rs`,
//! so no system PROJ or GDAL is needed.

pub mod transformer;

pub use transformer::{proj_string, CrsTransformer, ProjectionError};
