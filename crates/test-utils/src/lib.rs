//! Test support shared by the workspace crates.
//!
//! - [`GeoTiffFixture`]: writes small georeferenced GeoTIFFs
//! - [`MosaicScenario`]: a temporary input/reference/output tree on one lattice
//! - generators for encoded LAI pixel data
//! - float assertions that treat NaN sensibly
//!
//! Pulled in as a dev-dependency only:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod geotiff;

pub use fixtures::*;
pub use generators::*;
pub use geotiff::GeoTiffFixture;

/// Assert `|left - right| <= tolerance`, comparing as f64.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(2.5000001_f32, 2.5, 1e-6);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let (l, r, tol) = ($left as f64, $right as f64, $tolerance as f64);
        if !((l - r).abs() <= tol) {
            panic!("{} and {} differ by more than {} (left: {}, right: {})", stringify!($left), stringify!($right), tol, l, r);
        }
    }};
}

/// Assert two float slices are identical bit for bit, so NaN matches NaN.
#[macro_export]
macro_rules! assert_bits_eq {
    ($left:expr, $right:expr) => {{
        let left: &[f32] = &$left;
        let right: &[f32] = &$right;
        assert_eq!(left.len(), right.len(), "length mismatch");
        if let Some(i) = (0..left.len()).find(|&i| left[i].to_bits() != right[i].to_bits()) {
            panic!("bit mismatch at index {}: {:?} != {:?}", i, left[i], right[i]);
        }
    }};
}
