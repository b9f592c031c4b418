//! Resampling kernels for warping a tile onto the target grid.
//!
//! Kernels take fractional source pixel coordinates, where integer values
//! are pixel corners and `+ 0.5` is a pixel centre, and a sampler returning
//! `Some(v)` for valid source pixels. Out-of-extent and nodata pixels are
//! both `None`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resampling method for the warped view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Value of the source pixel containing the destination pixel centre.
    #[default]
    Nearest,
    /// Distance-weighted 2x2 average over valid neighbours.
    Bilinear,
    /// Catmull-Rom over 4x4, bilinear where any neighbour is invalid.
    Cubic,
}

impl Resampling {
    /// Extra source pixels the kernel reaches beyond the sample point.
    pub fn radius(&self) -> usize {
        match self {
            Resampling::Nearest => 0,
            Resampling::Bilinear => 1,
            Resampling::Cubic => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resampling::Nearest => "nearest",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
        }
    }

    /// Sample at `(x, y)` in source pixel space.
    pub fn sample<E, S>(&self, x: f64, y: f64, sampler: &mut S) -> Result<Option<f32>, E>
    where
        S: FnMut(i64, i64) -> Result<Option<f32>, E>,
    {
        match self {
            Resampling::Nearest => nearest(x, y, sampler),
            Resampling::Bilinear => bilinear(x, y, sampler),
            Resampling::Cubic => cubic(x, y, sampler),
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" | "near" => Ok(Resampling::Nearest),
            "bilinear" => Ok(Resampling::Bilinear),
            "cubic" | "bicubic" => Ok(Resampling::Cubic),
            other => Err(format!(
                "unsupported resampling method '{}', expected nearest, bilinear or cubic",
                other
            )),
        }
    }
}

/// Nearest neighbor: floor of the sample point.
pub fn nearest<E, S>(x: f64, y: f64, sampler: &mut S) -> Result<Option<f32>, E>
where
    S: FnMut(i64, i64) -> Result<Option<f32>, E>,
{
    sampler(x.floor() as i64, y.floor() as i64)
}

/// Bilinear interpolation between the four pixel centres around `(x, y)`.
///
/// Invalid neighbours are dropped and the remaining weights renormalised.
pub fn bilinear<E, S>(x: f64, y: f64, sampler: &mut S) -> Result<Option<f32>, E>
where
    S: FnMut(i64, i64) -> Result<Option<f32>, E>,
{
    let cx = x - 0.5;
    let cy = y - 0.5;
    let x0 = cx.floor();
    let y0 = cy.floor();
    let fx = cx - x0;
    let fy = cy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let corners = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];

    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for (col, row, w) in corners {
        if w <= 0.0 {
            continue;
        }
        if let Some(v) = sampler(col, row)? {
            sum += w * v as f64;
            weight += w;
        }
    }

    if weight > 0.0 {
        Ok(Some((sum / weight) as f32))
    } else {
        // sample point sits exactly on a pixel centre whose value is invalid,
        // or every weighted neighbour is invalid
        Ok(None)
    }
}

/// Bicubic (Catmull-Rom) interpolation over the 4x4 neighbourhood.
pub fn cubic<E, S>(x: f64, y: f64, sampler: &mut S) -> Result<Option<f32>, E>
where
    S: FnMut(i64, i64) -> Result<Option<f32>, E>,
{
    let cx = x - 0.5;
    let cy = y - 0.5;
    let xi = cx.floor() as i64;
    let yi = cy.floor() as i64;
    let xf = (cx - xi as f64) as f32;
    let yf = (cy - yi as f64) as f32;

    let mut values = [[0.0f32; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            match sampler(xi + i as i64 - 1, yi + j as i64 - 1)? {
                Some(v) => *value = v,
                None => return bilinear(x, y, sampler),
            }
        }
    }

    let mut row_values = [0.0f32; 4];
    for (j, row) in values.iter().enumerate() {
        row_values[j] = cubic_1d(row[0], row[1], row[2], row[3], xf);
    }
    Ok(Some(cubic_1d(
        row_values[0],
        row_values[1],
        row_values[2],
        row_values[3],
        yf,
    )))
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn grid_sampler(
        data: &'static [f32],
        width: i64,
    ) -> impl FnMut(i64, i64) -> Result<Option<f32>, Infallible> {
        let height = data.len() as i64 / width;
        move |c, r| {
            if c < 0 || r < 0 || c >= width || r >= height {
                return Ok(None);
            }
            let v = data[(r * width + c) as usize];
            Ok(if v.is_nan() { None } else { Some(v) })
        }
    }

    static DATA: [f32; 9] = [
        1.0, 2.0, 3.0, //
        4.0, 5.0, 6.0, //
        7.0, 8.0, 9.0,
    ];

    #[test]
    fn test_nearest() {
        let mut s = grid_sampler(&DATA, 3);
        assert_eq!(nearest(0.5, 0.5, &mut s).unwrap(), Some(1.0));
        assert_eq!(nearest(1.99, 1.01, &mut s).unwrap(), Some(5.0));
        assert_eq!(nearest(2.5, 2.5, &mut s).unwrap(), Some(9.0));
        assert_eq!(nearest(3.1, 0.5, &mut s).unwrap(), None);
        assert_eq!(nearest(-0.1, 0.5, &mut s).unwrap(), None);
    }

    #[test]
    fn test_bilinear_at_centres_and_between() {
        let mut s = grid_sampler(&DATA, 3);
        assert_eq!(bilinear(1.5, 1.5, &mut s).unwrap(), Some(5.0));
        let mid = bilinear(1.0, 1.0, &mut s).unwrap().unwrap();
        assert!((mid - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_renormalises_over_valid() {
        static HOLEY: [f32; 4] = [1.0, f32::NAN, 3.0, 5.0];
        let mut s = grid_sampler(&HOLEY, 2);
        // Equal weights over the three valid corners
        let v = bilinear(1.0, 1.0, &mut s).unwrap().unwrap();
        assert!((v - 3.0).abs() < 1e-6);

        static EMPTY: [f32; 4] = [f32::NAN; 4];
        let mut s = grid_sampler(&EMPTY, 2);
        assert_eq!(bilinear(1.0, 1.0, &mut s).unwrap(), None);
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp() {
        static RAMP: [f32; 25] = [
            0.0, 1.0, 2.0, 3.0, 4.0, //
            0.0, 1.0, 2.0, 3.0, 4.0, //
            0.0, 1.0, 2.0, 3.0, 4.0, //
            0.0, 1.0, 2.0, 3.0, 4.0, //
            0.0, 1.0, 2.0, 3.0, 4.0,
        ];
        let mut s = grid_sampler(&RAMP, 5);
        let v = cubic(2.75, 2.5, &mut s).unwrap().unwrap();
        assert!((v - 2.25).abs() < 1e-5, "v = {}", v);
    }

    #[test]
    fn test_cubic_falls_back_at_edges() {
        let mut s = grid_sampler(&DATA, 3);
        // Near the corner the 4x4 stencil leaves the raster
        let c = cubic(0.75, 0.5, &mut s).unwrap();
        let b = bilinear(0.75, 0.5, &mut s).unwrap();
        assert_eq!(c, b);
    }

    #[test]
    fn test_parse_resampling() {
        assert_eq!("nearest".parse::<Resampling>().unwrap(), Resampling::Nearest);
        assert_eq!("Bilinear".parse::<Resampling>().unwrap(), Resampling::Bilinear);
        assert_eq!("cubic".parse::<Resampling>().unwrap(), Resampling::Cubic);
        assert!("lanczos".parse::<Resampling>().is_err());
    }
}
