//! Synthetic pixel data for mosaic tests.
//!
//! LAI products store leaf-area index as integer hundredths, so most
//! generators produce `u16` values in the 0..=700 range.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`, which makes it easy
/// to check that a pixel landed where it should.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// A grid filled with a single encoded value.
pub fn constant_u16(width: usize, height: usize, value: u16) -> Vec<u16> {
    vec![value; width * height]
}

/// Encoded LAI values (hundredths) following a diagonal ramp, 0..=700.
pub fn encoded_lai_ramp(width: usize, height: usize) -> Vec<u16> {
    let span = (width + height).max(2) - 2;
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let t = if span == 0 { 0.0 } else { (col + row) as f64 / span as f64 };
            data.push((t * 700.0).round() as u16);
        }
    }
    data
}

/// Replace a `border`-pixel frame around the grid with `nodata`.
pub fn with_nodata_border(mut data: Vec<u16>, width: usize, border: usize, nodata: u16) -> Vec<u16> {
    let height = data.len() / width.max(1);
    for row in 0..height {
        for col in 0..width {
            if row < border || col < border || row + border >= height || col + border >= width {
                data[row * width + col] = nodata;
            }
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
    }

    #[test]
    fn test_encoded_lai_ramp_range() {
        let ramp = encoded_lai_ramp(8, 5);
        assert_eq!(ramp[0], 0);
        assert_eq!(*ramp.last().unwrap(), 700);
        assert!(ramp.iter().all(|&v| v <= 700));
    }

    #[test]
    fn test_nodata_border() {
        let data = with_nodata_border(constant_u16(4, 4, 100), 4, 1, 65535);
        let valid: Vec<usize> = data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == 100)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(valid, vec![5, 6, 9, 10]);
    }
}
