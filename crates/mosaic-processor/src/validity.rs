//! Pixel validity predicates.
//!
//! A predicate maps a block and its nodata sentinel to a mask of the same
//! length. The default treats NaN-as-nodata and sentinel-as-nodata the same
//! way, so the merge driver never needs to know which convention a raster
//! uses.

/// Classifies the pixels of a block as valid or not.
pub trait ValidityPredicate: Send + Sync {
    fn mask(&self, block: &[f32], nodata: f32) -> Vec<bool>;
}

/// Finite and not equal to nodata.
#[derive(Debug, Clone, Copy, Default)]
pub struct FiniteNotNodata;

impl FiniteNotNodata {
    #[inline]
    pub fn is_valid(value: f32, nodata: f32) -> bool {
        value.is_finite() && value != nodata
    }
}

impl ValidityPredicate for FiniteNotNodata {
    fn mask(&self, block: &[f32], nodata: f32) -> Vec<bool> {
        block.iter().map(|&v| Self::is_valid(v, nodata)).collect()
    }
}

/// [`FiniteNotNodata`] restricted to an inclusive value range.
///
/// LAI tiles use codes above the physical range (e.g. 249-255 in the byte
/// products, 65530+ in the u16 ones) for water, urban and fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

impl ValidityPredicate for ValueRange {
    fn mask(&self, block: &[f32], nodata: f32) -> Vec<bool> {
        block
            .iter()
            .map(|&v| FiniteNotNodata::is_valid(v, nodata) && v >= self.min && v <= self.max)
            .collect()
    }
}

impl<F> ValidityPredicate for F
where
    F: Fn(&[f32], f32) -> Vec<bool> + Send + Sync,
{
    fn mask(&self, block: &[f32], nodata: f32) -> Vec<bool> {
        self(block, nodata)
    }
}
