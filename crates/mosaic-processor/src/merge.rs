//! Per-block merge of a reprojected tile into the mosaic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MosaicError;

/// How a tile's valid pixels interact with pixels already in the mosaic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MergePolicy {
    /// Valid source pixels always overwrite; the last tile wins.
    #[default]
    Source,
    /// Valid source pixels only fill destination gaps; the first tile wins.
    Destination,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }

    #[inline]
    fn takes(&self, dest_valid: bool, src_valid: bool) -> bool {
        match self {
            Self::Source => src_valid,
            Self::Destination => src_valid && !dest_valid,
        }
    }
}

impl FromStr for MergePolicy {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" | "src" | "source-wins" => Ok(Self::Source),
            "destination" | "dest" | "dst" | "destination-wins" => Ok(Self::Destination),
            other => Err(MosaicError::configuration(format!(
                "unsupported merge policy '{}', expected 'source' or 'destination'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for MergePolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|e: MosaicError| e.to_string())
    }
}

impl From<MergePolicy> for String {
    fn from(p: MergePolicy) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merge `src` into `dest` in place.
///
/// Only pixels where `src_valid` holds are candidates; `policy` decides
/// which of them are written. Written values are multiplied by `scale`
/// (in f64) when given. Pixels not written keep their destination value
/// untouched, valid or not.
///
/// Returns the number of pixels written. All slices must have the same
/// length.
pub fn merge_block(
    dest: &mut [f32],
    src: &[f32],
    dest_valid: &[bool],
    src_valid: &[bool],
    scale: Option<f64>,
    policy: MergePolicy,
) -> usize {
    debug_assert_eq!(dest.len(), src.len());
    debug_assert_eq!(dest.len(), dest_valid.len());
    debug_assert_eq!(dest.len(), src_valid.len());

    let scale = scale.filter(|s| *s != 1.0);
    let mut written = 0;
    for i in 0..dest.len() {
        if !policy.takes(dest_valid[i], src_valid[i]) {
            continue;
        }
        dest[i] = match scale {
            Some(s) => (src[i] as f64 * s) as f32,
            None => src[i],
        };
        written += 1;
    }
    written
}
