//! Configuration for the mosaic processor.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use raster_io::Resampling;
use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::merge::MergePolicy;

/// Options for one mosaic run. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Scan the input directory recursively.
    pub recursive: bool,

    /// File extensions to pick up, one discovery pass each, in this order.
    pub extensions: Vec<String>,

    /// Side of the square blocks used for every read and write.
    pub block_size: usize,

    /// How a tile's valid pixels interact with pixels already in the mosaic.
    pub merge_policy: MergePolicy,

    /// Output nodata; falls back to the reference nodata, then -9999.
    pub output_nodata: Option<f64>,

    /// Resampling used when warping tiles onto the reference grid.
    pub resampling: Resampling,

    /// Compression codec for the output chunks.
    pub compression: Compression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Byte-shuffle filter ahead of compression.
    pub predictor: bool,

    /// Policy for outputs whose uncompressed payload exceeds 4 GiB.
    pub large_file_mode: LargeFileMode,

    /// Multiplier applied to valid source values; `None` or 1.0 disables it.
    pub scale_factor: Option<f64>,

    /// Decoded-chunk cache budget per open tile, in megabytes.
    pub tile_cache_mb: usize,

    /// What to do when a single tile fails.
    pub on_tile_error: OnTileError,

    /// Overview (pyramid) generation.
    pub overviews: OverviewOptions,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            extensions: vec!["tif".to_string(), "tiff".to_string()],
            block_size: 512,
            merge_policy: MergePolicy::Source,
            output_nodata: None,
            resampling: Resampling::Nearest,
            compression: Compression::Lz4,
            compression_level: 5,
            predictor: true,
            large_file_mode: LargeFileMode::IfSafer,
            scale_factor: Some(0.01),
            tile_cache_mb: 256,
            on_tile_error: OnTileError::Abort,
            overviews: OverviewOptions::default(),
        }
    }
}

impl MergeOptions {
    /// Defaults overridden by `MOSAIC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `MOSAIC_*` environment variables on top of these options.
    ///
    /// Unlike a silent fallback, a variable that is set but unparsable is a
    /// configuration error naming the variable.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<bool>("MOSAIC_RECURSIVE")? {
            self.recursive = v;
        }
        if let Ok(val) = std::env::var("MOSAIC_EXTENSIONS") {
            self.extensions = val
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = env_parse("MOSAIC_BLOCK_SIZE")? {
            self.block_size = v;
        }
        if let Some(v) = env_parse("MOSAIC_MERGE_POLICY")? {
            self.merge_policy = v;
        }
        if let Ok(val) = std::env::var("MOSAIC_OUTPUT_NODATA") {
            self.output_nodata = parse_optional_f64("MOSAIC_OUTPUT_NODATA", &val)?;
        }
        if let Some(v) = env_parse("MOSAIC_RESAMPLING")? {
            self.resampling = v;
        }
        if let Some(v) = env_parse("MOSAIC_COMPRESSION")? {
            self.compression = v;
        }
        if let Some(v) = env_parse("MOSAIC_COMPRESSION_LEVEL")? {
            self.compression_level = v;
        }
        if let Some(v) = env_parse::<bool>("MOSAIC_PREDICTOR")? {
            self.predictor = v;
        }
        if let Some(v) = env_parse("MOSAIC_LARGE_FILE")? {
            self.large_file_mode = v;
        }
        if let Ok(val) = std::env::var("MOSAIC_SCALE_FACTOR") {
            self.scale_factor = parse_optional_f64("MOSAIC_SCALE_FACTOR", &val)?;
        }
        if let Some(v) = env_parse("MOSAIC_TILE_CACHE_MB")? {
            self.tile_cache_mb = v;
        }
        if let Some(v) = env_parse("MOSAIC_ON_TILE_ERROR")? {
            self.on_tile_error = v;
        }
        if let Ok(val) = std::env::var("MOSAIC_OVERVIEWS") {
            self.overviews.apply_factor_list(&val)?;
        }
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(MosaicError::configuration("block_size must be > 0"));
        }
        if self.extensions.is_empty() {
            return Err(MosaicError::configuration(
                "extensions must name at least one file extension",
            ));
        }
        if self.compression_level == 0 || self.compression_level > 9 {
            return Err(MosaicError::configuration("compression_level must be 1-9"));
        }
        if self.tile_cache_mb == 0 {
            return Err(MosaicError::configuration("tile_cache_mb must be > 0"));
        }
        if let Some(scale) = self.scale_factor {
            if !scale.is_finite() {
                return Err(MosaicError::configuration(format!(
                    "scale_factor must be finite, got {}",
                    scale
                )));
            }
        }
        self.overviews.validate()
    }

    /// Scale factor to actually apply, if any.
    pub fn effective_scale(&self) -> Option<f64> {
        self.scale_factor.filter(|s| *s != 1.0)
    }

    /// Tile chunk cache budget in bytes.
    pub fn tile_cache_bytes(&self) -> usize {
        self.tile_cache_mb * 1024 * 1024
    }
}

/// The three paths of one mosaic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicJob {
    pub input_dir: PathBuf,
    pub reference: PathBuf,
    pub output: PathBuf,
}

impl MosaicJob {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        reference: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            reference: reference.into(),
            output: output.into(),
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| MosaicError::configuration(format!("invalid {}='{}': {}", name, val, e))),
        Err(_) => Ok(None),
    }
}

fn parse_optional_f64(name: &str, val: &str) -> Result<Option<f64>> {
    let trimmed = val.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|e| MosaicError::configuration(format!("invalid {}='{}': {}", name, val, e)))
}

// ============================================================================
// Codec and file-size options
// ============================================================================

/// Compression codec for the output chunks (Blosc compressors).
///
/// GDAL creation-option names are accepted: `lzw` selects LZ4 and `deflate`
/// selects zlib, the closest Blosc equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Compression {
    None,
    Lz4,
    Zstd,
    Zlib,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::Zlib => "zlib",
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" | "lzw" | "blosc_lz4" => Ok(Self::Lz4),
            "zstd" | "blosc_zstd" => Ok(Self::Zstd),
            "zlib" | "deflate" => Ok(Self::Zlib),
            other => Err(format!(
                "unsupported compression '{}', expected none, lz4 (lzw), zstd or zlib (deflate)",
                other
            )),
        }
    }
}

impl TryFrom<String> for Compression {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Compression> for String {
    fn from(c: Compression) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 4 GiB: the classic TIFF offset limit.
pub const LARGE_FILE_THRESHOLD: u64 = 4 * 1024 * 1024 * 1024;

/// What to do about outputs that may exceed [`LARGE_FILE_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LargeFileMode {
    Yes,
    No,
    IfNeeded,
    IfSafer,
}

impl LargeFileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::IfNeeded => "if-needed",
            Self::IfSafer => "if-safer",
        }
    }

    /// Decide whether an output of `payload_bytes` (uncompressed) is "large".
    ///
    /// `if-safer` uses half the hard threshold since compression ratios are
    /// not known up front.
    pub fn resolve(&self, payload_bytes: u64) -> std::result::Result<bool, String> {
        match self {
            Self::Yes => Ok(true),
            Self::No if payload_bytes >= LARGE_FILE_THRESHOLD => Err(format!(
                "output payload is {} bytes (>= 4 GiB) but large_file_mode is 'no'; \
                 set large_file_mode to 'if-safer' or 'yes'",
                payload_bytes
            )),
            Self::No => Ok(false),
            Self::IfNeeded => Ok(payload_bytes >= LARGE_FILE_THRESHOLD),
            Self::IfSafer => Ok(payload_bytes >= LARGE_FILE_THRESHOLD / 2),
        }
    }
}

impl FromStr for LargeFileMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "if-needed" => Ok(Self::IfNeeded),
            "if-safer" => Ok(Self::IfSafer),
            other => Err(format!(
                "unsupported large_file_mode '{}', expected yes, no, if-needed or if-safer",
                other
            )),
        }
    }
}

impl TryFrom<String> for LargeFileMode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LargeFileMode> for String {
    fn from(m: LargeFileMode) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for LargeFileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handling of a tile that fails to open, reproject or decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnTileError {
    /// Stop the run, leaving a partially merged mosaic.
    #[default]
    Abort,
    /// Log the failure, record it in the report and continue.
    Skip,
}

impl FromStr for OnTileError {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unsupported on_tile_error '{}', expected abort or skip", other)),
        }
    }
}

// ============================================================================
// Overview Configuration
// ============================================================================

/// Method used to aggregate pixels into an overview cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewMethod {
    /// Mean of the valid pixels.
    #[default]
    #[serde(alias = "mean")]
    Average,
    /// Top-left pixel of the cell.
    Nearest,
    /// Maximum of the valid pixels.
    Max,
}

impl OverviewMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Nearest => "nearest",
            Self::Max => "max",
        }
    }
}

impl FromStr for OverviewMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "average" | "mean" => Ok(Self::Average),
            "nearest" => Ok(Self::Nearest),
            "max" => Ok(Self::Max),
            other => Err(format!(
                "unsupported overview method '{}', expected average, nearest or max",
                other
            )),
        }
    }
}

impl fmt::Display for OverviewMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for overview generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewOptions {
    pub enabled: bool,

    /// Decimation factors relative to full resolution.
    pub factors: Vec<usize>,

    pub method: OverviewMethod,
}

impl Default for OverviewOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            factors: vec![2, 4, 8, 16, 32],
            method: OverviewMethod::Average,
        }
    }
}

impl OverviewOptions {
    /// Factors must be > 1, strictly increasing, and each must divide the
    /// next so every level can be cascaded from the previous one.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut prev = 1usize;
        for &factor in &self.factors {
            if factor <= prev || factor % prev != 0 {
                return Err(MosaicError::configuration(format!(
                    "overview factors must be increasing multiples of each other, got {:?}",
                    self.factors
                )));
            }
            prev = factor;
        }
        Ok(())
    }

    /// Parse `"2,4,8"`; `"none"`, `"off"` or `"false"` disables overviews.
    fn apply_factor_list(&mut self, val: &str) -> Result<()> {
        let trimmed = val.trim().to_lowercase();
        if matches!(trimmed.as_str(), "" | "none" | "off" | "false") {
            self.enabled = false;
            return Ok(());
        }
        self.factors = trimmed
            .split(',')
            .map(|s| s.trim().parse::<usize>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| MosaicError::configuration(format!("invalid MOSAIC_OVERVIEWS='{}': {}", val, e)))?;
        self.enabled = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = MergeOptions::default();
        opts.validate().unwrap();
        assert_eq!(opts.block_size, 512);
        assert_eq!(opts.merge_policy, MergePolicy::Source);
        assert_eq!(opts.compression, Compression::Lz4);
        assert_eq!(opts.large_file_mode, LargeFileMode::IfSafer);
        assert_eq!(opts.scale_factor, Some(0.01));
        assert_eq!(opts.overviews.factors, vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let opts = MergeOptions {
            block_size: 0,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(MosaicError::Configuration(_))));

        let opts = MergeOptions {
            compression_level: 10,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let mut opts = MergeOptions::default();
        opts.overviews.factors = vec![2, 3];
        assert!(opts.validate().is_err());
        opts.overviews.enabled = false;
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_effective_scale() {
        let mut opts = MergeOptions::default();
        assert_eq!(opts.effective_scale(), Some(0.01));
        opts.scale_factor = Some(1.0);
        assert_eq!(opts.effective_scale(), None);
        opts.scale_factor = None;
        assert_eq!(opts.effective_scale(), None);
    }

    #[test]
    fn test_compression_aliases() {
        assert_eq!("LZW".parse::<Compression>().unwrap(), Compression::Lz4);
        assert_eq!("deflate".parse::<Compression>().unwrap(), Compression::Zlib);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("jpeg".parse::<Compression>().is_err());
    }

    #[test]
    fn test_large_file_resolution() {
        let gib = 1024u64 * 1024 * 1024;
        assert_eq!(LargeFileMode::IfSafer.resolve(3 * gib), Ok(true));
        assert_eq!(LargeFileMode::IfSafer.resolve(gib), Ok(false));
        assert_eq!(LargeFileMode::IfNeeded.resolve(3 * gib), Ok(false));
        assert_eq!(LargeFileMode::Yes.resolve(1), Ok(true));
        assert!(LargeFileMode::No.resolve(5 * gib).is_err());
        assert_eq!(LargeFileMode::No.resolve(gib), Ok(false));
        assert_eq!("IF_SAFER".parse::<LargeFileMode>().unwrap(), LargeFileMode::IfSafer);
    }

    #[test]
    fn test_options_from_json_with_defaults() {
        let opts: MergeOptions = serde_json::from_str(
            r#"{"merge_policy": "dest", "compression": "lzw", "scale_factor": null,
                "overviews": {"method": "mean"}}"#,
        )
        .unwrap();
        assert_eq!(opts.merge_policy, MergePolicy::Destination);
        assert_eq!(opts.compression, Compression::Lz4);
        assert_eq!(opts.scale_factor, None);
        assert_eq!(opts.overviews.method, OverviewMethod::Average);
        assert_eq!(opts.block_size, 512);

        let err = serde_json::from_str::<MergeOptions>(r#"{"merge_policy": "newest"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_env_overrides() {
        // The only test in this crate touching MOSAIC_* variables.
        std::env::set_var("MOSAIC_BLOCK_SIZE", "256");
        std::env::set_var("MOSAIC_MERGE_POLICY", "dest");
        std::env::set_var("MOSAIC_SCALE_FACTOR", "none");
        std::env::set_var("MOSAIC_OVERVIEWS", "off");
        let opts = MergeOptions::from_env().unwrap();
        assert_eq!(opts.block_size, 256);
        assert_eq!(opts.merge_policy, MergePolicy::Destination);
        assert_eq!(opts.scale_factor, None);
        assert!(!opts.overviews.enabled);

        std::env::set_var("MOSAIC_MERGE_POLICY", "newest");
        let err = MergeOptions::from_env().unwrap_err();
        assert!(err.to_string().contains("MOSAIC_MERGE_POLICY"));

        for var in [
            "MOSAIC_BLOCK_SIZE",
            "MOSAIC_MERGE_POLICY",
            "MOSAIC_SCALE_FACTOR",
            "MOSAIC_OVERVIEWS",
        ] {
            std::env::remove_var(var);
        }
    }
}
