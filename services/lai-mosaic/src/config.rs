//! Monthly batch configuration.
//!
//! ```yaml
//! year: 2020
//! input_root: ${LAI_DATA:-~/lai}/2020
//! reference: ~/lai/reference_conus_30m.tif
//! output_root: ~/lai/mosaics
//! months: [Jan, Feb, Mar]            # default: Jan..Dec
//! output_template: "{year}_{month}_LAI.zarr"
//! merge:
//!   block_size: 512
//!   merge_policy: source
//!   scale_factor: 0.01
//! ```
//!
//! Supports environment variable substitution using ${VAR} syntax.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mosaic_processor::{MergeOptions, MosaicJob};
use serde::{Deserialize, Serialize};

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn default_months() -> Vec<String> {
    MONTHS.iter().map(|m| m.to_string()).collect()
}

fn default_template() -> String {
    "{year}_{month}_LAI.zarr".to_string()
}

/// One year of monthly mosaics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyConfig {
    pub year: i32,

    /// Holds one sub-directory of tiles per month label.
    pub input_root: PathBuf,

    /// Raster defining the output grid.
    pub reference: PathBuf,

    pub output_root: PathBuf,

    #[serde(default = "default_months")]
    pub months: Vec<String>,

    /// Output name; `{year}` and `{month}` are substituted.
    #[serde(default = "default_template")]
    pub output_template: String,

    #[serde(default)]
    pub merge: MergeOptions,
}

impl MonthlyConfig {
    pub fn input_dir(&self, month: &str) -> PathBuf {
        self.input_root.join(month)
    }

    pub fn output_path(&self, month: &str) -> PathBuf {
        let name = self
            .output_template
            .replace("{year}", &self.year.to_string())
            .replace("{month}", month);
        self.output_root.join(name)
    }

    pub fn job(&self, month: &str) -> MosaicJob {
        MosaicJob::new(self.input_dir(month), &self.reference, self.output_path(month))
    }

    fn expand_paths(&mut self) {
        self.input_root = expand_tilde(&self.input_root);
        self.reference = expand_tilde(&self.reference);
        self.output_root = expand_tilde(&self.output_root);
    }

    fn validate(&self) -> Result<()> {
        if self.months.is_empty() {
            anyhow::bail!("months must list at least one month");
        }
        if self.months.len() > 1 && !self.output_template.contains("{month}") {
            anyhow::bail!(
                "output_template '{}' has no {{month}} placeholder; every month would overwrite the same output",
                self.output_template
            );
        }
        self.merge.validate().context("Invalid merge options")?;
        Ok(())
    }
}

/// Load a monthly config file with environment variable substitution.
pub fn load_monthly_config<P: AsRef<Path>>(path: P) -> Result<MonthlyConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read monthly config from {:?}", path.as_ref()))?;

    let expanded = expand_env_vars(&content)?;

    let mut config: MonthlyConfig = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse monthly config from {:?}", path.as_ref()))?;

    config.expand_paths();
    config.validate()?;

    Ok(config)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content.
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut expr = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) => expr.push(c),
                None => anyhow::bail!("Unclosed variable substitution: ${{{}", expr),
            }
        }
        result.push_str(&resolve_var_expr(&expr)?);
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
