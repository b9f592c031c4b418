//! LAI mosaic tool.
//!
//! Merges per-state monthly LAI GeoTIFF tiles into one Zarr mosaic aligned
//! to a reference grid, either once (`merge`) or for every month of a year
//! (`monthly`).

mod config;
mod monthly;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use mosaic_processor::{
    Compression, LargeFileMode, MergeOptions, MergePolicy, MosaicJob, Mosaicker, OnTileError, OverviewOutcome,
    Resampling,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::load_monthly_config;
use monthly::run_monthly;
use progress::TileProgressBar;

#[derive(Parser, Debug)]
#[command(name = "lai-mosaic")]
#[command(about = "Grid-aligned mosaics of monthly LAI tiles")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build one mosaic from a directory of tiles
    Merge {
        /// Directory containing the input tiles
        #[arg(short, long)]
        input: PathBuf,

        /// Raster defining the output grid
        #[arg(short, long)]
        reference: PathBuf,

        /// Output mosaic (Zarr directory)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        overrides: MergeOverrides,
    },

    /// Build one mosaic per month from a YAML config
    Monthly {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,

        /// Only these months (default: all configured)
        #[arg(short, long)]
        month: Vec<String>,

        #[command(flatten)]
        overrides: MergeOverrides,
    },
}

/// Command-line overrides applied on top of the configured options.
#[derive(ClapArgs, Debug, Default)]
struct MergeOverrides {
    /// Block size in pixels
    #[arg(long)]
    block_size: Option<usize>,

    /// source (last tile wins) or destination (first tile wins)
    #[arg(long)]
    merge_policy: Option<MergePolicy>,

    /// Output nodata value
    #[arg(long, allow_hyphen_values = true)]
    nodata: Option<f64>,

    /// nearest, bilinear or cubic
    #[arg(long)]
    resampling: Option<Resampling>,

    /// none, lz4 (lzw), zstd or zlib (deflate)
    #[arg(long)]
    compression: Option<Compression>,

    /// yes, no, if-needed or if-safer
    #[arg(long)]
    large_file: Option<LargeFileMode>,

    /// Multiplier applied to valid tile values
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Write tile values unscaled
    #[arg(long, conflicts_with = "scale_factor")]
    no_scale: bool,

    /// Only scan the top level of the input directory
    #[arg(long)]
    no_recursive: bool,

    /// Skip overview generation
    #[arg(long)]
    no_overviews: bool,

    /// Skip tiles that fail to open or reproject instead of aborting
    #[arg(long)]
    skip_bad_tiles: bool,
}

impl MergeOverrides {
    fn apply(&self, options: &mut MergeOptions) {
        if let Some(v) = self.block_size {
            options.block_size = v;
        }
        if let Some(v) = self.merge_policy {
            options.merge_policy = v;
        }
        if let Some(v) = self.nodata {
            options.output_nodata = Some(v);
        }
        if let Some(v) = self.resampling {
            options.resampling = v;
        }
        if let Some(v) = self.compression {
            options.compression = v;
        }
        if let Some(v) = self.large_file {
            options.large_file_mode = v;
        }
        if let Some(v) = self.scale_factor {
            options.scale_factor = Some(v);
        }
        if self.no_scale {
            options.scale_factor = None;
        }
        if self.no_recursive {
            options.recursive = false;
        }
        if self.no_overviews {
            options.overviews.enabled = false;
        }
        if self.skip_bad_tiles {
            options.on_tile_error = OnTileError::Skip;
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    match args.command {
        Command::Merge {
            input,
            reference,
            output,
            overrides,
        } => {
            let mut options = MergeOptions::from_env().context("Invalid MOSAIC_* environment")?;
            overrides.apply(&mut options);

            let job = MosaicJob::new(
                config::expand_tilde(&input),
                config::expand_tilde(&reference),
                config::expand_tilde(&output),
            );
            let progress = if args.no_progress {
                TileProgressBar::hidden()
            } else {
                TileProgressBar::new("merge")
            };

            let report = Mosaicker::new(options)
                .with_progress(Arc::new(progress))
                .run(&job)
                .with_context(|| format!("Failed to build mosaic {}", job.output.display()))?;

            if let OverviewOutcome::Failed(reason) = &report.overviews {
                warn!(reason = %reason, "Mosaic written without overviews");
            }
            info!(
                output = %report.output.display(),
                tiles = report.tiles_merged.len(),
                skipped = report.tiles_skipped.len(),
                pixels = report.pixels_written,
                elapsed_s = report.duration().num_seconds(),
                "Done"
            );
            Ok(())
        }

        Command::Monthly {
            config,
            month,
            overrides,
        } => {
            let mut monthly = load_monthly_config(&config)?;
            overrides.apply(&mut monthly.merge);
            monthly.merge.validate().context("Invalid merge options")?;

            let outcomes = run_monthly(&monthly, &month, !args.no_progress);
            let failed: Vec<&str> = outcomes
                .iter()
                .filter(|o| o.failed())
                .map(|o| o.month.as_str())
                .collect();

            info!(
                year = monthly.year,
                months = outcomes.len(),
                failed = failed.len(),
                "Monthly run finished"
            );

            if !failed.is_empty() {
                anyhow::bail!("{} of {} months failed: {}", failed.len(), outcomes.len(), failed.join(", "));
            }
            Ok(())
        }
    }
}
