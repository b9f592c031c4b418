//! The seasonal driver: one mosaic per month.

use std::sync::Arc;

use mosaic_processor::{MosaicReport, Mosaicker};
use tracing::{error, info, warn};

use crate::config::MonthlyConfig;
use crate::progress::TileProgressBar;

/// Result of one month.
#[derive(Debug)]
pub enum MonthStatus {
    Merged(MosaicReport),
    /// No input directory for the month.
    Missing,
    Failed(String),
}

#[derive(Debug)]
pub struct MonthOutcome {
    pub month: String,
    pub status: MonthStatus,
}

impl MonthOutcome {
    pub fn failed(&self) -> bool {
        matches!(self.status, MonthStatus::Failed(_))
    }
}

/// Mosaic every configured month, or only those in `only` when it is not
/// empty. A failing month does not stop the loop.
pub fn run_monthly(config: &MonthlyConfig, only: &[String], show_progress: bool) -> Vec<MonthOutcome> {
    let months: Vec<&String> = config
        .months
        .iter()
        .filter(|m| only.is_empty() || only.iter().any(|o| o.eq_ignore_ascii_case(m)))
        .collect();

    info!(year = config.year, months = months.len(), "Starting monthly mosaics");

    let mut outcomes = Vec::with_capacity(months.len());
    for month in months {
        let job = config.job(month);
        if !job.input_dir.is_dir() {
            warn!(month = %month, input = %job.input_dir.display(), "No input directory, skipping month");
            outcomes.push(MonthOutcome {
                month: month.clone(),
                status: MonthStatus::Missing,
            });
            continue;
        }

        let progress = if show_progress {
            TileProgressBar::new(format!("{} {}", config.year, month))
        } else {
            TileProgressBar::hidden()
        };
        let mosaicker = Mosaicker::new(config.merge.clone()).with_progress(Arc::new(progress));

        let status = match mosaicker.run(&job) {
            Ok(report) => {
                info!(
                    month = %month,
                    output = %report.output.display(),
                    tiles = report.tiles_merged.len(),
                    skipped = report.tiles_skipped.len(),
                    elapsed_s = report.duration().num_seconds(),
                    "Month complete"
                );
                MonthStatus::Merged(report)
            }
            Err(e) => {
                error!(month = %month, error = %e, "Month failed");
                MonthStatus::Failed(e.to_string())
            }
        };
        outcomes.push(MonthOutcome {
            month: month.clone(),
            status,
        });
    }

    outcomes
}
