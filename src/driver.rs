use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::MarketSource;
use crate::segmenter::RangeSegmenter;
use crate::sink::csv_store::{self, DedupStats};
use crate::sink::sheet::GoogleSheets;
use crate::types::{QueryWindow, ResultRecord};

/// Fixed-width inclusive score windows `[s, s+width-1]` for `s = floor,
/// floor+width, ...` while `s <= ceiling`.
pub fn score_windows(floor: u32, ceiling: u32, width: u32) -> Vec<(u32, u32)> {
    let width = width.max(1);
    (floor..=ceiling)
        .step_by(width as usize)
        .map(|start| (start, start + width - 1))
        .collect()
}

/// `<dir>/markets_YYYYmmdd_HHMMSS.csv`
pub fn output_filename(dir: &Path) -> PathBuf {
    let now = chrono::Local::now();
    dir.join(format!("markets_{}.csv", now.format("%Y%m%d_%H%M%S")))
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub windows: usize,
    pub total_records: usize,
    pub queries: usize,
    pub failed: Vec<QueryWindow>,
    pub truncated: Vec<QueryWindow>,
    pub dedup: Option<DedupStats>,
}

/// Walks the score dimension window by window and flushes each window's
/// records to the CSV store (and the sheet mirror, when enabled).
pub struct Driver<'a, S> {
    segmenter: RangeSegmenter<'a, S>,
    sheets: Option<GoogleSheets>,
    floor: u32,
    ceiling: u32,
    width: u32,
    output: PathBuf,
}

impl<'a, S: MarketSource> Driver<'a, S> {
    pub fn new(source: &'a S, cfg: &Config, output: PathBuf, sheets: Option<GoogleSheets>) -> Self {
        Self {
            segmenter: RangeSegmenter::new(source),
            sheets,
            floor: cfg.dsr_floor,
            ceiling: cfg.dsr_ceiling,
            width: cfg.dsr_window_width,
            output,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut aborted = None;

        for (min_dsr, max_dsr) in score_windows(self.floor, self.ceiling, self.width) {
            info!("Searching for markets with DSR between {min_dsr} and {max_dsr}");
            let mut acc = Vec::new();
            let segmented = self.segmenter.segment(min_dsr, max_dsr, &mut acc).await;
            let report = match segmented {
                Ok(report) => report,
                Err(e) => {
                    // records gathered before the rejection are still valid rows
                    error!("Stopping at DSR {min_dsr}-{max_dsr}: {e}");
                    self.flush(&acc, &mut summary).await?;
                    aborted = Some(e);
                    break;
                }
            };

            summary.windows += 1;
            summary.queries += report.queries;
            summary.failed.extend(report.failed);
            summary.truncated.extend(report.truncated);

            if report.escalations == 0 && !acc.is_empty() {
                info!("Found {} markets for DSR {min_dsr}-{max_dsr}. No segmentation needed.", acc.len());
            }

            if acc.is_empty() {
                warn!("No data found for DSR {min_dsr}-{max_dsr}");
                continue;
            }

            self.flush(&acc, &mut summary).await?;
            info!(
                "Saved {} records for DSR {min_dsr}-{max_dsr}. Total: {}",
                acc.len(),
                summary.total_records
            );
        }
        if aborted.is_none() {
            info!("Reached maximum DSR limit");
        }

        summary.dedup = csv_store::deduplicate(&self.output)?;
        if !summary.failed.is_empty() {
            error!(
                "{} queries failed; their windows are missing from {}",
                summary.failed.len(),
                self.output.display()
            );
            for w in &summary.failed {
                error!("Missing window: {w}");
            }
        }
        if !summary.truncated.is_empty() {
            warn!(
                "{} finest-split queries were still at the page cap and may be truncated",
                summary.truncated.len()
            );
        }
        info!(
            windows = summary.windows,
            queries = summary.queries,
            records = summary.total_records,
            "Data saved to {}",
            self.output.display()
        );
        match aborted {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn flush(&mut self, records: &[ResultRecord], summary: &mut RunSummary) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        csv_store::append(records, &self.output)?;
        if let Some(sheets) = self.sheets.as_mut() {
            sheets.append_records(records).await;
        }
        summary.total_records += records.len();
        Ok(())
    }
}
