use tracing::{error, info, warn};

use crate::config::{RENTER_MICRO_SPLITS, RENTER_QUARTERS};
use crate::error::{AppError, Result};
use crate::fetcher::MarketSource;
use crate::types::{FetchFailure, FetchOutcome, QueryWindow, Region, ResultRecord};

/// Position of a window in the fallback cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Level 0: whole score range, every region in one query.
    Combined,
    /// Level 1: one query per region.
    Region,
    /// Level 2: region split into renter-percentage quarters.
    RentersQuarter,
    /// Level 3: score range collapsed to one boundary point.
    ScorePoint,
    /// Level 3 floor: boundary point with a fifth of the renter quarter.
    MicroRange,
}

impl Stage {
    pub fn level(self) -> u8 {
        match self {
            Stage::Combined => 0,
            Stage::Region => 1,
            Stage::RentersQuarter => 2,
            Stage::ScorePoint | Stage::MicroRange => 3,
        }
    }

    /// Narrower windows to try when `window` came back at the page cap.
    /// Empty at the floor.
    fn children(self, window: &QueryWindow) -> Vec<(Stage, QueryWindow)> {
        match self {
            Stage::Combined => Region::ALL
                .iter()
                .map(|&r| (Stage::Region, window.in_region(r)))
                .collect(),
            Stage::Region => split_range(window.renters_min, window.renters_max, RENTER_QUARTERS)
                .into_iter()
                .map(|(lo, hi)| (Stage::RentersQuarter, window.with_renters(lo, hi)))
                .collect(),
            // A window that is already a single score point would re-issue the
            // same query, so it goes straight to micro ranges.
            Stage::RentersQuarter if window.score_min == window.score_max => {
                Stage::ScorePoint.children(window)
            }
            Stage::RentersQuarter => [window.score_min, window.score_max]
                .into_iter()
                .map(|s| (Stage::ScorePoint, window.at_score(s)))
                .collect(),
            Stage::ScorePoint => split_range(window.renters_min, window.renters_max, RENTER_MICRO_SPLITS)
                .into_iter()
                .map(|(lo, hi)| (Stage::MicroRange, window.with_renters(lo, hi)))
                .collect(),
            Stage::MicroRange => Vec::new(),
        }
    }
}

/// Split `[lo, hi]` into `parts` contiguous inclusive ranges of width
/// `(hi - lo) / parts`. Neighbours share a boundary; the last range ends at
/// `hi` and absorbs the integer-division remainder.
pub fn split_range(lo: u32, hi: u32, parts: u32) -> Vec<(u32, u32)> {
    let parts = parts.max(1);
    let step = hi.saturating_sub(lo) / parts;
    (0..parts)
        .map(|i| {
            let start = lo + i * step;
            let end = if i + 1 < parts { start + step } else { hi };
            (start, end)
        })
        .collect()
}

/// Bookkeeping for one top-level score window.
#[derive(Debug, Default)]
pub struct SegmentReport {
    pub queries: usize,
    pub escalations: usize,
    /// Leaf windows whose records were accepted.
    pub accepted: Vec<QueryWindow>,
    /// Floor windows accepted while still at the page cap.
    pub truncated: Vec<QueryWindow>,
    /// Windows whose query failed. Their data is missing, not empty.
    pub failed: Vec<QueryWindow>,
    pub records: usize,
}

/// Adaptive cascade that narrows a score window until every leaf query fits
/// under the page cap.
pub struct RangeSegmenter<'a, S> {
    source: &'a S,
}

impl<'a, S: MarketSource> RangeSegmenter<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Fetch every record for `[score_min, score_max]` into `acc`.
    ///
    /// Windows are processed depth-first from an explicit stack: a capped
    /// window is replaced by its children, an uncapped one is accepted.
    /// Failed queries are recorded and skipped; a rejected session aborts.
    pub async fn segment(
        &self,
        score_min: u32,
        score_max: u32,
        acc: &mut Vec<ResultRecord>,
    ) -> Result<SegmentReport> {
        let mut report = SegmentReport::default();
        let mut stack = vec![(Stage::Combined, QueryWindow::scores(score_min, score_max))];

        while let Some((stage, window)) = stack.pop() {
            info!(level = stage.level(), "Searching for markets with {window}");
            let outcome = self.source.fetch(&window).await;
            report.queries += 1;

            let page = match outcome {
                FetchOutcome::Failed(FetchFailure::Unauthorized(code)) => {
                    error!("Session rejected while fetching {window}");
                    return Err(AppError::Unauthorized(code));
                }
                FetchOutcome::Failed(reason) => {
                    error!(level = stage.level(), "Query failed for {window}: {reason}. Data for this window is missing");
                    report.failed.push(window);
                    continue;
                }
                FetchOutcome::Empty => Vec::new(),
                FetchOutcome::Records(page) => {
                    if page.hit_cap {
                        let children = stage.children(&window);
                        if !children.is_empty() {
                            warn!(
                                level = stage.level(),
                                "Hit {}+ results for {window}. Splitting into {} narrower queries",
                                page.records.len(),
                                children.len()
                            );
                            report.escalations += 1;
                            stack.extend(children.into_iter().rev());
                            continue;
                        }
                        warn!(
                            level = stage.level(),
                            "{window} still returns {}+ results at the finest split. Accepting possibly truncated data",
                            page.records.len()
                        );
                        report.truncated.push(window);
                    }
                    page.records
                }
            };

            info!(
                level = stage.level(),
                "Found {} markets for {window}. Adding to window results",
                page.len()
            );
            report.records += page.len();
            report.accepted.push(window);
            acc.extend(page);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{page, ScriptedSource};

    /// Every integer (score, region, renters) point inside the top-level
    /// window is covered by some accepted leaf.
    fn assert_covers(report: &SegmentReport, score_min: u32, score_max: u32) {
        for score in score_min..=score_max {
            for region in Region::ALL {
                for renters in 0..=100 {
                    let covered = report.accepted.iter().any(|w| {
                        w.score_min <= score
                            && score <= w.score_max
                            && w.region.map_or(true, |r| r == region)
                            && w.renters_min <= renters
                            && renters <= w.renters_max
                    });
                    assert!(covered, "gap at DSR {score} {region} renters {renters}");
                }
            }
        }
    }

    #[test]
    fn quarters_span_full_renter_axis() {
        assert_eq!(
            split_range(0, 100, 4),
            vec![(0, 25), (25, 50), (50, 75), (75, 100)]
        );
    }

    #[test]
    fn micro_ranges_split_a_quarter_in_five() {
        assert_eq!(
            split_range(25, 50, 5),
            vec![(25, 30), (30, 35), (35, 40), (40, 45), (45, 50)]
        );
    }

    #[test]
    fn last_micro_range_absorbs_remainder() {
        let ranges = split_range(0, 23, 5);
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[0], (0, 4));
        assert_eq!(ranges[4], (16, 23));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn narrow_range_still_yields_five_parts() {
        let ranges = split_range(10, 12, 5);
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges.first().unwrap().0, 10);
        assert_eq!(ranges.last().unwrap(), &(10, 12));
    }

    #[tokio::test]
    async fn under_cap_window_is_accepted_without_escalation() {
        let source = ScriptedSource::new(|w| page(w, 40));
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(30, 31, &mut acc).await.unwrap();

        assert_eq!(acc.len(), 40);
        assert_eq!(report.queries, 1);
        assert_eq!(report.escalations, 0);
        assert_eq!(report.accepted, vec![QueryWindow::scores(30, 31)]);
        assert_covers(&report, 30, 31);
    }

    #[tokio::test]
    async fn capped_region_is_settled_by_renter_quarters() {
        let source = ScriptedSource::new(|w| match (w.region, w.renters_min, w.renters_max) {
            (None, _, _) => page(w, 250),
            (Some(Region::Nsw), 0, 100) => page(w, 260),
            (Some(Region::Nsw), _, _) => page(w, 60),
            (Some(_), _, _) => page(w, 30),
        });
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(32, 33, &mut acc).await.unwrap();

        assert_eq!(acc.len(), 4 * 60 + 7 * 30);
        assert_eq!(report.records, acc.len());
        assert_eq!(report.queries, 1 + 8 + 4);
        assert_eq!(report.escalations, 2);
        assert!(report.truncated.is_empty());
        assert_covers(&report, 32, 33);

        let calls = source.calls();
        let nsw_quarters: Vec<_> = calls
            .iter()
            .filter(|w| w.region == Some(Region::Nsw) && w.renters_max - w.renters_min == 25)
            .map(|w| (w.renters_min, w.renters_max))
            .collect();
        assert_eq!(nsw_quarters, vec![(0, 25), (25, 50), (50, 75), (75, 100)]);
    }

    #[tokio::test]
    async fn regions_are_walked_depth_first_in_fixed_order() {
        let source = ScriptedSource::new(|w| match (w.region, w.renters_max - w.renters_min) {
            (None, _) => page(w, 250),
            (Some(Region::Qld), 100) => page(w, 250),
            _ => page(w, 1),
        });
        let mut acc = Vec::new();
        RangeSegmenter::new(&source).segment(32, 33, &mut acc).await.unwrap();

        let order: Vec<_> = source
            .calls()
            .iter()
            .skip(1)
            .map(|w| (w.region.unwrap(), w.renters_min))
            .collect();
        assert_eq!(order[0], (Region::Qld, 0));
        assert_eq!(&order[1..5], &[(Region::Qld, 0), (Region::Qld, 25), (Region::Qld, 50), (Region::Qld, 75)]);
        assert_eq!(order[5].0, Region::Nsw);
        assert_eq!(order.last().unwrap().0, Region::Act);
    }

    #[tokio::test]
    async fn saturated_quarter_triggers_two_score_point_queries() {
        let source = ScriptedSource::new(|w| {
            match (w.region, w.renters_min, w.renters_max, w.score_min == w.score_max) {
                (None, ..) => page(w, 250),
                (Some(Region::Nsw), 0, 100, _) => page(w, 260),
                (Some(Region::Nsw), 0, 25, false) => page(w, 250),
                (Some(Region::Nsw), 0, 25, true) => page(w, 10),
                _ => page(w, 5),
            }
        });
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(32, 33, &mut acc).await.unwrap();

        let points: Vec<_> = source
            .calls()
            .into_iter()
            .filter(|w| w.score_min == w.score_max)
            .map(|w| (w.score_min, w.renters_min, w.renters_max))
            .collect();
        assert_eq!(points, vec![(32, 0, 25), (33, 0, 25)]);
        assert_eq!(report.escalations, 3);
        assert_eq!(acc.len(), 2 * 10 + 3 * 5 + 7 * 5);
        assert_covers(&report, 32, 33);
    }

    #[tokio::test]
    async fn saturated_score_point_falls_back_to_micro_ranges() {
        let source = ScriptedSource::new(|w| {
            let point = w.score_min == w.score_max;
            match (w.region, w.renters_min, w.renters_max) {
                (None, ..) => page(w, 250),
                (Some(Region::Vic), 0, 100) => page(w, 250),
                (Some(Region::Vic), 50, 75) if !point => page(w, 250),
                (Some(Region::Vic), 50, 75) if w.score_min == 40 => page(w, 250),
                // floor leaves may still be capped; they are accepted anyway
                (Some(Region::Vic), 55, 60) if point => page(w, 250),
                _ => page(w, 3),
            }
        });
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(40, 41, &mut acc).await.unwrap();

        let micro: Vec<_> = source
            .calls()
            .into_iter()
            .filter(|w| w.score_min == 40 && w.score_max == 40 && w.renters_max - w.renters_min == 5)
            .map(|w| (w.renters_min, w.renters_max))
            .collect();
        assert_eq!(micro, vec![(50, 55), (55, 60), (60, 65), (65, 70), (70, 75)]);
        assert_eq!(report.truncated.len(), 1);
        assert_eq!(report.truncated[0].renters_min, 55);
        assert_eq!(report.queries, 1 + 8 + 4 + 2 + 5);
        assert_covers(&report, 40, 41);
    }

    #[tokio::test]
    async fn single_point_window_skips_straight_to_micro_ranges() {
        let source = ScriptedSource::new(|w| match (w.region, w.renters_max - w.renters_min) {
            (None, _) => page(w, 250),
            (Some(Region::Sa), 100) => page(w, 250),
            (Some(Region::Sa), 25) if w.renters_min == 0 => page(w, 250),
            _ => page(w, 2),
        });
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(50, 50, &mut acc).await.unwrap();

        // combined + 8 regions + 4 quarters + 5 micro ranges of the saturated quarter
        assert_eq!(report.queries, 1 + 8 + 4 + 5);
        let calls = source.calls();
        for (i, w) in calls.iter().enumerate() {
            assert!(!calls[..i].contains(w), "window queried twice: {w}");
        }
        assert_covers(&report, 50, 50);
    }

    #[tokio::test]
    async fn failed_query_is_recorded_not_escalated() {
        let source = ScriptedSource::new(|w| match w.region {
            None => page(w, 250),
            Some(Region::Wa) => FetchOutcome::Failed(FetchFailure::Status(502)),
            Some(_) => page(w, 10),
        });
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(30, 31, &mut acc).await.unwrap();

        assert_eq!(report.failed, vec![QueryWindow::scores(30, 31).in_region(Region::Wa)]);
        assert_eq!(report.queries, 9);
        assert_eq!(acc.len(), 70);
    }

    #[tokio::test]
    async fn empty_result_is_accepted_as_no_data() {
        let source = ScriptedSource::new(|_| FetchOutcome::Empty);
        let mut acc = Vec::new();
        let report = RangeSegmenter::new(&source).segment(70, 71, &mut acc).await.unwrap();
        assert!(acc.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.accepted.len(), 1);
    }

    #[tokio::test]
    async fn rejected_session_aborts_the_cascade() {
        let source = ScriptedSource::new(|_| FetchOutcome::Failed(FetchFailure::Unauthorized(403)));
        let mut acc = Vec::new();
        let err = RangeSegmenter::new(&source).segment(30, 31, &mut acc).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(403)));
    }
}
