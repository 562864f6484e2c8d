//! Pipeline orchestration
//!
//! This module provides the public API the persistence layer calls around
//! every read and write of a portfolio-day:
//! session → aggregate merge, visit → heatmap merge, and aggregate + history →
//! z-scores. JSON entry points mirror each operation for non-Rust callers.

use chrono::NaiveDate;

use crate::aggregator::{session_deltas, MetricsAggregator};
use crate::baseline::compute_zscores;
use crate::config::MetricsConfig;
use crate::error::ComputeError;
use crate::heatmap::HeatmapMerger;
use crate::types::{DailyAggregateMetrics, HeatmapUpdate, PortfolioHeatmap, VisitSession, ZScoreSet};

/// Merge one session into a day's aggregate using the default configuration.
///
/// # Arguments
/// * `previous_json` - Current aggregate JSON, or `null` for the day's first session
/// * `session_json` - Raw [`VisitSession`] JSON
/// * `portfolio_id` - Portfolio the session belongs to
/// * `date` - Day (YYYY-MM-DD) the session is attributed to
///
/// # Returns
/// The updated aggregate as JSON
pub fn merge_session_json(
    previous_json: &str,
    session_json: &str,
    portfolio_id: &str,
    date: &str,
) -> Result<String, ComputeError> {
    EngagementProcessor::default().merge_session_json(
        previous_json,
        session_json,
        portfolio_id,
        date,
    )
}

/// Merge one visit's heatmap samples using the default configuration.
///
/// `existing_json` may be `null` when the day has no heatmap yet.
pub fn merge_heatmap_json(existing_json: &str, update_json: &str) -> Result<String, ComputeError> {
    EngagementProcessor::default().merge_heatmap_json(existing_json, update_json)
}

/// Score the current aggregate against a JSON array of prior aggregates
/// using the default configuration.
pub fn zscores_json(current_json: &str, history_json: &str) -> Result<String, ComputeError> {
    EngagementProcessor::default().zscores_json(current_json, history_json)
}

/// Configured entry point for all core operations.
///
/// Holds no per-portfolio state; one processor can serve any number of
/// portfolios and threads.
#[derive(Debug, Clone, Default)]
pub struct EngagementProcessor {
    config: MetricsConfig,
}

impl EngagementProcessor {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a processor with a validated configuration
    pub fn with_config(config: MetricsConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load configuration from JSON
    pub fn from_config_json(json: &str) -> Result<Self, ComputeError> {
        Ok(Self {
            config: MetricsConfig::from_json(json)?,
        })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Fold a raw session into the day's aggregate, creating it on the first
    /// session of the day.
    pub fn record_visit(
        &self,
        previous: Option<&DailyAggregateMetrics>,
        portfolio_id: &str,
        date: NaiveDate,
        session: &VisitSession,
    ) -> Result<DailyAggregateMetrics, ComputeError> {
        let start;
        let previous = match previous {
            Some(prev) => {
                if prev.portfolio_id != portfolio_id || prev.date != date {
                    return Err(ComputeError::InvalidInput(format!(
                        "session for {} on {} cannot merge into {} on {}",
                        portfolio_id, date, prev.portfolio_id, prev.date
                    )));
                }
                prev
            }
            None => {
                start = DailyAggregateMetrics::empty(portfolio_id, date);
                &start
            }
        };

        let (engagement, scroll, project) = session_deltas(session, &self.config.quality);
        log::debug!(
            "portfolio {} on {}: merging session ({} views, quality={})",
            portfolio_id,
            date,
            engagement.views,
            engagement.quality_visits
        );

        Ok(MetricsAggregator::merge_session(
            previous,
            &engagement,
            &scroll,
            &project,
            &self.config.merge,
        ))
    }

    /// Fold a visit's heatmap samples into the day's heatmap
    pub fn merge_heatmap(
        &self,
        existing: Option<&PortfolioHeatmap>,
        update: &HeatmapUpdate,
    ) -> PortfolioHeatmap {
        let empty = PortfolioHeatmap::default();
        let merger = HeatmapMerger::from_config(&self.config.heatmap);
        merger.merge(existing.unwrap_or(&empty), update, self.config.heatmap.max_cells)
    }

    /// Score the current aggregate against prior days
    pub fn zscores(
        &self,
        current: &DailyAggregateMetrics,
        history: &[DailyAggregateMetrics],
    ) -> ZScoreSet {
        compute_zscores(current, history, &self.config.baseline)
    }

    /// JSON form of [`EngagementProcessor::record_visit`]
    pub fn merge_session_json(
        &self,
        previous_json: &str,
        session_json: &str,
        portfolio_id: &str,
        date: &str,
    ) -> Result<String, ComputeError> {
        let date = parse_date(date)?;
        let previous: Option<DailyAggregateMetrics> = serde_json::from_str(previous_json)?;
        let session: VisitSession = serde_json::from_str(session_json)?;

        let merged = self.record_visit(previous.as_ref(), portfolio_id, date, &session)?;
        Ok(serde_json::to_string(&merged)?)
    }

    /// JSON form of [`EngagementProcessor::merge_heatmap`]
    pub fn merge_heatmap_json(
        &self,
        existing_json: &str,
        update_json: &str,
    ) -> Result<String, ComputeError> {
        let existing: Option<PortfolioHeatmap> = serde_json::from_str(existing_json)?;
        let update: HeatmapUpdate = serde_json::from_str(update_json)?;

        let merged = self.merge_heatmap(existing.as_ref(), &update);
        Ok(serde_json::to_string(&merged)?)
    }

    /// JSON form of [`EngagementProcessor::zscores`]
    pub fn zscores_json(
        &self,
        current_json: &str,
        history_json: &str,
    ) -> Result<String, ComputeError> {
        let current: DailyAggregateMetrics = serde_json::from_str(current_json)?;
        let history: Vec<DailyAggregateMetrics> = serde_json::from_str(history_json)?;

        let set = self.zscores(&current, &history);
        Ok(serde_json::to_string(&set)?)
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, ComputeError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        ComputeError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", date))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceClass, IncomingCell};

    fn sample_session_json() -> &'static str {
        r#"{
            "views": 1,
            "active_time": 42000,
            "device": "mobile",
            "scroll_score": 65,
            "scroll_time": 70000,
            "ttfi_ms": 850,
            "email_copies": 1,
            "social_clicks": 0,
            "projects": { "view_time": 9000, "exposures": 4, "code_views": 1, "live_views": 0 }
        }"#
    }

    fn sample_update() -> HeatmapUpdate {
        HeatmapUpdate {
            version: "v3".to_string(),
            columns: 24,
            cells: vec![IncomingCell { index: 5, value: 3 }, IncomingCell { index: 9, value: 8 }],
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn test_first_session_creates_aggregate() {
        let processor = EngagementProcessor::new();
        let session = VisitSession {
            views: 2,
            device: Some(DeviceClass::Desktop),
            ttfi_ms: Some(300),
            ..Default::default()
        };

        let aggregate = processor.record_visit(None, "p-9", day(3), &session).unwrap();
        assert_eq!(aggregate.portfolio_id, "p-9");
        assert_eq!(aggregate.date, day(3));
        assert_eq!(aggregate.engagement.views, 2);
        assert_eq!(aggregate.engagement.desktop_views, 2);
        assert_eq!(aggregate.engagement.quality_visits, 1);
        assert_eq!(aggregate.scroll.unwrap().ttfi_count, 1);
    }

    #[test]
    fn test_record_visit_rejects_other_day() {
        let processor = EngagementProcessor::new();
        let existing = DailyAggregateMetrics::empty("p-9", day(3));
        let session = VisitSession::default();
        let result = processor.record_visit(Some(&existing), "p-9", day(4), &session);
        assert!(matches!(result, Err(ComputeError::InvalidInput(_))));
    }

    #[test]
    fn test_merge_session_json() {
        let first = merge_session_json("null", sample_session_json(), "p-1", "2024-07-03").unwrap();
        let second =
            merge_session_json(&first, sample_session_json(), "p-1", "2024-07-03").unwrap();

        let value: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(value["date"], "2024-07-03");
        assert_eq!(value["engagement"]["views"], 2);
        assert_eq!(value["engagement"]["quality_visits"], 2);
        assert_eq!(value["engagement"]["mobile_tablet_views"], 2);
        assert_eq!(value["scroll"]["ttfi_sum_ms"], 1700);
        assert_eq!(value["project_aggregate"]["exposures"], 8);
    }

    #[test]
    fn test_merge_session_json_bad_date() {
        let result = merge_session_json("null", sample_session_json(), "p-1", "07/03/2024");
        assert!(matches!(result, Err(ComputeError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(merge_session_json("not json", "{}", "p", "2024-01-01").is_err());
        assert!(merge_heatmap_json("null", "nope").is_err());
        assert!(zscores_json("{}", "[]").is_err());
    }

    #[test]
    fn test_merge_heatmap_without_existing() {
        let processor = EngagementProcessor::new();
        let merged = processor.merge_heatmap(None, &sample_update());
        assert_eq!(merged.version, "v3");
        assert_eq!(merged.cells.len(), 2);
        assert!(merged.cells.iter().all(|c| c.count == 1));
    }

    #[test]
    fn test_merge_heatmap_respects_configured_capacity() {
        let mut config = MetricsConfig::default();
        config.heatmap.max_cells = 1;
        let processor = EngagementProcessor::with_config(config).unwrap();

        let merged = processor.merge_heatmap(None, &sample_update());
        assert_eq!(merged.cells.len(), 1);
        assert_eq!(merged.cells[0].index, 9);
    }

    #[test]
    fn test_merge_heatmap_json() {
        let update = serde_json::to_string(&sample_update()).unwrap();
        let once = merge_heatmap_json("null", &update).unwrap();
        let twice = merge_heatmap_json(&once, &update).unwrap();

        let heatmap: PortfolioHeatmap = serde_json::from_str(&twice).unwrap();
        assert_eq!(heatmap.cells.len(), 2);
        assert_eq!(heatmap.cells[1].value, 16);
        assert_eq!(heatmap.cells[1].count, 2);
    }

    #[test]
    fn test_zscores_json() {
        let processor = EngagementProcessor::new();
        let history: Vec<DailyAggregateMetrics> = (1..=5)
            .map(|d| {
                let session = VisitSession {
                    views: 10 + d as u64,
                    ..Default::default()
                };
                processor.record_visit(None, "p-1", day(d), &session).unwrap()
            })
            .collect();
        let current = processor
            .record_visit(None, "p-1", day(6), &VisitSession { views: 13, ..Default::default() })
            .unwrap();

        let json = zscores_json(
            &serde_json::to_string(&current).unwrap(),
            &serde_json::to_string(&history).unwrap(),
        )
        .unwrap();
        let set: ZScoreSet = serde_json::from_str(&json).unwrap();

        assert_eq!(set.views, Some(0.0));
        // no TTFI samples anywhere
        assert_eq!(set.ttfi, None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let invalid = r#"{ "baseline": { "window_days": 0 } }"#;
        assert!(EngagementProcessor::from_config_json(invalid).is_err());
        let processor = EngagementProcessor::from_config_json("{}").unwrap();
        assert_eq!(processor.config(), &MetricsConfig::default());
    }
}
