//! Core types for the Folio Metrics engine
//!
//! This module defines the data structures that flow between the persistence
//! layer and the engine: daily aggregates, session deltas, heatmaps and the
//! z-score set rendered in API responses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Engagement counters for one portfolio-day (or one session's contribution)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementTotals {
    /// Active time on page
    pub active_time: u64,
    /// Page views
    pub views: u64,
    /// Sessions that qualified as quality visits
    pub quality_visits: u64,
    /// Contact email copy actions
    pub email_copies: u64,
    /// Clicks on social profile links
    pub social_clicks: u64,
    /// Views from desktop devices
    pub desktop_views: u64,
    /// Views from mobile and tablet devices
    pub mobile_tablet_views: u64,
}

/// Scroll and interaction-latency counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollTotals {
    /// Sum of per-session scroll scores
    pub score_total: u64,
    /// Sum of per-session scroll time
    pub scroll_time_total: u64,
    /// Sum of time-to-first-interaction samples (ms)
    pub ttfi_sum_ms: u64,
    /// Number of time-to-first-interaction samples
    pub ttfi_count: u64,
}

/// Project exposure counters summed over every project in the portfolio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectTotals {
    pub view_time: u64,
    pub exposures: u64,
    pub code_views: u64,
    pub live_views: u64,
}

/// One row per portfolio per day, append-only within the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregateMetrics {
    /// Owning portfolio
    pub portfolio_id: String,
    /// Calendar day this row aggregates
    pub date: NaiveDate,
    /// Engagement counters
    #[serde(default)]
    pub engagement: EngagementTotals,
    /// Scroll counters (absent on rows written before scroll tracking)
    #[serde(default)]
    pub scroll: Option<ScrollTotals>,
    /// Project counters (absent on rows written before project tracking)
    #[serde(default)]
    pub project_aggregate: Option<ProjectTotals>,
}

impl DailyAggregateMetrics {
    /// Zero-initialised aggregate for the first session of a day
    pub fn empty(portfolio_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            date,
            engagement: EngagementTotals::default(),
            scroll: Some(ScrollTotals::default()),
            project_aggregate: Some(ProjectTotals::default()),
        }
    }
}

/// Device class a view was recorded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

/// Raw measurements of one visitor session, as reported by the tracking client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitSession {
    /// Page views in this session
    pub views: u64,
    /// Active time on page
    pub active_time: u64,
    /// Device the session ran on
    pub device: Option<DeviceClass>,
    /// Scroll depth score (0-100)
    pub scroll_score: u64,
    /// Time spent scrolling
    pub scroll_time: u64,
    /// Time to first interaction (ms), absent if the visitor never interacted
    pub ttfi_ms: Option<u64>,
    pub email_copies: u64,
    pub social_clicks: u64,
    /// Project exposure counters for this session
    pub projects: ProjectTotals,
}

/// One sparse cell of an interaction heatmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    /// Row-major grid index
    pub index: u32,
    /// Accumulated intensity
    pub value: u32,
    /// Number of visits that touched this cell
    pub count: u32,
}

/// Sparse, capacity-bounded interaction heatmap for one portfolio-day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioHeatmap {
    /// Layout version of the tracking client that produced the grid
    pub version: String,
    /// Grid width in cells
    pub columns: u32,
    /// Cells, unique by index
    pub cells: Vec<HeatmapCell>,
}

/// A newly observed cell sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCell {
    pub index: u32,
    pub value: u32,
}

/// One visit's heatmap samples
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapUpdate {
    pub version: String,
    pub columns: u32,
    pub cells: Vec<IncomingCell>,
}

/// Clamped z-scores for one portfolio-day against its baseline window.
///
/// `None` means "not enough data", never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZScoreSet {
    pub views: Option<f64>,
    pub engagement_avg: Option<f64>,
    /// Inverted: positive when interaction latency improved
    pub ttfi: Option<f64>,
    pub quality_visit_rate: Option<f64>,
    pub social_ctr: Option<f64>,
}

impl ZScoreSet {
    /// True when no metric could be scored
    pub fn is_empty(&self) -> bool {
        self.views.is_none()
            && self.engagement_avg.is_none()
            && self.ttfi.is_none()
            && self.quality_visit_rate.is_none()
            && self.social_ctr.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_deserializes_legacy_row() {
        let json = r#"{
            "portfolio_id": "p-1",
            "date": "2024-03-02",
            "engagement": { "views": 4 }
        }"#;
        let row: DailyAggregateMetrics = serde_json::from_str(json).unwrap();

        assert_eq!(row.engagement.views, 4);
        assert_eq!(row.engagement.active_time, 0);
        assert!(row.scroll.is_none());
        assert!(row.project_aggregate.is_none());
    }

    #[test]
    fn test_empty_aggregate_is_zeroed() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let row = DailyAggregateMetrics::empty("p-1", date);
        assert_eq!(row.engagement, EngagementTotals::default());
        assert_eq!(row.scroll, Some(ScrollTotals::default()));
        assert_eq!(row.project_aggregate, Some(ProjectTotals::default()));
    }

    #[test]
    fn test_zscore_set_empty() {
        assert!(ZScoreSet::default().is_empty());
        let set = ZScoreSet {
            ttfi: Some(0.5),
            ..Default::default()
        };
        assert!(!set.is_empty());
    }
}
