//! Baseline statistics
//!
//! This module builds rolling per-metric baselines from prior days' aggregates
//! and scores the current day against them. Scores are clamped z-scores; a
//! missing input or a too-short baseline yields `None` rather than an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::BaselineConfig;
use crate::types::{DailyAggregateMetrics, ZScoreSet};

/// Z-scores are clamped to `[-Z_SCORE_LIMIT, Z_SCORE_LIMIT]`
pub const Z_SCORE_LIMIT: f64 = 3.0;

/// Fewest points a baseline needs before it can be scored against
pub const MIN_BASELINE_POINTS: usize = 2;

/// Ratio metrics derived from one day's counters.
///
/// Each ratio is absent when its denominator is zero or an operand is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedRatios {
    pub views: Option<f64>,
    /// Scroll score per view
    pub engagement_avg: Option<f64>,
    /// Mean time to first interaction (ms)
    pub ttfi_mean: Option<f64>,
    pub quality_visit_rate: Option<f64>,
    pub social_ctr: Option<f64>,
}

impl DerivedRatios {
    pub fn from_aggregate(day: &DailyAggregateMetrics) -> Self {
        let engagement = &day.engagement;
        let views = engagement.views;

        Self {
            views: Some(views as f64),
            engagement_avg: day.scroll.and_then(|s| ratio(s.score_total, views)),
            ttfi_mean: day.scroll.and_then(|s| ratio(s.ttfi_sum_ms, s.ttfi_count)),
            quality_visit_rate: ratio(engagement.quality_visits, views),
            social_ctr: ratio(engagement.social_clicks, views),
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

/// Per-metric baseline arrays, in history order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineSeries {
    pub views: Vec<f64>,
    pub engagement_avg: Vec<f64>,
    pub ttfi_mean: Vec<f64>,
    pub quality_visit_rate: Vec<f64>,
    pub social_ctr: Vec<f64>,
    /// Days that survived filtering
    pub days: usize,
}

impl BaselineSeries {
    fn push(&mut self, ratios: DerivedRatios) {
        let DerivedRatios {
            views,
            engagement_avg,
            ttfi_mean,
            quality_visit_rate,
            social_ctr,
        } = ratios;
        self.views.extend(views);
        self.engagement_avg.extend(engagement_avg);
        self.ttfi_mean.extend(ttfi_mean);
        self.quality_visit_rate.extend(quality_visit_rate);
        self.social_ctr.extend(social_ctr);
        self.days += 1;
    }
}

/// Build baseline arrays from `history`.
///
/// History is expected in the caller's preferred order (most recent first);
/// rows dated `exclude_date` are skipped and at most `window_days` rows are
/// used. Returns `None` when fewer than two rows remain.
pub fn build_baseline(
    history: &[DailyAggregateMetrics],
    exclude_date: NaiveDate,
    window_days: usize,
) -> Option<BaselineSeries> {
    let mut series = BaselineSeries::default();

    for day in history
        .iter()
        .filter(|day| day.date != exclude_date)
        .take(window_days)
    {
        series.push(DerivedRatios::from_aggregate(day));
    }

    if series.days < MIN_BASELINE_POINTS {
        None
    } else {
        Some(series)
    }
}

/// Welford running mean and variance
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (`M2 / (n - 1)`), `None` below two samples
    pub fn sample_variance(&self) -> Option<f64> {
        if self.count < 2 {
            None
        } else {
            Some(self.m2 / (self.count - 1) as f64)
        }
    }

    pub fn sample_std(&self) -> Option<f64> {
        self.sample_variance().map(|v| v.max(0.0).sqrt())
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = RunningStats::new();
        for x in iter {
            stats.update(x);
        }
        stats
    }
}

/// Clamped z-score of `current` against `baseline`.
///
/// A flat baseline carries no signal and scores exactly `0.0`.
pub fn zscore(current: Option<f64>, baseline: &[f64]) -> Option<f64> {
    let current = current?;
    if baseline.len() < MIN_BASELINE_POINTS {
        return None;
    }

    let stats: RunningStats = baseline.iter().copied().collect();
    let std = stats.sample_std()?;
    if std == 0.0 {
        return Some(0.0);
    }

    Some(((current - stats.mean()) / std).clamp(-Z_SCORE_LIMIT, Z_SCORE_LIMIT))
}

/// Z-score for "lower is better" metrics such as interaction latency.
///
/// With `use_log_transform` every value is replaced by `ln(max(x, 1))` first.
/// The result is negated so an improvement scores positive.
pub fn inverted_zscore(
    current: Option<f64>,
    baseline: &[f64],
    use_log_transform: bool,
) -> Option<f64> {
    let score = if use_log_transform {
        let transformed: Vec<f64> = baseline.iter().map(|&x| log_damp(x)).collect();
        zscore(current.map(log_damp), &transformed)
    } else {
        zscore(current, baseline)
    }?;

    // Avoid handing out -0.0 for a flat baseline.
    Some(if score == 0.0 { 0.0 } else { -score })
}

fn log_damp(x: f64) -> f64 {
    x.max(1.0).ln()
}

/// Score the current day against its baseline window
pub fn compute_zscores(
    current: &DailyAggregateMetrics,
    history: &[DailyAggregateMetrics],
    config: &BaselineConfig,
) -> ZScoreSet {
    let Some(baseline) = build_baseline(history, current.date, config.window_days) else {
        log::debug!(
            "portfolio {} on {}: not enough history for a baseline",
            current.portfolio_id,
            current.date
        );
        return ZScoreSet::default();
    };

    let today = DerivedRatios::from_aggregate(current);

    ZScoreSet {
        views: zscore(today.views, &baseline.views),
        engagement_avg: zscore(today.engagement_avg, &baseline.engagement_avg),
        ttfi: inverted_zscore(today.ttfi_mean, &baseline.ttfi_mean, config.ttfi_log_transform),
        quality_visit_rate: zscore(today.quality_visit_rate, &baseline.quality_visit_rate),
        social_ctr: zscore(today.social_ctr, &baseline.social_ctr),
    }
}
