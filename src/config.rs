//! Engine configuration
//!
//! Product-tuned constants (heatmap relevance weights, quality-visit
//! thresholds, baseline window, merge policies) live here so they can be tuned
//! independently of the algorithms that use them.

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Default number of heatmap cells retained per slot
pub const DEFAULT_MAX_CELLS: usize = 500;

/// Default weight of absolute intensity in the composite relevance score
pub const DEFAULT_INTENSITY_WEIGHT: f64 = 0.7;

/// Default weight of intensity-per-visit in the composite relevance score
pub const DEFAULT_RATIO_WEIGHT: f64 = 0.3;

/// Default minimum scroll score for a quality visit
pub const DEFAULT_MIN_SCROLL_SCORE: u64 = 50;

/// Default minimum scroll time for a quality visit, in the session's time unit
pub const DEFAULT_MIN_SCROLL_TIME: u64 = 60_000;

/// Default baseline window in days
pub const DEFAULT_BASELINE_WINDOW_DAYS: usize = 14;

/// Default smoothing factor of the legacy EMA merge policy
pub const DEFAULT_EMA_ALPHA: f64 = 0.18;

/// Heatmap retention settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Maximum cells kept after a merge
    pub max_cells: usize,
    /// Weight of `value / max_value`
    pub intensity_weight: f64,
    /// Weight of `(value / count) / max_ratio`
    pub ratio_weight: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            max_cells: DEFAULT_MAX_CELLS,
            intensity_weight: DEFAULT_INTENSITY_WEIGHT,
            ratio_weight: DEFAULT_RATIO_WEIGHT,
        }
    }
}

/// Quality visit rule: any interaction, or a deep and long enough scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityVisitThresholds {
    pub min_scroll_score: u64,
    pub min_scroll_time: u64,
}

impl Default for QualityVisitThresholds {
    fn default() -> Self {
        Self {
            min_scroll_score: DEFAULT_MIN_SCROLL_SCORE,
            min_scroll_time: DEFAULT_MIN_SCROLL_TIME,
        }
    }
}

/// Baseline comparison settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Prior days compared against
    pub window_days: usize,
    /// Score TTFI on `ln(max(x, 1))` to damp long-tail latency outliers
    pub ttfi_log_transform: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_BASELINE_WINDOW_DAYS,
            ttfi_log_transform: true,
        }
    }
}

/// How a field group folds a session sample into the daily value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MergePolicy {
    /// `updated = previous + sample`
    #[default]
    Sum,
    /// `updated = previous + alpha * (sample - previous)`
    Ema { alpha: f64 },
}

/// Merge policy per aggregate field group. Engagement counters always sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicyConfig {
    pub scroll: MergePolicy,
    pub project: MergePolicy,
}

/// Complete engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub heatmap: HeatmapConfig,
    pub quality: QualityVisitThresholds,
    pub baseline: BaselineConfig,
    pub merge: MergePolicyConfig,
}

impl MetricsConfig {
    /// Check value ranges the algorithms depend on
    pub fn validate(&self) -> Result<(), ComputeError> {
        let weights = [self.heatmap.intensity_weight, self.heatmap.ratio_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ComputeError::InvalidConfig(
                "heatmap weights must be finite and non-negative".to_string(),
            ));
        }
        if self.baseline.window_days < 2 {
            return Err(ComputeError::InvalidConfig(format!(
                "baseline window of {} days cannot produce a baseline",
                self.baseline.window_days
            )));
        }
        for (name, policy) in [("scroll", self.merge.scroll), ("project", self.merge.project)] {
            if let MergePolicy::Ema { alpha } = policy {
                if !(alpha > 0.0 && alpha <= 1.0) {
                    return Err(ComputeError::InvalidConfig(format!(
                        "{} EMA alpha {} must be in (0, 1]",
                        name, alpha
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
