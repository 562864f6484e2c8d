//! Session-to-daily aggregation
//!
//! Folds one visitor session's counters into a portfolio's running daily
//! aggregate. Engagement counters always sum. Scroll and project groups follow
//! the configured [`MergePolicy`]: summation by default, or the legacy EMA
//! smoothing kept for call sites that still store smoothed values.

use crate::config::{MergePolicy, MergePolicyConfig, QualityVisitThresholds};
use crate::types::{
    DailyAggregateMetrics, DeviceClass, EngagementTotals, ProjectTotals, ScrollTotals, VisitSession,
};

/// Stateless merger for daily aggregates
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// Merge one session's deltas into `previous`.
    ///
    /// Identity fields (portfolio, date) are kept from `previous`. An absent
    /// scroll or project group on `previous` counts as zero.
    pub fn merge_session(
        previous: &DailyAggregateMetrics,
        engagement: &EngagementTotals,
        scroll: &ScrollTotals,
        project: &ProjectTotals,
        policy: &MergePolicyConfig,
    ) -> DailyAggregateMetrics {
        let prev_scroll = previous.scroll.unwrap_or_default();
        let prev_project = previous.project_aggregate.unwrap_or_default();

        DailyAggregateMetrics {
            portfolio_id: previous.portfolio_id.clone(),
            date: previous.date,
            engagement: merge_engagement(&previous.engagement, engagement),
            scroll: Some(merge_scroll(&prev_scroll, scroll, policy.scroll)),
            project_aggregate: Some(merge_project(&prev_project, project, policy.project)),
        }
    }
}

fn merge_engagement(prev: &EngagementTotals, session: &EngagementTotals) -> EngagementTotals {
    EngagementTotals {
        active_time: prev.active_time.saturating_add(session.active_time),
        views: prev.views.saturating_add(session.views),
        quality_visits: prev.quality_visits.saturating_add(session.quality_visits),
        email_copies: prev.email_copies.saturating_add(session.email_copies),
        social_clicks: prev.social_clicks.saturating_add(session.social_clicks),
        desktop_views: prev.desktop_views.saturating_add(session.desktop_views),
        mobile_tablet_views: prev.mobile_tablet_views.saturating_add(session.mobile_tablet_views),
    }
}

fn merge_scroll(prev: &ScrollTotals, session: &ScrollTotals, policy: MergePolicy) -> ScrollTotals {
    ScrollTotals {
        score_total: apply(policy, prev.score_total, session.score_total),
        scroll_time_total: apply(policy, prev.scroll_time_total, session.scroll_time_total),
        ttfi_sum_ms: apply(policy, prev.ttfi_sum_ms, session.ttfi_sum_ms),
        ttfi_count: apply(policy, prev.ttfi_count, session.ttfi_count),
    }
}

fn merge_project(
    prev: &ProjectTotals,
    session: &ProjectTotals,
    policy: MergePolicy,
) -> ProjectTotals {
    ProjectTotals {
        view_time: apply(policy, prev.view_time, session.view_time),
        exposures: apply(policy, prev.exposures, session.exposures),
        code_views: apply(policy, prev.code_views, session.code_views),
        live_views: apply(policy, prev.live_views, session.live_views),
    }
}

fn apply(policy: MergePolicy, previous: u64, sample: u64) -> u64 {
    match policy {
        MergePolicy::Sum => previous.saturating_add(sample),
        MergePolicy::Ema { alpha } => {
            ema_update(previous as f64, sample as f64, alpha).round() as u64
        }
    }
}

/// Exponential moving average step.
///
/// A previous value below 1 is treated as uninitialised and replaced by the
/// sample; a sample below 1 leaves the previous value unchanged.
pub fn ema_update(previous: f64, sample: f64, alpha: f64) -> f64 {
    if previous < 1.0 {
        sample
    } else if sample < 1.0 {
        previous
    } else {
        previous + alpha * (sample - previous)
    }
}

/// A session is a quality visit if the visitor interacted at all, or scrolled
/// deep enough for long enough.
pub fn is_quality_visit(
    ttfi_ms: Option<u64>,
    scroll_score: u64,
    scroll_time: u64,
    thresholds: &QualityVisitThresholds,
) -> bool {
    let deep_scroll = scroll_score >= thresholds.min_scroll_score
        && scroll_time >= thresholds.min_scroll_time;
    ttfi_ms.is_some_and(|t| t > 0) || deep_scroll
}

/// Split a raw session into the three delta groups merged by
/// [`MetricsAggregator::merge_session`], deciding the quality visit on the way.
pub fn session_deltas(
    session: &VisitSession,
    thresholds: &QualityVisitThresholds,
) -> (EngagementTotals, ScrollTotals, ProjectTotals) {
    let quality = is_quality_visit(
        session.ttfi_ms,
        session.scroll_score,
        session.scroll_time,
        thresholds,
    );

    let (desktop_views, mobile_tablet_views) = match session.device {
        Some(DeviceClass::Desktop) => (session.views, 0),
        Some(DeviceClass::Mobile) | Some(DeviceClass::Tablet) => (0, session.views),
        None => (0, 0),
    };

    let engagement = EngagementTotals {
        active_time: session.active_time,
        views: session.views,
        quality_visits: u64::from(quality),
        email_copies: session.email_copies,
        social_clicks: session.social_clicks,
        desktop_views,
        mobile_tablet_views,
    };

    let ttfi = session.ttfi_ms.filter(|&t| t > 0);
    let scroll = ScrollTotals {
        score_total: session.scroll_score,
        scroll_time_total: session.scroll_time,
        ttfi_sum_ms: ttfi.unwrap_or(0),
        ttfi_count: u64::from(ttfi.is_some()),
    };

    (engagement, scroll, session.projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn zero_day() -> DailyAggregateMetrics {
        DailyAggregateMetrics::empty("p-1", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn views(n: u64) -> EngagementTotals {
        EngagementTotals {
            views: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_views_add_up() {
        let policy = MergePolicyConfig::default();
        let none_scroll = ScrollTotals::default();
        let none_project = ProjectTotals::default();

        let merge = |day: &DailyAggregateMetrics, n: u64| {
            MetricsAggregator::merge_session(day, &views(n), &none_scroll, &none_project, &policy)
        };
        let day = merge(&merge(&zero_day(), 5), 3);
        assert_eq!(day.engagement.views, 8);
    }

    #[test]
    fn test_zero_session_is_identity() {
        let policy = MergePolicyConfig::default();
        let mut day = zero_day();
        day.engagement = EngagementTotals {
            active_time: 100,
            views: 4,
            quality_visits: 2,
            email_copies: 1,
            social_clicks: 3,
            desktop_views: 3,
            mobile_tablet_views: 1,
        };
        day.scroll = Some(ScrollTotals {
            score_total: 120,
            scroll_time_total: 9000,
            ttfi_sum_ms: 800,
            ttfi_count: 2,
        });
        day.project_aggregate = Some(ProjectTotals {
            view_time: 50,
            exposures: 6,
            code_views: 1,
            live_views: 2,
        });

        let merged = MetricsAggregator::merge_session(
            &day,
            &EngagementTotals::default(),
            &ScrollTotals::default(),
            &ProjectTotals::default(),
            &policy,
        );
        assert_eq!(merged, day);
    }

    #[test]
    fn test_every_field_is_summed() {
        let policy = MergePolicyConfig::default();
        let session = VisitSession {
            views: 2,
            active_time: 30,
            device: Some(DeviceClass::Tablet),
            scroll_score: 70,
            scroll_time: 61_000,
            ttfi_ms: Some(450),
            email_copies: 1,
            social_clicks: 2,
            projects: ProjectTotals {
                view_time: 12,
                exposures: 3,
                code_views: 1,
                live_views: 1,
            },
        };
        let thresholds = QualityVisitThresholds::default();
        let (engagement, scroll, project) = session_deltas(&session, &thresholds);

        let merge = |day: &DailyAggregateMetrics| {
            MetricsAggregator::merge_session(day, &engagement, &scroll, &project, &policy)
        };
        let once = merge(&zero_day());
        let twice = merge(&once);

        assert_eq!(
            twice.engagement,
            EngagementTotals {
                active_time: 60,
                views: 4,
                quality_visits: 2,
                email_copies: 2,
                social_clicks: 4,
                desktop_views: 0,
                mobile_tablet_views: 4,
            }
        );
        assert_eq!(
            twice.scroll,
            Some(ScrollTotals {
                score_total: 140,
                scroll_time_total: 122_000,
                ttfi_sum_ms: 900,
                ttfi_count: 2,
            })
        );
        assert_eq!(
            twice.project_aggregate,
            Some(ProjectTotals {
                view_time: 24,
                exposures: 6,
                code_views: 2,
                live_views: 2,
            })
        );
    }

    #[test]
    fn test_legacy_row_without_groups() {
        let mut day = zero_day();
        day.scroll = None;
        day.project_aggregate = None;

        let scroll = ScrollTotals {
            score_total: 10,
            ..Default::default()
        };
        let merged = MetricsAggregator::merge_session(
            &day,
            &views(1),
            &scroll,
            &ProjectTotals::default(),
            &MergePolicyConfig::default(),
        );
        assert_eq!(merged.scroll.unwrap().score_total, 10);
        assert_eq!(merged.project_aggregate, Some(ProjectTotals::default()));
    }

    #[test]
    fn test_quality_visit_rule() {
        let t = QualityVisitThresholds::default();
        assert!(is_quality_visit(Some(1), 0, 0, &t));
        assert!(is_quality_visit(None, 50, 60_000, &t));
        assert!(!is_quality_visit(None, 49, 60_000, &t));
        assert!(!is_quality_visit(None, 50, 59_999, &t));
        assert!(!is_quality_visit(Some(0), 10, 10, &t));
    }

    #[test]
    fn test_ema_update() {
        assert_eq!(ema_update(0.0, 40.0, 0.18), 40.0);
        assert_eq!(ema_update(100.0, 0.5, 0.18), 100.0);
        assert!((ema_update(100.0, 200.0, 0.18) - 118.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_policy_on_project_group() {
        let policy = MergePolicyConfig {
            scroll: MergePolicy::Sum,
            project: MergePolicy::Ema { alpha: 0.18 },
        };
        let mut day = zero_day();
        day.project_aggregate = Some(ProjectTotals {
            view_time: 100,
            ..Default::default()
        });
        let project = ProjectTotals {
            view_time: 200,
            exposures: 5,
            ..Default::default()
        };
        let scroll = ScrollTotals {
            score_total: 7,
            ..Default::default()
        };

        let merged = MetricsAggregator::merge_session(&day, &views(1), &scroll, &project, &policy);
        let totals = merged.project_aggregate.unwrap();
        assert_eq!(totals.view_time, 118);
        // uninitialised previous takes the sample
        assert_eq!(totals.exposures, 5);
        assert_eq!(merged.scroll.unwrap().score_total, 7);
        assert_eq!(merged.engagement.views, 1);
    }

    #[test]
    fn test_session_deltas_without_interaction() {
        let session = VisitSession {
            views: 1,
            device: Some(DeviceClass::Desktop),
            scroll_score: 20,
            scroll_time: 5000,
            ..Default::default()
        };
        let (engagement, scroll, _) = session_deltas(&session, &QualityVisitThresholds::default());
        assert_eq!(engagement.quality_visits, 0);
        assert_eq!(engagement.desktop_views, 1);
        assert_eq!(scroll.ttfi_count, 0);
        assert_eq!(scroll.ttfi_sum_ms, 0);
    }
}
