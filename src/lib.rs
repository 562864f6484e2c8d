//! Folio Metrics - compact storage and anomaly scoring for portfolio engagement
//!
//! The engine sits between a portfolio site's tracking endpoint and its
//! persistence layer. It is pure and synchronous: callers fetch stored state,
//! call into the engine, and persist what it returns.
//!
//! ## Modules
//!
//! - **Codec**: fixed-width bit packing and the sectioned `HMB1` blob format
//! - **Heatmap**: merge visit samples into a capacity-bounded hottest-cell set
//! - **Baseline**: rolling baselines and clamped (optionally inverted) z-scores
//! - **Aggregator**: fold a visitor session into the portfolio's daily aggregate
//! - **Slot**: heatmap and counter-map layout on top of the blob codec

pub mod aggregator;
pub mod baseline;
pub mod codec;
pub mod config;
pub mod error;
pub mod heatmap;
pub mod pipeline;
pub mod slot;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::MetricsAggregator;
pub use baseline::{build_baseline, compute_zscores, inverted_zscore, zscore, BaselineSeries};
pub use codec::{SectionSpec, SectionedBlob};
pub use config::MetricsConfig;
pub use error::{CodecError, ComputeError};
pub use heatmap::HeatmapMerger;
pub use pipeline::{merge_heatmap_json, merge_session_json, zscores_json, EngagementProcessor};
pub use types::{DailyAggregateMetrics, HeatmapCell, PortfolioHeatmap, ZScoreSet};

/// Library version, reported by the CLI and FFI
pub const FOLIO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in CLI reports
pub const PRODUCER_NAME: &str = "folio-metrics";
