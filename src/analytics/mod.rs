//! Read-side analytics over the stored lead set.

pub mod insights;
pub mod metrics;

pub use insights::{Insight, InsightImpact, InsightKind, generate_insights};
pub use metrics::{ResponseMetrics, format_duration, response_metrics};
