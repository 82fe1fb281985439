//! Predictive insights — independent rule checks over the lead snapshot.
//!
//! Every rule fires on its own trigger with a fixed confidence and impact;
//! one pass evaluates all of them and the qualifying ones come back ordered
//! by `impact weight x confidence`. Rules read the snapshot only, so two
//! passes over the same leads produce the same list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::metrics::format_duration;
use crate::leads::model::{Lead, LeadStatus};
use crate::pipeline::scoring::is_business_hours;

/// Week-over-week lead delta that counts as a surge.
const VOLUME_SURGE_DELTA: i64 = 5;
/// Unclassified share above which classification needs attention.
const UNCLASSIFIED_RATIO_TRIGGER: f64 = 0.4;
/// Average reply time, in minutes, above which replies count as slow.
const SLOW_RESPONSE_MINUTES: i64 = 24 * 60;
/// Hot share and minimum sample for the lead-quality trend.
const HOT_RATIO_TRIGGER: f64 = 0.3;
const HOT_RATIO_MIN_LEADS: usize = 5;
/// After-hours share above which an acknowledgment autoresponder helps.
const AFTER_HOURS_RATIO_TRIGGER: f64 = 0.5;

/// What kind of signal an insight carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Opportunity,
    Risk,
    Trend,
    Recommendation,
}

/// How much acting on the insight matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightImpact {
    Low,
    Medium,
    High,
}

impl InsightImpact {
    /// Ordering weight. Combined with confidence to rank insights.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

/// One fired rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub detail: String,
    /// Fixed per rule, 0-100.
    pub confidence: u8,
    pub impact: InsightImpact,
}

impl Insight {
    fn rank(&self) -> u32 {
        self.impact.weight() * self.confidence as u32
    }
}

/// Evaluate every insight rule against a snapshot of leads.
///
/// `now` anchors the time windows so schedulers and tests agree on what
/// "this week" means.
pub fn generate_insights(
    leads: &[Lead],
    now: DateTime<Utc>,
    utc_offset_hours: i32,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(insight) = volume_surge(leads, now) {
        insights.push(insight);
    }
    if let Some(insight) = unclassified_volume(leads) {
        insights.push(insight);
    }
    if let Some(insight) = slow_responses(leads) {
        insights.push(insight);
    }
    if let Some(insight) = lead_quality_trend(leads, now) {
        insights.push(insight);
    }
    if let Some(insight) = after_hours_pattern(leads, utc_offset_hours) {
        insights.push(insight);
    }

    insights.sort_by(|a, b| b.rank().cmp(&a.rank()));
    insights
}

/// More than `VOLUME_SURGE_DELTA` extra leads this week versus the week
/// before.
fn volume_surge(leads: &[Lead], now: DateTime<Utc>) -> Option<Insight> {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);

    let this_week = leads.iter().filter(|l| l.received_at >= week_ago).count() as i64;
    let last_week = leads
        .iter()
        .filter(|l| l.received_at >= two_weeks_ago && l.received_at < week_ago)
        .count() as i64;

    if this_week - last_week > VOLUME_SURGE_DELTA {
        Some(Insight {
            kind: InsightKind::Opportunity,
            title: "Lead Volume Surge".to_string(),
            detail: format!(
                "{this_week} leads came in this week, up from {last_week} the week before. \
                 Consider blocking time for follow-ups."
            ),
            confidence: 85,
            impact: InsightImpact::Medium,
        })
    } else {
        None
    }
}

/// More than 40% of the snapshot still has no usable classification.
fn unclassified_volume(leads: &[Lead]) -> Option<Insight> {
    if leads.is_empty() {
        return None;
    }
    let unclassified = leads
        .iter()
        .filter(|l| l.status == LeadStatus::Unclassified)
        .count();
    let ratio = unclassified as f64 / leads.len() as f64;

    if ratio > UNCLASSIFIED_RATIO_TRIGGER {
        Some(Insight {
            kind: InsightKind::Risk,
            title: "High Unclassified Lead Volume".to_string(),
            detail: format!(
                "{unclassified} of {} leads have no classification. \
                 Review them manually or check the classifier configuration.",
                leads.len()
            ),
            confidence: 95,
            impact: InsightImpact::High,
        })
    } else {
        None
    }
}

/// Average reply time beyond a day.
fn slow_responses(leads: &[Lead]) -> Option<Insight> {
    let minutes: Vec<i64> = leads
        .iter()
        .filter(|l| l.responded_at.is_some())
        .filter_map(|l| l.response_time_minutes)
        .collect();
    if minutes.is_empty() {
        return None;
    }
    let average = minutes.iter().sum::<i64>() / minutes.len() as i64;

    if average > SLOW_RESPONSE_MINUTES {
        Some(Insight {
            kind: InsightKind::Recommendation,
            title: "Slow Response Times".to_string(),
            detail: format!(
                "Replies take {} on average. Faster first responses convert \
                 markedly better.",
                format_duration(average)
            ),
            confidence: 75,
            impact: InsightImpact::Medium,
        })
    } else {
        None
    }
}

/// Hot share over the last two weeks, with enough leads to mean something.
fn lead_quality_trend(leads: &[Lead], now: DateTime<Utc>) -> Option<Insight> {
    let window_start = now - Duration::days(14);
    let recent: Vec<&Lead> = leads
        .iter()
        .filter(|l| l.received_at >= window_start)
        .collect();
    if recent.len() < HOT_RATIO_MIN_LEADS {
        return None;
    }
    let hot = recent
        .iter()
        .filter(|l| l.status == LeadStatus::Hot)
        .count();
    let ratio = hot as f64 / recent.len() as f64;

    if ratio > HOT_RATIO_TRIGGER {
        Some(Insight {
            kind: InsightKind::Trend,
            title: "Rising Lead Quality".to_string(),
            detail: format!(
                "{hot} of the last {} leads classified hot. Recent outreach \
                 is attracting serious buyers.",
                recent.len()
            ),
            confidence: 70,
            impact: InsightImpact::Medium,
        })
    } else {
        None
    }
}

/// Majority of inquiries arriving outside business hours.
fn after_hours_pattern(leads: &[Lead], utc_offset_hours: i32) -> Option<Insight> {
    if leads.is_empty() {
        return None;
    }
    let after = leads
        .iter()
        .filter(|l| !is_business_hours(l.received_at, utc_offset_hours))
        .count();
    let ratio = after as f64 / leads.len() as f64;

    if ratio > AFTER_HOURS_RATIO_TRIGGER {
        Some(Insight {
            kind: InsightKind::Recommendation,
            title: "After-Hours Inquiry Pattern".to_string(),
            detail: format!(
                "{after} of {} leads arrived outside business hours. An \
                 acknowledgment autoresponder would cover the gap.",
                leads.len()
            ),
            confidence: 65,
            impact: InsightImpact::Low,
        })
    } else {
        None
    }
}
