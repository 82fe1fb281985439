//! Heuristic lead scoring.
//!
//! Pure functions over an immutable snapshot of a user's leads; no I/O and
//! no external services. Scores are recomputed on demand rather than
//! cached, so they always reflect the current snapshot.

use chrono::{DateTime, Timelike, Utc};

use crate::config::PipelineConfig;
use crate::leads::model::{Lead, LeadScore, LeadStatus, ScoreFactors};

/// Points per distinct urgency keyword in the subject or snippet.
const URGENCY_KEYWORD_POINTS: u32 = 20;
/// Points per distinct business keyword in the subject or snippet.
const CONTENT_KEYWORD_POINTS: u32 = 15;
/// Timing points inside and outside business hours.
const BUSINESS_HOURS_POINTS: u8 = 20;
const OFF_HOURS_POINTS: u8 = 10;
/// Reputation used when no prior same-domain leads exist.
const NEUTRAL_REPUTATION: u8 = 50;
/// Local business-hours window, inclusive on both ends.
const BUSINESS_HOURS_START: u32 = 9;
const BUSINESS_HOURS_END: u32 = 17;

/// Compute the heuristic score for one lead against the user's lead history.
pub fn score(lead: &Lead, all_leads: &[Lead], config: &PipelineConfig) -> LeadScore {
    let factors = ScoreFactors {
        urgency: keyword_points(lead, &config.urgency_keywords, URGENCY_KEYWORD_POINTS),
        sender_reputation: sender_reputation(lead, all_leads),
        content_relevance: keyword_points(lead, &config.business_keywords, CONTENT_KEYWORD_POINTS),
        timing: timing_score(lead.received_at, config.utc_offset_hours),
    };

    let sum = factors.urgency as u32
        + factors.sender_reputation as u32
        + factors.content_relevance as u32
        + factors.timing as u32;
    let total = sum.min(100) as u8;

    LeadScore {
        lead_id: lead.id,
        total,
        factors,
        recommendation: recommendation(total).to_string(),
    }
}

/// Score a snapshot of leads, highest priority first.
///
/// Order among equal totals is unspecified.
pub fn score_all(leads: &[Lead], config: &PipelineConfig) -> Vec<LeadScore> {
    let mut scores: Vec<LeadScore> = leads.iter().map(|lead| score(lead, leads, config)).collect();
    scores.sort_by(|a, b| b.total.cmp(&a.total));
    scores
}

/// Whether a timestamp falls inside the local business-hours window.
pub fn is_business_hours(at: DateTime<Utc>, utc_offset_hours: i32) -> bool {
    let local_hour = (at.hour() as i32 + utc_offset_hours).rem_euclid(24) as u32;
    (BUSINESS_HOURS_START..=BUSINESS_HOURS_END).contains(&local_hour)
}

/// Points per distinct keyword present in the subject or snippet.
fn keyword_points(lead: &Lead, keywords: &[String], points_each: u32) -> u8 {
    let haystack = format!("{} {}", lead.subject, lead.snippet).to_lowercase();
    let distinct = keywords
        .iter()
        .filter(|keyword| haystack.contains(&keyword.to_lowercase()))
        .count() as u32;
    // Keyword lists are configurable, so cap at the field's range.
    (distinct * points_each).min(u8::MAX as u32) as u8
}

/// Share of the sender's domain history already classified hot, scaled to
/// 0-100. The lead being scored does not count toward its own reputation.
fn sender_reputation(lead: &Lead, all_leads: &[Lead]) -> u8 {
    let Some(domain) = lead.sender_domain() else {
        return NEUTRAL_REPUTATION;
    };

    let mut seen = 0u32;
    let mut hot = 0u32;
    for other in all_leads {
        if other.id == lead.id {
            continue;
        }
        if other.sender_domain() == Some(domain) {
            seen += 1;
            if other.status == LeadStatus::Hot {
                hot += 1;
            }
        }
    }

    if seen == 0 {
        NEUTRAL_REPUTATION
    } else {
        ((hot * 100) / seen) as u8
    }
}

fn timing_score(received_at: DateTime<Utc>, utc_offset_hours: i32) -> u8 {
    if is_business_hours(received_at, utc_offset_hours) {
        BUSINESS_HOURS_POINTS
    } else {
        OFF_HOURS_POINTS
    }
}

/// Fixed threshold ladder; boundary values take the higher band.
fn recommendation(total: u8) -> &'static str {
    match total {
        80..=u8::MAX => "respond immediately",
        60..=79 => "respond within 2 hours",
        40..=59 => "respond within 24 hours",
        _ => "consider automated response",
    }
}
