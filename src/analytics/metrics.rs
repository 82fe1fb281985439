//! Response-time metrics over the stored lead set.
//!
//! Pure read-side computation: the same snapshot always produces the same
//! numbers. Callers pass the live (non-deleted) leads for one user.

use serde::Serialize;

use crate::leads::model::Lead;
use crate::pipeline::scoring::is_business_hours;

/// Aggregate response behavior for one user's leads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseMetrics {
    /// Leads in the snapshot.
    pub total_leads: usize,
    /// Leads with a recorded reply.
    pub responded_leads: usize,
    /// `responded / total`, zero for an empty snapshot.
    pub response_rate: f64,
    /// Mean minutes to reply across all responded leads.
    pub average_minutes: Option<i64>,
    /// `average_minutes` rendered for dashboards ("47m", "2h").
    pub average_formatted: Option<String>,
    /// Responded leads received during business hours (9-17 local).
    pub business_hours: CohortMetrics,
    /// Responded leads received outside business hours.
    pub after_hours: CohortMetrics,
}

/// Response averages for one received-time cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortMetrics {
    pub responded: usize,
    pub average_minutes: Option<i64>,
    pub average_formatted: Option<String>,
}

/// Compute response metrics for a snapshot of leads.
pub fn response_metrics(leads: &[Lead], utc_offset_hours: i32) -> ResponseMetrics {
    let mut all = Vec::new();
    let mut business = Vec::new();
    let mut after = Vec::new();

    for lead in leads {
        if lead.responded_at.is_none() {
            continue;
        }
        let Some(minutes) = lead.response_time_minutes else {
            continue;
        };
        all.push(minutes);
        if is_business_hours(lead.received_at, utc_offset_hours) {
            business.push(minutes);
        } else {
            after.push(minutes);
        }
    }

    let response_rate = if leads.is_empty() {
        0.0
    } else {
        all.len() as f64 / leads.len() as f64
    };

    let average_minutes = average(&all);
    ResponseMetrics {
        total_leads: leads.len(),
        responded_leads: all.len(),
        response_rate,
        average_minutes,
        average_formatted: average_minutes.map(format_duration),
        business_hours: cohort(&business),
        after_hours: cohort(&after),
    }
}

/// Render a minute count the way dashboards show it: under an hour as
/// `"47m"`, otherwise rounded to whole hours as `"2h"`.
pub fn format_duration(minutes: i64) -> String {
    if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h", (minutes + 30) / 60)
    }
}

fn cohort(minutes: &[i64]) -> CohortMetrics {
    let average_minutes = average(minutes);
    CohortMetrics {
        responded: minutes.len(),
        average_minutes,
        average_formatted: average_minutes.map(format_duration),
    }
}

fn average(minutes: &[i64]) -> Option<i64> {
    if minutes.is_empty() {
        return None;
    }
    let sum: i64 = minutes.iter().sum();
    Some((sum as f64 / minutes.len() as f64).round() as i64)
}
