//! Raw message parsing — body extraction, sender normalization, automated
//! sender detection, and urgency signals.
//!
//! Extraction order for the body: direct payload body, then the first
//! `text/plain` part (recursing into multipart containers), then the
//! provider snippet. Whatever wins gets HTML tags stripped and whitespace
//! collapsed.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MailError;
use crate::mail::types::{MessagePart, RawMessage};

/// Normalized fields the rest of the pipeline works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEmail {
    /// Bare sender address.
    pub sender_email: String,
    /// Subject line, trimmed. Empty when the header is absent.
    pub subject: String,
    /// Plain-text body after tag stripping and whitespace collapse.
    pub body_text: String,
}

/// How urgent a message reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

/// Urgency verdict plus every trigger that fired. The indicator list is
/// deliberately not deduplicated: a phrase appearing twice appends twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyReport {
    pub level: UrgencyLevel,
    pub indicators: Vec<String>,
}

static ANGLE_ADDR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^<>]+)>").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Phrases that force `UrgencyLevel::High` on any hit.
const HIGH_URGENCY_PHRASES: &[&str] = &[
    "urgent",
    "asap",
    "emergency",
    "deadline",
    "immediately",
    "right away",
    "critical",
];

/// Phrases consulted only when nothing high-urgency fired.
const MEDIUM_URGENCY_PHRASES: &[&str] =
    &["this week", "how soon", "when can", "next week", "timeline"];

/// Bulk-relay domains whose mail is machine-generated. The list stays
/// narrow: real correspondents must never be filtered on a hunch.
const AUTOMATED_RELAY_DOMAINS: &[&str] = &[
    "amazonses.com",
    "sendgrid.net",
    "mailgun.org",
    "mandrillapp.com",
    "sparkpostmail.com",
    "bounce.linkedin.com",
];

/// Capitalization ratio above which a subject counts as shouting.
const CAPS_RATIO_THRESHOLD: f32 = 0.30;

/// Parse a raw provider message into normalized fields.
///
/// The only hard failure is a missing or empty `From` header; everything
/// else degrades through the body fallback chain.
pub fn parse(raw: &RawMessage) -> Result<ParsedEmail, MailError> {
    let from = raw
        .header("From")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MailError::MalformedMessage {
            id: raw.id.clone(),
            reason: "missing From header".into(),
        })?;

    Ok(ParsedEmail {
        sender_email: normalize_sender(from),
        subject: raw.header("Subject").unwrap_or_default().trim().to_string(),
        body_text: extract_body(raw),
    })
}

/// `Name <addr>` collapses to `addr`; anything else passes through trimmed.
pub fn normalize_sender(raw: &str) -> String {
    match ANGLE_ADDR.captures(raw) {
        Some(caps) => caps[1].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// True for senders replies cannot reach: no `@` at all, or a known
/// bulk-relay domain.
pub fn is_automated_sender(email: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return true;
    };
    let domain = domain.trim().to_lowercase();
    AUTOMATED_RELAY_DOMAINS
        .iter()
        .any(|relay| domain == *relay || domain.ends_with(&format!(".{relay}")))
}

/// Scan subject + body for urgency signals.
///
/// High: any high-urgency phrase, a subject capitalization ratio above 30%,
/// or two or more exclamation marks. Medium: any medium phrase. Else low.
pub fn detect_urgency(subject: &str, body: &str) -> UrgencyReport {
    let haystack = format!("{} {}", subject, body).to_lowercase();
    let mut indicators = Vec::new();

    for phrase in HIGH_URGENCY_PHRASES {
        for _ in haystack.match_indices(phrase) {
            indicators.push((*phrase).to_string());
        }
    }
    if capitalization_ratio(subject) > CAPS_RATIO_THRESHOLD {
        indicators.push("excessive capitalization".into());
    }
    if haystack.matches('!').count() >= 2 {
        indicators.push("multiple exclamation marks".into());
    }
    if !indicators.is_empty() {
        return UrgencyReport {
            level: UrgencyLevel::High,
            indicators,
        };
    }

    for phrase in MEDIUM_URGENCY_PHRASES {
        for _ in haystack.match_indices(phrase) {
            indicators.push((*phrase).to_string());
        }
    }
    let level = if indicators.is_empty() {
        UrgencyLevel::Low
    } else {
        UrgencyLevel::Medium
    };
    UrgencyReport { level, indicators }
}

/// Share of alphabetic characters that are uppercase. Zero for no letters.
fn capitalization_ratio(text: &str) -> f32 {
    let mut letters = 0u32;
    let mut upper = 0u32;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if c.is_uppercase() {
            upper += 1;
        }
    }
    if letters == 0 {
        return 0.0;
    }
    upper as f32 / letters as f32
}

fn extract_body(raw: &RawMessage) -> String {
    let direct = raw
        .payload
        .as_ref()
        .and_then(|p| p.body.as_ref())
        .and_then(|b| b.data.as_deref())
        .and_then(decode_part_data);

    let text = direct.or_else(|| {
        raw.payload
            .as_ref()
            .and_then(|p| find_text_plain(&p.parts))
            .and_then(decode_part_data)
    });

    match text {
        Some(body) => normalize_body(&body),
        None => normalize_body(&raw.snippet),
    }
}

/// Depth-first search for the first `text/plain` part with body data.
fn find_text_plain(parts: &[MessagePart]) -> Option<&str> {
    for part in parts {
        if part.mime_type.as_deref().unwrap_or("").starts_with("text/plain")
            && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
        {
            return Some(data);
        }
    }
    parts.iter().find_map(|part| find_text_plain(&part.parts))
}

/// Decode base64url part data. Providers disagree on padding, so trailing
/// `=` is tolerated.
fn decode_part_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

/// Strip HTML tags, decode common entities, and collapse whitespace runs
/// to single spaces.
fn normalize_body(text: &str) -> String {
    let stripped = HTML_TAG.replace_all(text, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}
