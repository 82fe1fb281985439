//! Lead data model — lead records, classification results, scores, and
//! reply-drafting inputs shared across the pipeline, store, and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a lead. Set once by classification at ingest time;
/// changes only through an explicit manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// No usable judgment yet (new, or classification degraded).
    Unclassified,
    /// Strong buying signal — act on it now.
    Hot,
    /// Real interest, not time-critical.
    Warm,
    /// Weak or speculative interest.
    Cold,
    /// Judged not to be a sales lead at all.
    NotALead,
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::Unclassified
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unclassified => write!(f, "unclassified"),
            Self::Hot => write!(f, "hot"),
            Self::Warm => write!(f, "warm"),
            Self::Cold => write!(f, "cold"),
            Self::NotALead => write!(f, "not_a_lead"),
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unclassified" => Ok(Self::Unclassified),
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            "not_a_lead" => Ok(Self::NotALead),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

/// A single ingested lead. One row per `(user_id, provider_message_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique lead ID.
    pub id: Uuid,
    /// Owner of the mailbox this lead came from.
    pub user_id: String,
    /// Provider-side message ID — dedup key together with `user_id`.
    pub provider_message_id: String,
    /// Normalized sender address (bare `addr@domain`).
    pub sender_email: String,
    /// Subject line as received.
    pub subject: String,
    /// Short provider-supplied preview of the body.
    pub snippet: String,
    /// Full plain-text body, when the detail fetch produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Current classification status.
    pub status: LeadStatus,
    /// When the user's reply went out. Set at most once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    /// Minutes between receipt and reply. Derived when `responded_at` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_minutes: Option<i64>,
    /// Free-form user notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Soft-delete marker. Deleted leads drop out of listings and analytics.
    #[serde(default)]
    pub deleted: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new unclassified lead.
    pub fn new(
        user_id: impl Into<String>,
        provider_message_id: impl Into<String>,
        sender_email: impl Into<String>,
        subject: impl Into<String>,
        snippet: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            provider_message_id: provider_message_id.into(),
            sender_email: sender_email.into(),
            subject: subject.into(),
            snippet: snippet.into(),
            full_content: None,
            received_at,
            status: LeadStatus::default(),
            responded_at: None,
            response_time_minutes: None,
            notes: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the full body text.
    pub fn with_full_content(mut self, content: impl Into<String>) -> Self {
        self.full_content = Some(content.into());
        self
    }

    /// Set the classification status.
    pub fn with_status(mut self, status: LeadStatus) -> Self {
        self.status = status;
        self
    }

    /// Domain part of the sender address, if it has one.
    pub fn sender_domain(&self) -> Option<&str> {
        self.sender_email.rsplit_once('@').map(|(_, domain)| domain)
    }

    /// Best available body text: full content when fetched, snippet otherwise.
    pub fn body_text(&self) -> &str {
        self.full_content.as_deref().unwrap_or(&self.snippet)
    }
}

/// Outcome of one AI classification call. Transient — the pipeline folds
/// `classification` into the stored lead status and drops the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Whether the message is a sales lead.
    pub is_lead: bool,
    /// Status bucket the classifier assigned.
    pub classification: LeadStatus,
    /// Classifier confidence, 0–100.
    pub confidence: u8,
    /// Free-text explanation from the classifier (or the degradation cause).
    pub reasoning: String,
}

impl ClassificationResult {
    /// The degraded result used whenever classification cannot complete.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            is_lead: false,
            classification: LeadStatus::Unclassified,
            confidence: 0,
            reasoning: reason.into(),
        }
    }
}

/// Factor breakdown behind a heuristic score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactors {
    /// Points from urgency keywords in subject + snippet.
    pub urgency: u8,
    /// Points from prior hot leads sharing the sender's domain.
    pub sender_reputation: u8,
    /// Points from business keywords in subject + snippet.
    pub content_relevance: u8,
    /// Points from business-hours receipt timing.
    pub timing: u8,
}

/// Heuristic priority score for one lead. Recomputed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadScore {
    /// Which lead this score belongs to.
    pub lead_id: Uuid,
    /// Total score, 0–100.
    pub total: u8,
    /// Per-factor contributions (unclamped).
    pub factors: ScoreFactors,
    /// Follow-up recommendation derived from the total.
    pub recommendation: String,
}

/// Tone requested for a drafted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyTone {
    Professional,
    Friendly,
    Casual,
    Formal,
}

impl Default for ReplyTone {
    fn default() -> Self {
        Self::Professional
    }
}

impl std::fmt::Display for ReplyTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Professional => write!(f, "professional"),
            Self::Friendly => write!(f, "friendly"),
            Self::Casual => write!(f, "casual"),
            Self::Formal => write!(f, "formal"),
        }
    }
}

impl std::str::FromStr for ReplyTone {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "professional" => Ok(Self::Professional),
            "friendly" => Ok(Self::Friendly),
            "casual" => Ok(Self::Casual),
            "formal" => Ok(Self::Formal),
            _ => Err(format!("Unknown reply tone: {}", s)),
        }
    }
}

/// Length band requested for a drafted reply. Each band carries both prose
/// guidance for the prompt and a hard token ceiling for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyLength {
    Short,
    Medium,
    Detailed,
}

impl Default for ReplyLength {
    fn default() -> Self {
        Self::Medium
    }
}

impl ReplyLength {
    /// Hard completion-token ceiling sent with the generation request.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Short => 200,
            Self::Medium => 350,
            Self::Detailed => 500,
        }
    }

    /// Word-count guidance embedded in the prompt.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Short => "Keep it to 50-75 words.",
            Self::Medium => "Aim for 100-150 words.",
            Self::Detailed => "Write a thorough reply of 200 words or more.",
        }
    }
}

impl std::fmt::Display for ReplyLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Medium => write!(f, "medium"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

impl std::str::FromStr for ReplyLength {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "detailed" => Ok(Self::Detailed),
            _ => Err(format!("Unknown reply length: {}", s)),
        }
    }
}

/// What the user's business does and will not do. Read-only input to reply
/// drafting; drafts must never contradict it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessContext {
    /// Free-text policy rules. Explicit limits stated here ("no projects
    /// under $2k", "we do not do logo design") bind every draft.
    #[serde(default)]
    pub description: String,
    /// Services offered, when enumerated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    /// Pricing plans or rate cards the draft may reference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pricing_plans: Vec<String>,
    /// Value propositions worth leading with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_propositions: Vec<String>,
    /// Who the business sells to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
}

/// How the user writes. Learned or edited by the user over time; consumed,
/// never mutated, by reply drafting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WritingStyle {
    /// Default tone when a request does not pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_tone: Option<ReplyTone>,
    /// Default length band when a request does not pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_length: Option<ReplyLength>,
    /// Writer name used to sign the draft. The only signature content a
    /// draft may carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Phrases the user tends to use; drafts may weave them in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_phrases: Vec<String>,
}

/// A user's stored drafting profile: business facts plus writing style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub business_context: BusinessContext,
    #[serde(default)]
    pub writing_style: WritingStyle,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}
