//! Reply drafting — persuasive drafts constrained by the business's own
//! stated policy.
//!
//! The policy block in the system prompt is the only enforcement mechanism:
//! nothing validates the draft after generation, so the block is built from
//! the business context on every call and never skipped.

use std::sync::Arc;

use tracing::warn;

use crate::error::ReplyError;
use crate::leads::model::{BusinessContext, Lead, ReplyLength, ReplyTone, WritingStyle};
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};
use crate::llm::{costs, retry};
use crate::mail::parser::{self, UrgencyLevel};
use crate::store::{LeadStore, LlmCallRecord};

/// Drafts read better warm than deterministic.
const REPLY_TEMPERATURE: f32 = 0.7;
/// Lead body budget inside the prompt.
const REPLY_BODY_CHARS: usize = 2000;
/// Prior replies included for voice, and the budget for each.
const MAX_PRIOR_REPLIES: usize = 3;
const PRIOR_REPLY_CHARS: usize = 400;

/// Drafts replies to leads through the language backend.
pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn LeadStore>,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn LeadStore>) -> Self {
        Self { llm, store }
    }

    /// Draft a reply body for a lead.
    ///
    /// `tone` and `length` fall back to the writing style's preferences,
    /// then to professional/medium. Returns only the message body; no
    /// subject line and no signature beyond the configured writer name.
    pub async fn generate(
        &self,
        lead: &Lead,
        tone: Option<ReplyTone>,
        length: Option<ReplyLength>,
        business: &BusinessContext,
        style: &WritingStyle,
        prior_replies: &[String],
    ) -> Result<String, ReplyError> {
        let (tone, length) = resolve_voice(tone, length, style);

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_policy_prompt(business)),
            ChatMessage::user(build_task_prompt(lead, tone, length, style, prior_replies)),
        ])
        .with_temperature(REPLY_TEMPERATURE)
        .with_max_tokens(length.max_tokens());

        let response = retry::with_retries("draft_reply", || self.llm.complete(request.clone()))
            .await
            .map_err(|e| ReplyError::GenerationFailed {
                reason: e.to_string(),
            })?;

        self.record_usage(&lead.user_id, &response).await;

        let draft = response.content.trim();
        if draft.is_empty() {
            return Err(ReplyError::GenerationFailed {
                reason: "backend returned an empty draft".into(),
            });
        }
        Ok(draft.to_string())
    }

    async fn record_usage(&self, user_id: &str, response: &CompletionResponse) {
        let cost = costs::completion_cost(
            response.input_tokens,
            response.output_tokens,
            self.llm.cost_per_token(),
        );
        let record = LlmCallRecord {
            user_id,
            model: self.llm.model_name(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost,
            purpose: "reply_draft",
        };
        if let Err(e) = self.store.record_llm_call(&record).await {
            warn!(error = %e, "Failed to record LLM usage");
        }
    }
}

/// Explicit request, then the writing style's preference, then the default.
fn resolve_voice(
    tone: Option<ReplyTone>,
    length: Option<ReplyLength>,
    style: &WritingStyle,
) -> (ReplyTone, ReplyLength) {
    (
        tone.or(style.preferred_tone).unwrap_or_default(),
        length.or(style.preferred_length).unwrap_or_default(),
    )
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the system prompt. Policy rules from the business description come
/// first and override every generic persuasion instruction below them.
fn build_policy_prompt(business: &BusinessContext) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(
        "You write replies to inbound sales leads on behalf of a business owner.\n\n",
    );

    if !business.description.trim().is_empty() {
        prompt.push_str("Business policy (binding — never contradict these rules, \
                         they override everything below):\n");
        prompt.push_str(business.description.trim());
        prompt.push_str("\n\n");
    }

    if !business.services.is_empty() {
        prompt.push_str(&format!(
            "Services offered: {}\n",
            business.services.join(", ")
        ));
    }
    if !business.pricing_plans.is_empty() {
        prompt.push_str(&format!("Pricing: {}\n", business.pricing_plans.join("; ")));
    }
    if !business.value_propositions.is_empty() {
        prompt.push_str(&format!(
            "Value propositions: {}\n",
            business.value_propositions.join("; ")
        ));
    }
    if let Some(ref audience) = business.target_audience {
        prompt.push_str(&format!("Target audience: {}\n", audience));
    }

    prompt.push_str(
        "\nRules:\n\
         - Reply with the message body only. No subject line.\n\
         - Never offer a service or price the business policy excludes.\n\
         - Do not add a signature block beyond the writer's name you are given.\n\
         - Be persuasive but honest. Sound like a person, not a template.",
    );

    prompt
}

/// Build the task prompt describing the specific lead and the requested
/// voice.
fn build_task_prompt(
    lead: &Lead,
    tone: ReplyTone,
    length: ReplyLength,
    style: &WritingStyle,
    prior_replies: &[String],
) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("From: {}\n", lead.sender_email));
    prompt.push_str(&format!("Subject: {}\n", lead.subject));

    let body = lead.body_text();
    let urgency = parser::detect_urgency(&lead.subject, body);
    let level = match urgency.level {
        UrgencyLevel::High => "high",
        UrgencyLevel::Medium => "medium",
        UrgencyLevel::Low => "low",
    };
    if urgency.indicators.is_empty() {
        prompt.push_str(&format!("Urgency: {}\n", level));
    } else {
        prompt.push_str(&format!(
            "Urgency: {} ({})\n",
            level,
            urgency.indicators.join(", ")
        ));
    }

    let body_preview: String = body.chars().take(REPLY_BODY_CHARS).collect();
    prompt.push_str(&format!("Message:\n{}\n", body_preview));

    if !prior_replies.is_empty() {
        prompt.push_str("\nEarlier replies by the same writer, for voice:\n");
        for (i, reply) in prior_replies.iter().take(MAX_PRIOR_REPLIES).enumerate() {
            let preview: String = reply.chars().take(PRIOR_REPLY_CHARS).collect();
            prompt.push_str(&format!("  [{}] {}\n", i + 1, preview));
        }
    }

    prompt.push_str(&format!("\nWrite the reply now. Tone: {}. {}", tone, length.guidance()));

    if !style.custom_phrases.is_empty() {
        prompt.push_str(&format!(
            "\nPhrases the writer tends to use: {}",
            style.custom_phrases.join(", ")
        ));
    }
    if let Some(ref signature) = style.signature {
        prompt.push_str(&format!("\nSign off as: {}", signature));
    }

    prompt
}
