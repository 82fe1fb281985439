//! AI classification gateway.
//!
//! Wraps the LLM behind a contract that never fails: every failure path
//! (transport, credentials, malformed output) degrades to an
//! `unclassified` verdict with confidence 0 so a bad call can never sink
//! an ingestion batch. The model's verdict is advisory below the
//! configured confidence floor.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::leads::model::{ClassificationResult, LeadStatus};
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};
use crate::llm::{costs, retry};
use crate::store::{LeadStore, LlmCallRecord};

const CLASSIFY_MAX_TOKENS: u32 = 512;
const CLASSIFY_TEMPERATURE: f32 = 0.1;
/// Body text beyond this is cut from the prompt for token efficiency.
const CLASSIFY_BODY_CHARS: usize = 2000;

/// Lead classification gateway with usage accounting.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn LeadStore>,
    confidence_floor: u8,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn LeadStore>, confidence_floor: u8) -> Self {
        Self {
            llm,
            store,
            confidence_floor,
        }
    }

    /// Judge whether an email is a lead and how promising it is.
    ///
    /// Never fails: transport errors, auth errors, and unparseable output
    /// all come back as the degraded `unclassified` shape with the cause
    /// in `reasoning`.
    pub async fn classify(
        &self,
        user_id: &str,
        subject: &str,
        body: &str,
        sender_email: &str,
    ) -> ClassificationResult {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(subject, body, sender_email)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response =
            match retry::with_retries("classify", || self.llm.complete(request.clone())).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(sender = %sender_email, error = %e, "Classification call failed");
                    return ClassificationResult::fallback(format!("classification failed: {e}"));
                }
            };

        self.record_usage(user_id, &response).await;

        match parse_classification(&response.content) {
            Ok(result) => self.apply_confidence_gate(result),
            Err(e) => {
                warn!(
                    raw_response = %response.content,
                    error = %e,
                    "Failed to parse classification response"
                );
                ClassificationResult::fallback(format!("parse failed: {e}"))
            }
        }
    }

    /// A lead verdict below the trust floor is rejected; the stated
    /// confidence is kept so the override stays auditable.
    fn apply_confidence_gate(&self, mut result: ClassificationResult) -> ClassificationResult {
        if result.is_lead && result.confidence < self.confidence_floor {
            debug!(
                confidence = result.confidence,
                floor = self.confidence_floor,
                "Rejecting lead verdict below confidence floor"
            );
            result.is_lead = false;
            result.classification = LeadStatus::Unclassified;
            result.reasoning.push_str(" (Rejected: confidence too low)");
        }
        result
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
            purpose: "classification",
        };
        if let Err(e) = self.store.record_llm_call(&record).await {
            warn!(error = %e, "Failed to record LLM usage");
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the classification system prompt.
fn build_classify_system_prompt() -> String {
    "You are a lead qualification engine for a small service business. Judge whether an \
     incoming email is a sales lead and how promising it is.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"isLead\": true, \"classification\": \"hot\", \"confidence\": 85, \"reasoning\": \"...\"}\n\n\
     Fields:\n\
     - \"isLead\": true if the sender wants to buy, hire, or engage the business\n\
     - \"classification\": one of \"hot\", \"warm\", \"cold\", \"not_a_lead\"\n\
     - \"confidence\": integer 0-100\n\
     - \"reasoning\": one sentence explaining the verdict\n\n\
     Rules:\n\
     - \"hot\": clear buying intent with budget, timeline, or urgency\n\
     - \"warm\": genuine interest but missing commitment signals\n\
     - \"cold\": vague or early-stage interest\n\
     - \"not_a_lead\": newsletters, marketing, job applications, personal mail\n\
     - When unsure whether something is a lead, lower the confidence rather than guessing"
        .to_string()
}

/// Build the classification user prompt from the email.
fn build_classify_user_prompt(subject: &str, body: &str, sender_email: &str) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(&format!("From: {}\n", sender_email));
    prompt.push_str(&format!("Subject: {}\n", subject));

    let body_preview: String = body.chars().take(CLASSIFY_BODY_CHARS).collect();
    prompt.push_str(&format!("\nMessage:\n{}", body_preview));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// LLM classification response structure.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyResponse {
    #[serde(default)]
    is_lead: bool,
    #[serde(default)]
    classification: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

/// Parse the LLM response into a `ClassificationResult`.
fn parse_classification(raw: &str) -> Result<ClassificationResult, String> {
    let json_str = extract_json_object(raw);
    let response: ClassifyResponse =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    // An unrecognized label degrades to unclassified rather than failing.
    let classification: LeadStatus = response
        .classification
        .to_lowercase()
        .parse()
        .unwrap_or_default();

    Ok(ClassificationResult {
        is_lead: response.is_lead,
        classification,
        confidence: response.confidence.clamp(0.0, 100.0).round() as u8,
        reasoning: if response.reasoning.is_empty() {
            "No reasoning provided".to_string()
        } else {
            response.reasoning
        },
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Fenced code block, with or without a language tag
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                let inner = after[..end].trim();
                if inner.starts_with('{') {
                    return inner.to_string();
                }
            }
        }
    }

    // Object embedded in surrounding prose
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
