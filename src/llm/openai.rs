//! OpenAI-compatible chat-completions backend.
//!
//! Any deployment speaking the `/chat/completions` dialect works — the base
//! URL decides which one. HTTPS is required except for localhost, so an API
//! key never travels a remote wire in cleartext.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};
use crate::llm::LlmConfig;

const PROVIDER: &str = "openai";

/// Reqwest-backed chat-completions client.
#[derive(Debug)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    rates: (Decimal, Decimal),
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        validate_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            rates: costs::model_rates(&config.model),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        self.rates
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.into(),
                });
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited {
                    provider: PROVIDER.into(),
                    retry_after: parse_retry_after(&resp),
                });
            }
            let text = resp.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Unavailable {
                    provider: PROVIDER.into(),
                    reason: format!("HTTP {}: {}", status, excerpt(&text)),
                });
            }
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {}: {}", status, excerpt(&text)),
            });
        }

        let parsed: ChatCompletionResponse =
            resp.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: "no choices in response".into(),
            })?;

        let finish_reason = finish_reason_from(choice.finish_reason.as_deref());
        if finish_reason == FinishReason::Length {
            warn!(model = %self.model, "Completion hit the token ceiling");
        }

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));
        debug!(
            model = %self.model,
            input_tokens,
            output_tokens,
            "Completion finished"
        );

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            input_tokens,
            output_tokens,
            finish_reason,
            response_id: parsed.id,
        })
    }
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ── Helpers ─────────────────────────────────────────────────────────

/// HTTPS required for remote hosts; plain HTTP passes only for localhost.
fn validate_base_url(base_url: &str) -> Result<(), LlmError> {
    let parsed = reqwest::Url::parse(base_url).map_err(|e| LlmError::RequestFailed {
        provider: PROVIDER.into(),
        reason: format!("invalid base URL '{base_url}': {e}"),
    })?;
    let host = parsed.host_str().unwrap_or("");
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1" => {
            warn!(base_url, "Using unencrypted HTTP to a local language service");
            Ok(())
        }
        scheme => Err(LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("refusing scheme '{scheme}' for base URL '{base_url}'"),
        }),
    }
}

fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn finish_reason_from(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}
