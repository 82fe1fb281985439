//! Language-model integration for LeadWise.
//!
//! Classification and reply drafting both go through the [`LlmProvider`]
//! trait. The only backend is an OpenAI-compatible chat-completions API,
//! so self-hosted gateways work by pointing `base_url` at them.

pub mod costs;
pub mod openai;
pub mod provider;
pub(crate) mod retry;

pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(config)?;
    tracing::info!("Using OpenAI-compatible backend (model: {})", config.model);
    Ok(Arc::new(provider))
}
