//! Error types for leadwise.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Lead store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The provider rejected our credentials. Batch-fatal: the caller
    /// must surface a re-authorization prompt rather than retry.
    #[error("Authentication expired for {provider}: re-authorization required")]
    AuthExpired { provider: String },

    #[error("Malformed message {id}: {reason}")]
    MalformedMessage { id: String, reason: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Rate limited by provider {provider}")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Failed to send reply: {0}")]
    SendFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Reply drafting errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// Drafting produced nothing usable. Callers get the cause, never a
    /// partial draft.
    #[error("Reply generation failed: {reason}")]
    GenerationFailed { reason: String },
}

/// Ingestion pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ingestion already running for user {user_id}")]
    IngestInProgress { user_id: String },

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
