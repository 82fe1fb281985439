//! Configuration types, built from `LEADWISE_*` environment variables.

use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Mail provider (Gmail REST) configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub base_url: String,
    pub access_token: SecretString,
    pub timeout_secs: u64,
}

/// Knobs for classification and scoring.
///
/// The defaults here are the tuned values; environment variables exist so
/// deployments can adjust them without a rebuild.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Leads classified with confidence below this are rejected.
    pub confidence_floor: u8,
    /// Keywords that add urgency points when found in subject or snippet.
    pub urgency_keywords: Vec<String>,
    /// Keywords that add content-relevance points.
    pub business_keywords: Vec<String>,
    /// Mailbox search query used to find candidate messages.
    pub search_query: String,
    /// Maximum message ids fetched per listing call.
    pub list_page_size: u32,
    /// Maximum full messages fetched per ingest run.
    pub detail_fetch_limit: usize,
    /// Concurrent detail fetches per ingest run.
    pub fetch_concurrency: usize,
    /// Offset from UTC used for business-hours checks (whole hours).
    pub utc_offset_hours: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 50,
            urgency_keywords: to_string_vec(&[
                "urgent",
                "asap",
                "immediate",
                "quickly",
                "rush",
                "emergency",
            ]),
            business_keywords: to_string_vec(&[
                "budget",
                "project",
                "contract",
                "proposal",
                "quote",
                "meeting",
                "partnership",
            ]),
            search_query: "is:unread (quote OR proposal OR pricing OR inquiry OR project)"
                .to_string(),
            list_page_size: 20,
            detail_fetch_limit: 10,
            fetch_concurrency: 3,
            utc_offset_hours: 0,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Shared secret for service-to-service calls. `None` disables them.
    pub service_key: Option<SecretString>,
}

/// Background ingestion schedule.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Seconds between ingest sweeps.
    pub interval_secs: u64,
    /// User ids to ingest for. Empty disables the scheduler.
    pub users: Vec<String>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub mail: MailConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// Required: `LEADWISE_GMAIL_TOKEN`, `LEADWISE_OPENAI_API_KEY`.
    /// Everything else falls back to defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PipelineConfig::default();

        let confidence_floor: u8 =
            parse_env("LEADWISE_CONFIDENCE_FLOOR", defaults.confidence_floor)?;
        if confidence_floor > 100 {
            return Err(ConfigError::InvalidValue {
                key: "LEADWISE_CONFIDENCE_FLOOR".to_string(),
                message: format!("must be 0-100, got {}", confidence_floor),
            });
        }

        let utc_offset_hours: i32 =
            parse_env("LEADWISE_UTC_OFFSET_HOURS", defaults.utc_offset_hours)?;
        if !(-12..=14).contains(&utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                key: "LEADWISE_UTC_OFFSET_HOURS".to_string(),
                message: format!("must be -12..=14, got {}", utc_offset_hours),
            });
        }

        let pipeline = PipelineConfig {
            confidence_floor,
            urgency_keywords: list_env("LEADWISE_URGENCY_KEYWORDS", defaults.urgency_keywords),
            business_keywords: list_env("LEADWISE_BUSINESS_KEYWORDS", defaults.business_keywords),
            search_query: std::env::var("LEADWISE_SEARCH_QUERY").unwrap_or(defaults.search_query),
            list_page_size: parse_env("LEADWISE_LIST_PAGE_SIZE", defaults.list_page_size)?,
            detail_fetch_limit: parse_env(
                "LEADWISE_DETAIL_FETCH_LIMIT",
                defaults.detail_fetch_limit,
            )?,
            fetch_concurrency: parse_env("LEADWISE_FETCH_CONCURRENCY", defaults.fetch_concurrency)?,
            utc_offset_hours,
        };

        let mail = MailConfig {
            base_url: std::env::var("LEADWISE_GMAIL_BASE_URL")
                .unwrap_or_else(|_| "https://gmail.googleapis.com/gmail/v1".to_string()),
            access_token: SecretString::from(require_env("LEADWISE_GMAIL_TOKEN")?),
            timeout_secs: parse_env("LEADWISE_MAIL_TIMEOUT_SECS", 30)?,
        };

        let llm = LlmConfig {
            api_key: SecretString::from(require_env("LEADWISE_OPENAI_API_KEY")?),
            model: std::env::var("LEADWISE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("LEADWISE_OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            timeout_secs: parse_env("LEADWISE_LLM_TIMEOUT_SECS", 60)?,
        };

        let server = ServerConfig {
            bind_addr: std::env::var("LEADWISE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            service_key: std::env::var("LEADWISE_SERVICE_KEY")
                .ok()
                .map(SecretString::from),
        };

        let schedule = ScheduleConfig {
            interval_secs: parse_env("LEADWISE_POLL_INTERVAL_SECS", 900)?,
            users: list_env("LEADWISE_POLL_USERS", Vec::new()),
        };

        Ok(Self {
            db_path: std::env::var("LEADWISE_DB_PATH")
                .unwrap_or_else(|_| "./data/leadwise.db".to_string()),
            mail,
            llm,
            pipeline,
            server,
            schedule,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse an optional env var, falling back to `default` when unset.
/// A set-but-unparseable value is an error rather than a silent default.
fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

/// Comma-separated list env var; unset or empty falls back to `default`.
fn list_env(key: &str, default: Vec<String>) -> Vec<String> {
    let items: Vec<String> = std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() { default } else { items }
}

fn to_string_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
