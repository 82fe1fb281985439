//! Gmail-style REST mail provider.
//!
//! Talks to the provider's `users/me` surface: keyword-filtered listing,
//! full-message fetch, and raw RFC 2822 sends. Credential rejection maps to
//! `MailError::AuthExpired` so callers can prompt re-authorization instead
//! of retrying.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::MailProvider;
use crate::mail::types::{ListMessagesResponse, MessageRef, OutgoingReply, RawMessage};

const PROVIDER: &str = "gmail";

/// REST client for a Gmail-style mailbox API.
pub struct HttpMailProvider {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl HttpMailProvider {
    /// Build a provider client from config. The request timeout applies to
    /// every call made through this client.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MailError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    /// Map provider status codes onto the error taxonomy.
    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, MailError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MailError::AuthExpired {
                provider: PROVIDER.into(),
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(MailError::RateLimited {
                provider: PROVIDER.into(),
            }),
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(MailError::RequestFailed {
                    provider: PROVIDER.into(),
                    reason: format!("HTTP {}: {}", status, excerpt(&body)),
                })
            }
        }
    }
}

#[async_trait]
impl MailProvider for HttpMailProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("q", query), ("maxResults", &max_results.to_string())])
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;
        let resp = self.check(resp).await?;

        let listing: ListMessagesResponse =
            resp.json().await.map_err(|e| MailError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;
        debug!(count = listing.messages.len(), query, "Listed candidate messages");
        Ok(listing.messages)
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, MailError> {
        let url = format!("{}/users/me/messages/{}", self.base_url, id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;
        let resp = self.check(resp).await?;

        resp.json().await.map_err(|e| MailError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<String, MailError> {
        let raw = URL_SAFE_NO_PAD.encode(compose_rfc822(reply).as_bytes());
        let mut payload = json!({ "raw": raw });
        if let Some(thread_id) = &reply.thread_id {
            payload["threadId"] = json!(thread_id);
        }

        let url = format!("{}/users/me/messages/send", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;
        let resp = self.check(resp).await?;

        let sent: MessageRef = resp.json().await.map_err(|e| MailError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
        debug!(message_id = %sent.id, to = %reply.to, "Reply sent");
        Ok(sent.id)
    }
}

/// Assemble the raw RFC 2822 text the send endpoint expects.
fn compose_rfc822(reply: &OutgoingReply) -> String {
    format!(
        "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        reply.to, reply.subject, reply.body
    )
}

/// First 200 chars of an error body, enough for logs without dumping pages.
fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}
