//! Unified `LeadStore` trait — single async interface for all persistence.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::leads::model::{Lead, LeadStatus, UserProfile};

/// A single LLM call to record, borrowed from the call site.
#[derive(Debug, Clone)]
pub struct LlmCallRecord<'a> {
    pub user_id: &'a str,
    pub model: &'a str,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: Decimal,
    pub purpose: &'a str,
}

/// Aggregate LLM spend for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LlmUsageSummary {
    pub total_cost: Decimal,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub call_count: u64,
}

/// What an insert against the provider-message key actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row written.
    Inserted,
    /// This provider message was already ingested for the user; the existing
    /// row is kept untouched.
    Duplicate,
}

/// Backend-agnostic store covering leads, drafting profiles, and LLM usage.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a lead, ignoring the write when the provider message was
    /// already ingested for this user.
    async fn upsert_lead(&self, lead: &Lead) -> Result<UpsertOutcome, StoreError>;

    /// Get a lead by id, scoped to its owner. Soft-deleted leads are not
    /// returned.
    async fn get_lead(&self, user_id: &str, id: Uuid) -> Result<Lead, StoreError>;

    /// All non-deleted leads for a user, most recently received first.
    async fn list_leads(&self, user_id: &str) -> Result<Vec<Lead>, StoreError>;

    /// Which of the given provider message ids are already stored for the
    /// user. Used to skip detail fetches for known messages.
    async fn known_provider_ids(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Replace a lead's notes. `None` clears them.
    async fn update_notes(
        &self,
        user_id: &str,
        id: Uuid,
        notes: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Manually override a lead's status.
    async fn override_status(
        &self,
        user_id: &str,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<(), StoreError>;

    /// Soft-delete a lead. The row stays but drops out of listings.
    async fn soft_delete_lead(&self, user_id: &str, id: Uuid) -> Result<(), StoreError>;

    /// Stamp when the lead was responded to and derive the response time.
    /// The first stamp wins; later calls return the lead unchanged.
    async fn mark_responded(
        &self,
        user_id: &str,
        id: Uuid,
        responded_at: DateTime<Utc>,
    ) -> Result<Lead, StoreError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Get a user's drafting profile, if one was saved.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Create or replace a user's drafting profile.
    async fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    // ── LLM usage ───────────────────────────────────────────────────

    /// Record one LLM call. Returns the generated row id.
    async fn record_llm_call(&self, record: &LlmCallRecord<'_>) -> Result<Uuid, StoreError>;

    /// Aggregate spend for a user.
    async fn usage_summary(&self, user_id: &str) -> Result<LlmUsageSummary, StoreError>;
}
