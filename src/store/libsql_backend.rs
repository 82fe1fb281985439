//! libSQL backend — async `LeadStore` trait implementation.
//!
//! Supports local file and in-memory databases. All timestamps are stored
//! as RFC 3339 text; uuids and statuses as text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::leads::model::{Lead, LeadStatus, UserProfile};
use crate::store::migrations;
use crate::store::traits::{LeadStore, LlmCallRecord, LlmUsageSummary, UpsertOutcome};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime() output, with or without fractional seconds
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return ndt.and_utc();
        }
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<i64>` to libsql Value.
fn opt_i64(v: Option<i64>) -> libsql::Value {
    match v {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

/// Map a write error, surfacing constraint violations distinctly.
fn classify_write_error(op: &str, e: libsql::Error) -> StoreError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        StoreError::Constraint(format!("{op}: {msg}"))
    } else {
        StoreError::Query(format!("{op}: {msg}"))
    }
}

fn not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "lead".to_string(),
        id: id.to_string(),
    }
}

/// Map a libsql Row to a Lead.
///
/// Column order matches LEAD_COLUMNS:
/// 0:id, 1:user_id, 2:provider_message_id, 3:sender_email, 4:subject,
/// 5:snippet, 6:full_content, 7:received_at, 8:status, 9:responded_at,
/// 10:response_time_minutes, 11:notes, 12:deleted, 13:created_at, 14:updated_at
fn row_to_lead(row: &libsql::Row) -> Result<Lead, libsql::Error> {
    let id_str: String = row.get(0)?;
    let received_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let responded_str: Option<String> = row.get(9).ok();
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;

    Ok(Lead {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        user_id: row.get(1)?,
        provider_message_id: row.get(2)?,
        sender_email: row.get(3)?,
        subject: row.get(4)?,
        snippet: row.get(5)?,
        full_content: row.get(6).ok(),
        received_at: parse_datetime(&received_str),
        status: status_str.parse().unwrap_or_default(),
        responded_at: parse_optional_datetime(&responded_str),
        response_time_minutes: row.get::<i64>(10).ok(),
        notes: row.get(11).ok(),
        deleted: row.get::<i64>(12).unwrap_or(0) != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Parse a usage summary from an aggregate query row.
async fn parse_usage_summary_row(rows: &mut libsql::Rows) -> Result<LlmUsageSummary, StoreError> {
    use std::str::FromStr;

    match rows.next().await {
        Ok(Some(row)) => {
            // TOTAL() always returns f64 in SQLite/libsql
            let cost_f64: f64 = row.get(0).unwrap_or(0.0);
            let total_cost = Decimal::from_str(&format!("{cost_f64:.10}")).unwrap_or(Decimal::ZERO);
            let input_tokens: f64 = row.get(1).unwrap_or(0.0);
            let output_tokens: f64 = row.get(2).unwrap_or(0.0);
            let call_count = row.get::<i64>(3).unwrap_or(0);

            Ok(LlmUsageSummary {
                total_cost,
                total_input_tokens: input_tokens as u64,
                total_output_tokens: output_tokens as u64,
                call_count: call_count as u64,
            })
        }
        _ => Ok(LlmUsageSummary::default()),
    }
}

// ── Trait implementation ────────────────────────────────────────────

const LEAD_COLUMNS: &str = "id, user_id, provider_message_id, sender_email, subject, snippet, full_content, received_at, status, responded_at, response_time_minutes, notes, deleted, created_at, updated_at";

#[async_trait]
impl LeadStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn upsert_lead(&self, lead: &Lead) -> Result<UpsertOutcome, StoreError> {
        let affected = self
            .conn()
            .execute(
                "INSERT INTO leads (id, user_id, provider_message_id, sender_email, subject, snippet, full_content, received_at, status, responded_at, response_time_minutes, notes, deleted, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
                 ON CONFLICT (user_id, provider_message_id) DO NOTHING",
                params![
                    lead.id.to_string(),
                    lead.user_id.as_str(),
                    lead.provider_message_id.as_str(),
                    lead.sender_email.as_str(),
                    lead.subject.as_str(),
                    lead.snippet.as_str(),
                    opt_text(lead.full_content.as_deref()),
                    lead.received_at.to_rfc3339(),
                    lead.status.to_string(),
                    opt_text_owned(lead.responded_at.map(|t| t.to_rfc3339())),
                    opt_i64(lead.response_time_minutes),
                    opt_text(lead.notes.as_deref()),
                    lead.deleted as i64,
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| classify_write_error("upsert_lead", e))?;

        if affected == 0 {
            Ok(UpsertOutcome::Duplicate)
        } else {
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn get_lead(&self, user_id: &str, id: Uuid) -> Result<Lead, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1 AND user_id = ?2 AND deleted = 0"
                ),
                params![id.to_string(), user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_lead: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_lead: {e}")))?
        {
            Some(row) => {
                row_to_lead(&row).map_err(|e| StoreError::Query(format!("get_lead row: {e}")))
            }
            None => Err(not_found(id)),
        }
    }

    async fn list_leads(&self, user_id: &str) -> Result<Vec<Lead>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE user_id = ?1 AND deleted = 0 ORDER BY received_at DESC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list_leads: {e}")))?
        {
            leads.push(
                row_to_lead(&row).map_err(|e| StoreError::Query(format!("list_leads row: {e}")))?,
            );
        }
        Ok(leads)
    }

    async fn known_provider_ids(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders: String = (2..=ids.len() + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT provider_message_id FROM leads WHERE user_id = ?1 AND provider_message_id IN ({placeholders})"
        );

        let mut values: Vec<libsql::Value> = Vec::with_capacity(ids.len() + 1);
        values.push(libsql::Value::Text(user_id.to_string()));
        values.extend(ids.iter().map(|id| libsql::Value::Text(id.clone())));

        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| StoreError::Query(format!("known_provider_ids: {e}")))?;

        let mut known = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("known_provider_ids: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("known_provider_ids row: {e}")))?;
            known.insert(id);
        }
        Ok(known)
    }

    async fn update_notes(
        &self,
        user_id: &str,
        id: Uuid,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE leads SET notes = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4 AND deleted = 0",
                params![
                    opt_text(notes),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    user_id
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_notes: {e}")))?;

        if affected == 0 { Err(not_found(id)) } else { Ok(()) }
    }

    async fn override_status(
        &self,
        user_id: &str,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4 AND deleted = 0",
                params![
                    status.to_string(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    user_id
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("override_status: {e}")))?;

        if affected == 0 { Err(not_found(id)) } else { Ok(()) }
    }

    async fn soft_delete_lead(&self, user_id: &str, id: Uuid) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE leads SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND user_id = ?3 AND deleted = 0",
                params![Utc::now().to_rfc3339(), id.to_string(), user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("soft_delete_lead: {e}")))?;

        if affected == 0 { Err(not_found(id)) } else { Ok(()) }
    }

    async fn mark_responded(
        &self,
        user_id: &str,
        id: Uuid,
        responded_at: DateTime<Utc>,
    ) -> Result<Lead, StoreError> {
        let current = self.get_lead(user_id, id).await?;
        if current.responded_at.is_some() {
            return Ok(current);
        }

        // Derived minutes never go below zero even if clocks disagree.
        let minutes = (responded_at - current.received_at).num_minutes().max(0);

        // Conditional update keeps the first stamp under concurrent calls.
        self.conn()
            .execute(
                "UPDATE leads SET responded_at = ?1, response_time_minutes = ?2, updated_at = ?3 WHERE id = ?4 AND user_id = ?5 AND responded_at IS NULL",
                params![
                    responded_at.to_rfc3339(),
                    minutes,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    user_id
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("mark_responded: {e}")))?;

        self.get_lead(user_id, id).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT business_context, writing_style FROM user_profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_profile: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_profile: {e}")))?
        {
            Some(row) => {
                let context_json: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_profile row: {e}")))?;
                let style_json: String = row
                    .get(1)
                    .map_err(|e| StoreError::Query(format!("get_profile row: {e}")))?;

                let business_context = serde_json::from_str(&context_json)
                    .map_err(|e| StoreError::Serialization(format!("business_context: {e}")))?;
                let writing_style = serde_json::from_str(&style_json)
                    .map_err(|e| StoreError::Serialization(format!("writing_style: {e}")))?;

                Ok(Some(UserProfile {
                    user_id: user_id.to_string(),
                    business_context,
                    writing_style,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let context_json = serde_json::to_string(&profile.business_context)
            .map_err(|e| StoreError::Serialization(format!("business_context: {e}")))?;
        let style_json = serde_json::to_string(&profile.writing_style)
            .map_err(|e| StoreError::Serialization(format!("writing_style: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO user_profiles (user_id, business_context, writing_style, updated_at) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (user_id) DO UPDATE SET business_context = excluded.business_context, writing_style = excluded.writing_style, updated_at = excluded.updated_at",
                params![
                    profile.user_id.as_str(),
                    context_json,
                    style_json,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("save_profile: {e}")))?;
        Ok(())
    }

    // ── LLM usage ───────────────────────────────────────────────────

    async fn record_llm_call(&self, record: &LlmCallRecord<'_>) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO llm_usage (id, user_id, model, input_tokens, output_tokens, cost, purpose, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.to_string(),
                    record.user_id,
                    record.model,
                    record.input_tokens as i64,
                    record.output_tokens as i64,
                    record.cost.to_string(),
                    record.purpose,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("record_llm_call: {e}")))?;

        Ok(id)
    }

    async fn usage_summary(&self, user_id: &str) -> Result<LlmUsageSummary, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT TOTAL(CAST(cost AS REAL)), TOTAL(input_tokens), TOTAL(output_tokens), COUNT(*) FROM llm_usage WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("usage_summary: {e}")))?;

        parse_usage_summary_row(&mut rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn test_store() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_lead(user_id: &str, provider_message_id: &str) -> Lead {
        Lead::new(
            user_id,
            provider_message_id,
            "jane@acme.com",
            "Website quote",
            "Hi, I need a quote for",
            Utc::now(),
        )
    }

    // ── Lead CRUD tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_then_get_roundtrip() {
        let store = test_store().await;
        let lead = make_lead("u1", "msg-1")
            .with_full_content("Hi, I need a quote for a new website.")
            .with_status(LeadStatus::Warm);

        let outcome = store.upsert_lead(&lead).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let loaded = store.get_lead("u1", lead.id).await.unwrap();
        assert_eq!(loaded.id, lead.id);
        assert_eq!(loaded.provider_message_id, "msg-1");
        assert_eq!(loaded.sender_email, "jane@acme.com");
        assert_eq!(loaded.full_content.as_deref(), Some("Hi, I need a quote for a new website."));
        assert_eq!(loaded.status, LeadStatus::Warm);
        assert!(loaded.responded_at.is_none());
        assert!(!loaded.deleted);
    }

    #[tokio::test]
    async fn duplicate_provider_message_is_ignored() {
        let store = test_store().await;
        let first = make_lead("u1", "msg-1").with_status(LeadStatus::Hot);
        store.upsert_lead(&first).await.unwrap();

        // Same provider message again, different lead id and status.
        let second = make_lead("u1", "msg-1").with_status(LeadStatus::Cold);
        let outcome = store.upsert_lead(&second).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Duplicate);

        // Original row untouched.
        let loaded = store.get_lead("u1", first.id).await.unwrap();
        assert_eq!(loaded.status, LeadStatus::Hot);
    }

    #[tokio::test]
    async fn get_lead_is_scoped_to_owner() {
        let store = test_store().await;
        let lead = make_lead("u1", "msg-1");
        store.upsert_lead(&lead).await.unwrap();

        let result = store.get_lead("u2", lead.id).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_orders_by_received_and_hides_deleted() {
        let store = test_store().await;

        let mut older = make_lead("u1", "msg-old");
        older.received_at = Utc::now() - Duration::hours(2);
        let newer = make_lead("u1", "msg-new");
        let deleted = make_lead("u1", "msg-gone");

        store.upsert_lead(&older).await.unwrap();
        store.upsert_lead(&newer).await.unwrap();
        store.upsert_lead(&deleted).await.unwrap();
        store.soft_delete_lead("u1", deleted.id).await.unwrap();

        let leads = store.list_leads("u1").await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].provider_message_id, "msg-new");
        assert_eq!(leads[1].provider_message_id, "msg-old");
    }

    #[tokio::test]
    async fn known_provider_ids_returns_stored_subset() {
        let store = test_store().await;
        store.upsert_lead(&make_lead("u1", "msg-1")).await.unwrap();
        store.upsert_lead(&make_lead("u1", "msg-2")).await.unwrap();
        store.upsert_lead(&make_lead("u2", "msg-3")).await.unwrap();

        let candidates = vec![
            "msg-1".to_string(),
            "msg-3".to_string(),
            "msg-9".to_string(),
        ];
        let known = store.known_provider_ids("u1", &candidates).await.unwrap();
        assert_eq!(known.len(), 1);
        assert!(known.contains("msg-1"));

        let empty = store.known_provider_ids("u1", &[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn notes_and_status_edits() {
        let store = test_store().await;
        let lead = make_lead("u1", "msg-1");
        store.upsert_lead(&lead).await.unwrap();

        store
            .update_notes("u1", lead.id, Some("called back, waiting on budget"))
            .await
            .unwrap();
        store
            .override_status("u1", lead.id, LeadStatus::Hot)
            .await
            .unwrap();

        let loaded = store.get_lead("u1", lead.id).await.unwrap();
        assert_eq!(loaded.notes.as_deref(), Some("called back, waiting on budget"));
        assert_eq!(loaded.status, LeadStatus::Hot);

        store.update_notes("u1", lead.id, None).await.unwrap();
        let loaded = store.get_lead("u1", lead.id).await.unwrap();
        assert!(loaded.notes.is_none());
    }

    #[tokio::test]
    async fn edits_on_missing_lead_return_not_found() {
        let store = test_store().await;
        let missing = Uuid::new_v4();

        assert!(matches!(
            store.update_notes("u1", missing, Some("x")).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.override_status("u1", missing, LeadStatus::Cold).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.soft_delete_lead("u1", missing).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    // ── Response stamping tests ─────────────────────────────────────

    #[tokio::test]
    async fn mark_responded_derives_minutes() {
        let store = test_store().await;
        let mut lead = make_lead("u1", "msg-1");
        lead.received_at = Utc::now() - Duration::minutes(47);
        store.upsert_lead(&lead).await.unwrap();

        let stamped = store
            .mark_responded("u1", lead.id, Utc::now())
            .await
            .unwrap();
        assert!(stamped.responded_at.is_some());
        assert_eq!(stamped.response_time_minutes, Some(47));
    }

    #[tokio::test]
    async fn mark_responded_first_stamp_wins() {
        let store = test_store().await;
        let mut lead = make_lead("u1", "msg-1");
        lead.received_at = Utc::now() - Duration::minutes(10);
        store.upsert_lead(&lead).await.unwrap();

        let first = store
            .mark_responded("u1", lead.id, Utc::now())
            .await
            .unwrap();
        let second = store
            .mark_responded("u1", lead.id, Utc::now() + Duration::hours(5))
            .await
            .unwrap();

        assert_eq!(first.responded_at, second.responded_at);
        assert_eq!(first.response_time_minutes, second.response_time_minutes);
    }

    #[tokio::test]
    async fn mark_responded_clamps_negative_minutes() {
        let store = test_store().await;
        let lead = make_lead("u1", "msg-1");
        store.upsert_lead(&lead).await.unwrap();

        // Response stamped before the recorded receipt time.
        let stamped = store
            .mark_responded("u1", lead.id, lead.received_at - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(stamped.response_time_minutes, Some(0));
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn profile_save_and_reload() {
        let store = test_store().await;
        assert!(store.get_profile("u1").await.unwrap().is_none());

        let mut profile = UserProfile::new("u1");
        profile.business_context.description = "Freelance web studio. No projects under $2k.".into();
        profile.business_context.services = vec!["Web design".into(), "SEO".into()];
        profile.writing_style.signature = Some("Sam".into());
        store.save_profile(&profile).await.unwrap();

        let loaded = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(
            loaded.business_context.description,
            "Freelance web studio. No projects under $2k."
        );
        assert_eq!(loaded.business_context.services.len(), 2);
        assert_eq!(loaded.writing_style.signature.as_deref(), Some("Sam"));

        // Saving again replaces the stored profile.
        profile.business_context.description = "Updated".into();
        store.save_profile(&profile).await.unwrap();
        let loaded = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.business_context.description, "Updated");
    }

    // ── LLM usage tests ─────────────────────────────────────────────

    fn make_usage_record<'a>(user_id: &'a str, cost: Decimal) -> LlmCallRecord<'a> {
        LlmCallRecord {
            user_id,
            model: "gpt-4o-mini",
            input_tokens: 1000,
            output_tokens: 500,
            cost,
            purpose: "classification",
        }
    }

    #[tokio::test]
    async fn usage_summary_totals_per_user() {
        let store = test_store().await;
        store
            .record_llm_call(&make_usage_record("u1", dec!(0.0005)))
            .await
            .unwrap();
        store
            .record_llm_call(&make_usage_record("u1", dec!(0.0005)))
            .await
            .unwrap();
        store
            .record_llm_call(&make_usage_record("u2", dec!(0.9)))
            .await
            .unwrap();

        let summary = store.usage_summary("u1").await.unwrap();
        assert_eq!(summary.call_count, 2);
        assert_eq!(summary.total_input_tokens, 2000);
        assert_eq!(summary.total_output_tokens, 1000);
        assert_eq!(summary.total_cost, dec!(0.001));
    }

    #[tokio::test]
    async fn usage_summary_empty_is_default() {
        let store = test_store().await;
        let summary = store.usage_summary("nobody").await.unwrap();
        assert_eq!(summary, LlmUsageSummary::default());
    }
}
