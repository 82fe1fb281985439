//! Ingestion orchestration — list candidates, drop known ids, fetch details,
//! parse, classify, and store the survivors as leads.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{MailError, PipelineError};
use crate::identity::Actor;
use crate::leads::model::{Lead, LeadStatus};
use crate::mail::{MailProvider, parser};
use crate::pipeline::classifier::Classifier;
use crate::store::{LeadStore, UpsertOutcome};

/// Counters from one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Candidates the provider listing returned.
    pub listed: usize,
    /// Listed candidates already in the store, skipped without a detail fetch.
    pub known: usize,
    /// Detail fetches that succeeded.
    pub fetched: usize,
    /// Candidates dropped after fetch (automated sender, malformed, or a
    /// per-message provider failure).
    pub skipped: usize,
    /// New leads written to the store.
    pub stored: usize,
    /// Stored leads that ended up without a usable classification.
    pub unclassified: usize,
    /// The leads stored by this run, classification included.
    pub leads: Vec<Lead>,
}

/// Runs the ingestion pipeline for one user at a time.
///
/// A second call for a user whose run is still in flight is refused rather
/// than queued; the provider listing is the same either way.
pub struct Ingestor {
    provider: Arc<dyn MailProvider>,
    classifier: Classifier,
    store: Arc<dyn LeadStore>,
    config: PipelineConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl Ingestor {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        classifier: Classifier,
        store: Arc<dyn LeadStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            classifier,
            store,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run one ingestion pass for the acting user's mailbox.
    ///
    /// Fails fast on expired provider credentials so the caller can surface
    /// a re-authorization prompt. Per-message failures are logged and
    /// counted, never fatal.
    pub async fn ingest(&self, actor: &Actor) -> Result<IngestReport, PipelineError> {
        let user_id = actor.user_id();

        {
            let mut guard = self.in_flight.lock().unwrap();
            if !guard.insert(user_id.to_string()) {
                return Err(PipelineError::IngestInProgress {
                    user_id: user_id.to_string(),
                });
            }
        }

        let result = self.run(user_id).await;
        self.in_flight.lock().unwrap().remove(user_id);
        result
    }

    async fn run(&self, user_id: &str) -> Result<IngestReport, PipelineError> {
        let mut report = IngestReport::default();

        let refs = self
            .provider
            .list_messages(&self.config.search_query, self.config.list_page_size)
            .await?;
        report.listed = refs.len();

        if refs.is_empty() {
            info!("No candidate messages for {user_id}");
            return Ok(report);
        }

        let ids: Vec<String> = refs.iter().map(|r| r.id.clone()).collect();
        let known = self.store.known_provider_ids(user_id, &ids).await?;
        report.known = known.len();

        // Anything beyond the per-run detail budget stays unread and gets
        // picked up by a later pass.
        let candidates: Vec<_> = refs
            .into_iter()
            .filter(|r| !known.contains(&r.id))
            .take(self.config.detail_fetch_limit)
            .collect();

        for chunk in candidates.chunks(self.config.fetch_concurrency.max(1)) {
            let fetches = chunk.iter().map(|r| self.provider.get_message(&r.id));

            for (candidate, fetched) in chunk.iter().zip(join_all(fetches).await) {
                let raw = match fetched {
                    Ok(raw) => raw,
                    Err(e @ MailError::AuthExpired { .. }) => {
                        warn!("Aborting ingest for {user_id}: {e}");
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!("Skipping message {}: {e}", candidate.id);
                        report.skipped += 1;
                        continue;
                    }
                };
                report.fetched += 1;

                let parsed = match parser::parse(&raw) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Skipping message {}: {e}", candidate.id);
                        report.skipped += 1;
                        continue;
                    }
                };

                if parser::is_automated_sender(&parsed.sender_email) {
                    debug!("Skipping automated sender {}", parsed.sender_email);
                    report.skipped += 1;
                    continue;
                }

                let classification = self
                    .classifier
                    .classify(
                        user_id,
                        &parsed.subject,
                        &parsed.body_text,
                        &parsed.sender_email,
                    )
                    .await;

                let mut lead = Lead::new(
                    user_id,
                    raw.id.clone(),
                    parsed.sender_email,
                    parsed.subject,
                    raw.snippet.trim(),
                    raw.received_at(),
                )
                .with_status(classification.classification);
                if !parsed.body_text.is_empty() {
                    lead = lead.with_full_content(parsed.body_text);
                }

                match self.store.upsert_lead(&lead).await {
                    Ok(UpsertOutcome::Inserted) => {
                        report.stored += 1;
                        if lead.status == LeadStatus::Unclassified {
                            report.unclassified += 1;
                        }
                        report.leads.push(lead);
                    }
                    Ok(UpsertOutcome::Duplicate) => {
                        debug!("Message {} already stored for {user_id}", lead.provider_message_id);
                    }
                    Err(e) => {
                        warn!("Failed to store message {}: {e}", lead.provider_message_id);
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            "Ingest for {user_id}: {} listed, {} known, {} stored, {} skipped",
            report.listed, report.known, report.stored, report.skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use rust_decimal_macros::dec;

    use crate::error::LlmError;
    use crate::llm::provider::{
        CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    };
    use crate::mail::types::{
        Header, MessagePayload, MessageRef, OutgoingReply, PartBody, RawMessage,
    };
    use crate::store::LibSqlBackend;

    // ── Mocks ───────────────────────────────────────────────────────

    struct MockLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-model"
        }

        fn cost_per_token(&self) -> (rust_decimal::Decimal, rust_decimal::Decimal) {
            (dec!(0.000001), dec!(0.000002))
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 100,
                output_tokens: 50,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    struct MockMailbox {
        messages: Vec<RawMessage>,
        auth_expired: bool,
        broken_ids: HashSet<String>,
    }

    impl MockMailbox {
        fn with_messages(messages: Vec<RawMessage>) -> Self {
            Self {
                messages,
                auth_expired: false,
                broken_ids: HashSet::new(),
            }
        }
    }

    #[async_trait]
    impl MailProvider for MockMailbox {
        fn provider_name(&self) -> &str {
            "mock"
        }

        async fn list_messages(
            &self,
            _query: &str,
            max_results: u32,
        ) -> Result<Vec<MessageRef>, MailError> {
            if self.auth_expired {
                return Err(MailError::AuthExpired {
                    provider: "mock".into(),
                });
            }
            Ok(self
                .messages
                .iter()
                .take(max_results as usize)
                .map(|m| MessageRef {
                    id: m.id.clone(),
                    thread_id: m.thread_id.clone(),
                })
                .collect())
        }

        async fn get_message(&self, id: &str) -> Result<RawMessage, MailError> {
            if self.broken_ids.contains(id) {
                return Err(MailError::RequestFailed {
                    provider: "mock".into(),
                    reason: "detail fetch exploded".into(),
                });
            }
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| MailError::RequestFailed {
                    provider: "mock".into(),
                    reason: format!("no such message {id}"),
                })
        }

        async fn send_reply(&self, _reply: &OutgoingReply) -> Result<String, MailError> {
            Ok("sent_1".into())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn make_message(id: &str, from: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.into(),
            thread_id: Some(format!("t-{id}")),
            snippet: body.chars().take(40).collect(),
            internal_date: Some("1724407200000".into()),
            payload: Some(MessagePayload {
                mime_type: Some("text/plain".into()),
                headers: vec![Header::new("From", from), Header::new("Subject", subject)],
                body: Some(PartBody {
                    data: Some(URL_SAFE_NO_PAD.encode(body.as_bytes())),
                    size: Some(body.len() as u64),
                }),
                parts: vec![],
            }),
        }
    }

    fn hot_response() -> String {
        r#"{"isLead": true, "classification": "hot", "confidence": 92, "reasoning": "Budget and timeline stated"}"#
            .to_string()
    }

    async fn make_ingestor(mailbox: MockMailbox, llm_response: String) -> Ingestor {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let llm = Arc::new(MockLlm {
            response: llm_response,
        });
        let classifier = Classifier::new(llm, store.clone(), 50);
        Ingestor::new(
            Arc::new(mailbox),
            classifier,
            store,
            PipelineConfig::default(),
        )
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn ingest_stores_classified_leads() {
        let mailbox = MockMailbox::with_messages(vec![
            make_message("m1", "jane@acmecorp.com", "Need a quote", "Budget is $5000"),
            make_message("m2", "bob@widgets.io", "Project inquiry", "Can you help?"),
        ]);
        let ingestor = make_ingestor(mailbox, hot_response()).await;

        let report = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(report.listed, 2);
        assert_eq!(report.stored, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.unclassified, 0);
        assert!(report.leads.iter().all(|l| l.status == LeadStatus::Hot));

        let stored = ingestor.store.list_leads("u1").await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn ingest_skips_already_known_messages() {
        let mailbox = MockMailbox::with_messages(vec![make_message(
            "m1",
            "jane@acmecorp.com",
            "Need a quote",
            "Budget is $5000",
        )]);
        let ingestor = make_ingestor(mailbox, hot_response()).await;

        let first = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(first.stored, 1);

        let second = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(second.listed, 1);
        assert_eq!(second.known, 1);
        assert_eq!(second.stored, 0);
        assert_eq!(second.fetched, 0, "known ids must not be re-fetched");
    }

    #[tokio::test]
    async fn reingest_preserves_existing_status() {
        let mailbox = MockMailbox::with_messages(vec![make_message(
            "m1",
            "jane@acmecorp.com",
            "Need a quote",
            "Budget is $5000",
        )]);
        let ingestor = make_ingestor(mailbox, hot_response()).await;

        let report = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        let lead_id = report.leads[0].id;
        ingestor
            .store
            .override_status("u1", lead_id, LeadStatus::Cold)
            .await
            .unwrap();

        ingestor.ingest(&Actor::session("u1")).await.unwrap();
        let lead = ingestor.store.get_lead("u1", lead_id).await.unwrap();
        assert_eq!(lead.status, LeadStatus::Cold);
    }

    #[tokio::test]
    async fn ingest_skips_automated_senders() {
        let mailbox = MockMailbox::with_messages(vec![
            make_message("m1", "noreply@em.sendgrid.net", "Your receipt", "Thanks!"),
            make_message("m2", "jane@acmecorp.com", "Need a quote", "Budget is $5000"),
        ]);
        let ingestor = make_ingestor(mailbox, hot_response()).await;

        let report = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.leads[0].sender_email, "jane@acmecorp.com");
    }

    #[tokio::test]
    async fn ingest_survives_per_message_fetch_failures() {
        let mut mailbox = MockMailbox::with_messages(vec![
            make_message("m1", "jane@acmecorp.com", "Need a quote", "Budget is $5000"),
            make_message("m2", "bob@widgets.io", "Project inquiry", "Can you help?"),
        ]);
        mailbox.broken_ids.insert("m1".into());
        let ingestor = make_ingestor(mailbox, hot_response()).await;

        let report = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.leads[0].provider_message_id, "m2");
    }

    #[tokio::test]
    async fn ingest_aborts_on_expired_auth() {
        let mut mailbox = MockMailbox::with_messages(vec![]);
        mailbox.auth_expired = true;
        let ingestor = make_ingestor(mailbox, hot_response()).await;

        let err = ingestor.ingest(&Actor::session("u1")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Mail(MailError::AuthExpired { .. })
        ));
    }

    #[tokio::test]
    async fn degraded_classification_still_stores_the_lead() {
        let mailbox = MockMailbox::with_messages(vec![make_message(
            "m1",
            "jane@acmecorp.com",
            "Need a quote",
            "Budget is $5000",
        )]);
        let ingestor = make_ingestor(mailbox, "not json at all".into()).await;

        let report = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.unclassified, 1);
        assert_eq!(report.leads[0].status, LeadStatus::Unclassified);
    }

    #[tokio::test]
    async fn concurrent_ingest_for_same_user_is_refused() {
        let ingestor = make_ingestor(MockMailbox::with_messages(vec![]), hot_response()).await;

        ingestor.in_flight.lock().unwrap().insert("u1".to_string());
        let err = ingestor.ingest(&Actor::session("u1")).await.unwrap_err();
        assert!(matches!(err, PipelineError::IngestInProgress { user_id } if user_id == "u1"));

        // A different user is unaffected.
        ingestor.ingest(&Actor::session("u2")).await.unwrap();
    }

    #[tokio::test]
    async fn detail_budget_caps_fetches_per_run() {
        let messages: Vec<RawMessage> = (0..15)
            .map(|i| {
                make_message(
                    &format!("m{i}"),
                    &format!("sender{i}@corp.com"),
                    "Quote please",
                    "Interested in your services",
                )
            })
            .collect();
        let ingestor = make_ingestor(MockMailbox::with_messages(messages), hot_response()).await;

        let report = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(report.listed, 15);
        // PipelineConfig::default() allows ten detail fetches per pass.
        assert_eq!(report.stored, 10);

        let rest = ingestor.ingest(&Actor::session("u1")).await.unwrap();
        assert_eq!(rest.known, 10);
        assert_eq!(rest.stored, 5);
    }
}
