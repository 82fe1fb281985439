//! Integration tests for the REST API.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory store, a stub mailbox, and a stub LLM, then exercises the
//! real HTTP contract through reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use leadwise::api::{AppState, api_routes};
use leadwise::config::PipelineConfig;
use leadwise::error::{LlmError, MailError};
use leadwise::leads::model::Lead;
use leadwise::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use leadwise::mail::types::{Header, MessagePayload, MessageRef, PartBody, RawMessage};
use leadwise::mail::{MailProvider, OutgoingReply};
use leadwise::pipeline::{Classifier, Ingestor};
use leadwise::reply::ReplyGenerator;
use leadwise::store::{LeadStore, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const SERVICE_KEY: &str = "test-service-key";

const HOT_VERDICT: &str = r#"{"isLead": true, "classification": "hot", "confidence": 92, "reasoning": "Budget and timeline stated"}"#;

/// Stub LLM provider for integration tests (no real API calls).
struct StubLlm {
    response: String,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: self.response.clone(),
            input_tokens: 100,
            output_tokens: 50,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// Stub mail provider: serves seeded messages, records sent replies.
struct StubMailbox {
    messages: Vec<RawMessage>,
    sent: Mutex<Vec<OutgoingReply>>,
}

impl StubMailbox {
    fn empty() -> Self {
        Self::with_messages(Vec::new())
    }

    fn with_messages(messages: Vec<RawMessage>) -> Self {
        Self {
            messages,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MailProvider for StubMailbox {
    fn provider_name(&self) -> &str {
        "stub"
    }

    async fn list_messages(
        &self,
        _query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
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
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MailError::RequestFailed {
                provider: "stub".into(),
                reason: format!("no such message {id}"),
            })
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<String, MailError> {
        self.sent.lock().unwrap().push(reply.clone());
        Ok("sent_1".to_string())
    }
}

/// Start the API on a random port. Returns the port plus handles to the
/// store and mailbox for seeding and inspection.
async fn start_server(
    mailbox: StubMailbox,
    llm_response: &str,
) -> (u16, Arc<dyn LeadStore>, Arc<StubMailbox>) {
    let store: Arc<dyn LeadStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let outbox = Arc::new(mailbox);
    let provider: Arc<dyn MailProvider> = outbox.clone();
    let llm: Arc<dyn LlmProvider> = Arc::new(StubLlm {
        response: llm_response.to_string(),
    });
    let pipeline = PipelineConfig::default();

    let classifier = Classifier::new(llm.clone(), Arc::clone(&store), pipeline.confidence_floor);
    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&provider),
        classifier,
        Arc::clone(&store),
        pipeline.clone(),
    ));
    let replies = Arc::new(ReplyGenerator::new(llm, Arc::clone(&store)));

    let app = api_routes(AppState {
        store: Arc::clone(&store),
        provider,
        ingestor,
        replies,
        pipeline,
        service_key: Some(SecretString::from(SERVICE_KEY)),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, store, outbox)
}

fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

/// Helper: build a raw provider message with a base64url body.
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

/// Helper: seed one lead for `u1` directly into the store.
async fn seed_lead(store: &Arc<dyn LeadStore>, subject: &str, snippet: &str) -> Lead {
    let lead = Lead::new(
        "u1",
        format!("m-{}", uuid::Uuid::new_v4()),
        "jane@acmecorp.com",
        subject,
        snippet,
        Utc::now() - chrono::Duration::minutes(30),
    );
    store.upsert_lead(&lead).await.unwrap();
    lead
}

// ── Health and identity ──────────────────────────────────────────────

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (port, _store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;

        let resp = reqwest::get(url(port, "/health")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "leadwise");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_identity_headers_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (port, _store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;

        let resp = reqwest::get(url(port, "/api/leads")).await.unwrap();
        assert_eq!(resp.status(), 401);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn service_key_grants_scoped_access() {
    timeout(TEST_TIMEOUT, async {
        let (port, _store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let client = reqwest::Client::new();

        // Wrong key is refused.
        let resp = client
            .get(url(port, "/api/leads"))
            .header("x-service-key", "wrong")
            .header("x-user-id", "u1")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        // Right key without a target user is a bad request.
        let resp = client
            .get(url(port, "/api/leads"))
            .header("x-service-key", SERVICE_KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        // Right key plus user id works.
        let resp = client
            .get(url(port, "/api/leads"))
            .header("x-service-key", SERVICE_KEY)
            .header("x-user-id", "u1")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Vec<Value> = resp.json().await.unwrap();
        assert!(body.is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Ingestion ────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_stores_classified_leads() {
    timeout(TEST_TIMEOUT, async {
        let mailbox = StubMailbox::with_messages(vec![
            make_message(
                "m1",
                "Jane Doe <jane@acmecorp.com>",
                "Need a quote ASAP",
                "We have a $5000 budget for a website project. Can you send a proposal?",
            ),
            make_message("m2", "alerts@em1.sendgrid.net", "Your receipt", "Thanks!"),
        ]);
        let (port, _store, _outbox) = start_server(mailbox, HOT_VERDICT).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(url(port, "/api/ingest"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let report: Value = resp.json().await.unwrap();
        assert_eq!(report["listed"], 2);
        assert_eq!(report["fetched"], 2);
        assert_eq!(report["skipped"], 1, "bulk-relay sender must be dropped");
        assert_eq!(report["stored"], 1);
        assert_eq!(report["leads"][0]["status"], "hot");
        assert_eq!(report["leads"][0]["sender_email"], "jane@acmecorp.com");

        let resp = client
            .get(url(port, "/api/leads"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap();
        let leads: Vec<Value> = resp.json().await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0]["subject"], "Need a quote ASAP");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reingest_skips_known_messages() {
    timeout(TEST_TIMEOUT, async {
        let mailbox = StubMailbox::with_messages(vec![make_message(
            "m1",
            "jane@acmecorp.com",
            "Need a quote",
            "Budget is $5000",
        )]);
        let (port, _store, _outbox) = start_server(mailbox, HOT_VERDICT).await;
        let client = reqwest::Client::new();

        let first: Value = client
            .post(url(port, "/api/ingest"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(first["stored"], 1);

        let second: Value = client
            .post(url(port, "/api/ingest"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["known"], 1);
        assert_eq!(second["stored"], 0);
    })
    .await
    .expect("test timed out");
}

// ── Lead management ──────────────────────────────────────────────────

#[tokio::test]
async fn patch_updates_notes_and_status() {
    timeout(TEST_TIMEOUT, async {
        let (port, store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let lead = seed_lead(&store, "Need a quote", "budget question").await;
        let client = reqwest::Client::new();

        let resp = client
            .patch(url(port, &format!("/api/leads/{}", lead.id)))
            .header("x-session-user", "u1")
            .json(&json!({"notes": "called back", "status": "warm"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["notes"], "called back");
        assert_eq!(body["status"], "warm");

        // Unknown status names are rejected.
        let resp = client
            .patch(url(port, &format!("/api/leads/{}", lead.id)))
            .header("x-session-user", "u1")
            .json(&json!({"status": "scorching"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        // An empty patch has nothing to do.
        let resp = client
            .patch(url(port, &format!("/api/leads/{}", lead.id)))
            .header("x-session-user", "u1")
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bad_lead_ids_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (port, _store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let client = reqwest::Client::new();

        let resp = client
            .patch(url(port, "/api/leads/not-a-uuid"))
            .header("x-session-user", "u1")
            .json(&json!({"notes": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let missing = uuid::Uuid::new_v4();
        let resp = client
            .patch(url(port, &format!("/api/leads/{missing}")))
            .header("x-session-user", "u1")
            .json(&json!({"notes": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn delete_hides_lead_from_listing() {
    timeout(TEST_TIMEOUT, async {
        let (port, store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let lead = seed_lead(&store, "Need a quote", "budget question").await;
        let client = reqwest::Client::new();

        let resp = client
            .delete(url(port, &format!("/api/leads/{}", lead.id)))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "deleted");

        let leads: Vec<Value> = client
            .get(url(port, "/api/leads"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(leads.is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Scoring ──────────────────────────────────────────────────────────

#[tokio::test]
async fn scores_are_ordered_by_total() {
    timeout(TEST_TIMEOUT, async {
        let (port, store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let urgent = seed_lead(
            &store,
            "URGENT: need a quote ASAP",
            "We have a budget for this project, deadline next week",
        )
        .await;
        let bland = Lead::new(
            "u1",
            "m-bland",
            "bob@widgets.io",
            "Hello",
            "Just saying hi",
            Utc::now() - chrono::Duration::minutes(30),
        );
        store.upsert_lead(&bland).await.unwrap();
        let client = reqwest::Client::new();

        let scores: Vec<Value> = client
            .get(url(port, "/api/leads/scores"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0]["lead_id"], urgent.id.to_string());
        assert_eq!(scores[0]["total"], 100);
        assert_eq!(scores[0]["recommendation"], "respond immediately");
        assert_eq!(scores[1]["lead_id"], bland.id.to_string());
        assert_eq!(scores[1]["recommendation"], "respond within 2 hours");
    })
    .await
    .expect("test timed out");
}

// ── Reply drafting and sending ───────────────────────────────────────

#[tokio::test]
async fn draft_returns_text_and_records_usage() {
    timeout(TEST_TIMEOUT, async {
        let draft_text = "Thanks for reaching out! We'd be glad to help with your project.";
        let (port, store, _outbox) = start_server(StubMailbox::empty(), draft_text).await;
        let lead = seed_lead(&store, "Need a quote", "budget question").await;
        let client = reqwest::Client::new();

        let resp = client
            .post(url(port, &format!("/api/leads/{}/draft", lead.id)))
            .header("x-session-user", "u1")
            .json(&json!({"tone": "friendly", "length": "short"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["draft"], draft_text);

        let usage: Value = client
            .get(url(port, "/api/usage"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(usage["call_count"], 1);
        assert_eq!(usage["total_input_tokens"], 100);
        assert_eq!(usage["total_output_tokens"], 50);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn send_marks_lead_responded() {
    timeout(TEST_TIMEOUT, async {
        let (port, store, outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let lead = seed_lead(&store, "Need a quote", "budget question").await;
        let client = reqwest::Client::new();

        let resp = client
            .post(url(port, &format!("/api/leads/{}/send", lead.id)))
            .header("x-session-user", "u1")
            .json(&json!({"body": "Hi Jane, happy to help. I'll send a proposal today."}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["sent_message_id"], "sent_1");
        assert!(body["lead"]["responded_at"].is_string());
        assert_eq!(body["lead"]["response_time_minutes"], 30);

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@acmecorp.com");
        assert_eq!(sent[0].subject, "Re: Need a quote");
        drop(sent);

        let metrics: Value = client
            .get(url(port, "/api/analytics/response-times"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(metrics["total_leads"], 1);
        assert_eq!(metrics["responded_leads"], 1);
        assert_eq!(metrics["response_rate"], 1.0);
        assert_eq!(metrics["average_formatted"], "30m");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn send_rejects_empty_body() {
    timeout(TEST_TIMEOUT, async {
        let (port, store, outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let lead = seed_lead(&store, "Need a quote", "budget question").await;
        let client = reqwest::Client::new();

        let resp = client
            .post(url(port, &format!("/api/leads/{}/send", lead.id)))
            .header("x-session-user", "u1")
            .json(&json!({"body": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(outbox.sent.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Profile and insights ─────────────────────────────────────────────

#[tokio::test]
async fn profile_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let (port, _store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(url(port, "/api/profile"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .put(url(port, "/api/profile"))
            .header("x-session-user", "u1")
            .json(&json!({
                "business_context": {
                    "description": "Web studio. No projects under $2000.",
                    "services": ["Web design", "SEO"]
                },
                "writing_style": {
                    "preferred_tone": "friendly",
                    "signature": "Jane"
                }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let profile: Value = client
            .get(url(port, "/api/profile"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(profile["user_id"], "u1");
        assert_eq!(
            profile["business_context"]["description"],
            "Web studio. No projects under $2000."
        );
        assert_eq!(profile["writing_style"]["signature"], "Jane");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn insights_flag_unclassified_volume() {
    timeout(TEST_TIMEOUT, async {
        let (port, store, _outbox) = start_server(StubMailbox::empty(), HOT_VERDICT).await;
        // Three leads, none classified.
        for i in 0..3 {
            seed_lead(&store, &format!("Inquiry {i}"), "tell me more").await;
        }
        let client = reqwest::Client::new();

        let insights: Vec<Value> = client
            .get(url(port, "/api/analytics/insights"))
            .header("x-session-user", "u1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let risk = insights
            .iter()
            .find(|i| i["title"] == "High Unclassified Lead Volume")
            .expect("unclassified-volume risk should fire");
        assert_eq!(risk["kind"], "risk");
        assert_eq!(risk["confidence"], 95);
        assert_eq!(risk["impact"], "high");
    })
    .await
    .expect("test timed out");
}
