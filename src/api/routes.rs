//! REST endpoints for the lead pipeline.
//!
//! Every data route resolves an acting identity from headers first: either
//! a session user (`x-session-user`) or a service caller presenting the
//! shared key (`x-service-key` plus `x-user-id`). Handlers never touch the
//! store without one.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::analytics;
use crate::config::PipelineConfig;
use crate::error::{MailError, PipelineError, ReplyError, StoreError};
use crate::identity::Actor;
use crate::leads::model::{
    BusinessContext, LeadStatus, ReplyLength, ReplyTone, UserProfile, WritingStyle,
};
use crate::mail::{MailProvider, OutgoingReply};
use crate::pipeline::{Ingestor, scoring};
use crate::reply::ReplyGenerator;
use crate::store::LeadStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeadStore>,
    pub provider: Arc<dyn MailProvider>,
    pub ingestor: Arc<Ingestor>,
    pub replies: Arc<ReplyGenerator>,
    pub pipeline: PipelineConfig,
    /// Shared secret service callers must present. None disables service
    /// access entirely.
    pub service_key: Option<SecretString>,
}

/// Build the Axum router with all REST routes.
pub fn api_routes(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/ingest", post(run_ingest))
        .route("/api/leads", get(list_leads))
        .route("/api/leads/scores", get(list_scores))
        .route("/api/leads/{id}", patch(update_lead).delete(delete_lead))
        .route("/api/leads/{id}/draft", post(draft_reply))
        .route("/api/leads/{id}/send", post(send_reply))
        .route("/api/analytics/response-times", get(response_times))
        .route("/api/analytics/insights", get(insights))
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/usage", get(usage))
        .layer(cors)
        .with_state(state)
}

// ── Identity ────────────────────────────────────────────────────────

/// Resolve the acting identity from request headers.
fn resolve_actor(
    headers: &HeaderMap,
    service_key: Option<&SecretString>,
) -> Result<Actor, Response> {
    if let Some(presented) = headers.get("x-service-key") {
        let Some(expected) = service_key else {
            return Err(unauthorized("Service access is not configured"));
        };
        if presented.to_str().ok() != Some(expected.expose_secret()) {
            return Err(unauthorized("Invalid service key"));
        }
        let Some(user_id) = header_str(headers, "x-user-id") else {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "x-user-id header required for service calls"})),
            )
                .into_response());
        };
        return Ok(Actor::service(user_id));
    }

    if let Some(user_id) = header_str(headers, "x-session-user") {
        return Ok(Actor::session(user_id));
    }

    Err(unauthorized("Missing identity headers"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn store_error(e: StoreError) -> Response {
    match &e {
        StoreError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
        _ => {
            error!("Store failure: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "storage failure"})),
            )
                .into_response()
        }
    }
}

fn parse_lead_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid lead ID"})),
        )
            .into_response()
    })
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "leadwise"
    }))
}

// ── Ingestion ───────────────────────────────────────────────────────

async fn run_ingest(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.ingestor.ingest(&actor).await {
        Ok(report) => {
            info!(
                "Ingest via API for {}: {} stored",
                actor.user_id(),
                report.stored
            );
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(PipelineError::IngestInProgress { user_id }) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": format!("Ingestion already running for user {user_id}")
            })),
        )
            .into_response(),
        Err(PipelineError::Mail(MailError::AuthExpired { provider })) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": format!("{provider} authorization expired"),
                "reauth_required": true
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Ingest failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

// ── Leads ───────────────────────────────────────────────────────────

async fn list_leads(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.store.list_leads(actor.user_id()).await {
        Ok(leads) => Json(leads).into_response(),
        Err(e) => store_error(e),
    }
}

async fn list_scores(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.store.list_leads(actor.user_id()).await {
        Ok(leads) => Json(scoring::score_all(&leads, &state.pipeline)).into_response(),
        Err(e) => store_error(e),
    }
}

/// Manual edits to one lead. An empty `notes` string clears the notes.
#[derive(Debug, Deserialize)]
struct UpdateLeadRequest {
    notes: Option<String>,
    status: Option<String>,
}

async fn update_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateLeadRequest>,
) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };
    let lead_id = match parse_lead_id(&id) {
        Ok(lead_id) => lead_id,
        Err(resp) => return resp,
    };

    if body.notes.is_none() && body.status.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Nothing to update"})),
        )
            .into_response();
    }

    if let Some(ref notes) = body.notes {
        let trimmed = notes.trim();
        let value = if trimmed.is_empty() { None } else { Some(trimmed) };
        if let Err(e) = state.store.update_notes(actor.user_id(), lead_id, value).await {
            return store_error(e);
        }
    }

    if let Some(ref status) = body.status {
        let parsed: LeadStatus = match status.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": format!("Unknown status: {status}")})),
                )
                    .into_response();
            }
        };
        if let Err(e) = state
            .store
            .override_status(actor.user_id(), lead_id, parsed)
            .await
        {
            return store_error(e);
        }
    }

    match state.store.get_lead(actor.user_id(), lead_id).await {
        Ok(lead) => Json(lead).into_response(),
        Err(e) => store_error(e),
    }
}

async fn delete_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };
    let lead_id = match parse_lead_id(&id) {
        Ok(lead_id) => lead_id,
        Err(resp) => return resp,
    };

    match state.store.soft_delete_lead(actor.user_id(), lead_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted"})),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

// ── Replies ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct DraftRequest {
    tone: Option<ReplyTone>,
    length: Option<ReplyLength>,
    /// Earlier replies the draft may borrow voice from.
    #[serde(default)]
    prior_replies: Vec<String>,
}

async fn draft_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DraftRequest>,
) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };
    let lead_id = match parse_lead_id(&id) {
        Ok(lead_id) => lead_id,
        Err(resp) => return resp,
    };

    let lead = match state.store.get_lead(actor.user_id(), lead_id).await {
        Ok(lead) => lead,
        Err(e) => return store_error(e),
    };
    let profile = match state.store.get_profile(actor.user_id()).await {
        Ok(profile) => profile.unwrap_or_default(),
        Err(e) => return store_error(e),
    };

    match state
        .replies
        .generate(
            &lead,
            body.tone,
            body.length,
            &profile.business_context,
            &profile.writing_style,
            &body.prior_replies,
        )
        .await
    {
        Ok(draft) => Json(serde_json::json!({"draft": draft})).into_response(),
        Err(ReplyError::GenerationFailed { reason }) => {
            error!("Draft for lead {lead_id} failed: {reason}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": reason})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendReplyRequest {
    body: String,
}

async fn send_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SendReplyRequest>,
) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };
    let lead_id = match parse_lead_id(&id) {
        Ok(lead_id) => lead_id,
        Err(resp) => return resp,
    };

    let text = body.body.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Reply body is empty"})),
        )
            .into_response();
    }

    let lead = match state.store.get_lead(actor.user_id(), lead_id).await {
        Ok(lead) => lead,
        Err(e) => return store_error(e),
    };

    let outgoing = OutgoingReply {
        to: lead.sender_email.clone(),
        subject: reply_subject(&lead.subject),
        body: text.to_string(),
        thread_id: None,
    };

    let sent_id = match state.provider.send_reply(&outgoing).await {
        Ok(sent_id) => sent_id,
        Err(MailError::AuthExpired { provider }) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": format!("{provider} authorization expired"),
                    "reauth_required": true
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!("Send for lead {lead_id} failed: {e}");
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    match state
        .store
        .mark_responded(actor.user_id(), lead_id, Utc::now())
        .await
    {
        Ok(lead) => {
            info!("Reply sent for lead {lead_id}");
            Json(serde_json::json!({"sent_message_id": sent_id, "lead": lead})).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// Prefix `Re:` unless the subject already carries one.
fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        "Re: your inquiry".to_string()
    } else if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

// ── Analytics ───────────────────────────────────────────────────────

async fn response_times(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.store.list_leads(actor.user_id()).await {
        Ok(leads) => Json(analytics::response_metrics(
            &leads,
            state.pipeline.utc_offset_hours,
        ))
        .into_response(),
        Err(e) => store_error(e),
    }
}

async fn insights(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.store.list_leads(actor.user_id()).await {
        Ok(leads) => Json(analytics::generate_insights(
            &leads,
            Utc::now(),
            state.pipeline.utc_offset_hours,
        ))
        .into_response(),
        Err(e) => store_error(e),
    }
}

// ── Profile and usage ───────────────────────────────────────────────

async fn get_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.store.get_profile(actor.user_id()).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No profile saved yet"})),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProfileRequest {
    #[serde(default)]
    business_context: BusinessContext,
    #[serde(default)]
    writing_style: WritingStyle,
}

async fn put_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ProfileRequest>,
) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    let profile = UserProfile {
        user_id: actor.user_id().to_string(),
        business_context: body.business_context,
        writing_style: body.writing_style,
    };
    match state.store.save_profile(&profile).await {
        Ok(()) => Json(profile).into_response(),
        Err(e) => store_error(e),
    }
}

async fn usage(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers, state.service_key.as_ref()) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.store.usage_summary(actor.user_id()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => store_error(e),
    }
}
