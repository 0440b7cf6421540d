//! Admin interface handlers.
//!
//! The small command surface the review UI consumes: health, run triggers,
//! manual imports, the review queue, and the six editorial commands. Every
//! mutating route authenticates against the admin allowlist.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::editorial::EditorialError;
use crate::error::ApiError;
use crate::import::{ImportOutcome, ManualImportPayload};
use crate::repositories::CandidateRepository;
use crate::server::AppState;

/// Basic service information.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub database: bool,
    pub search: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunAccepted {
    pub run_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub flag: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PinRequest {
    pub flag: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignificanceRequest {
    pub score: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: String,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ArchiveRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<EditorialError> for ApiError {
    fn from(err: EditorialError) -> Self {
        match err {
            EditorialError::EventNotFound(_) => ApiError::not_found(&err.to_string()),
            EditorialError::InvalidSignificance(_)
            | EditorialError::InvalidStatus(_)
            | EditorialError::SelfMerge => ApiError::validation(&err.to_string()),
            EditorialError::Repository(inner) => inner.into(),
            EditorialError::Database(inner) => inner.into(),
        }
    }
}

/// RFC 7617 Basic credentials parsing.
fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    use base64::Engine;

    let encoded = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Authenticate a request against the admin allowlist and password hash.
/// Returns the acting username for the audit log.
fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<String, ApiError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;

    let (username, password) = decode_basic_auth(header).ok_or_else(ApiError::unauthorized)?;

    if !state.config.admin.allowlist.iter().any(|u| u == &username) {
        return Err(ApiError::unauthorized());
    }

    let digest = hex::encode(Sha256::digest(password.as_bytes()));
    if !state.config.admin.password_hash.eq_ignore_ascii_case(&digest) {
        return Err(ApiError::unauthorized());
    }

    Ok(username)
}

/// Root: service identification.
#[utoipa::path(get, path = "/", responses((status = 200, body = ServiceInfo)))]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health of the store and the search daemon.
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = crate::db::health_check(&state.db).await.is_ok();
    let search = state
        .search
        .engine()
        .health()
        .await
        .unwrap_or(false);
    Json(HealthResponse { database, search })
}

/// Trigger an ingestion run in the background.
#[utoipa::path(post, path = "/runs", responses((status = 202, body = RunAccepted)))]
pub async fn trigger_run(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let actor = authenticate(&headers, &state)?;
    let trigger_id = Uuid::new_v4();
    info!(%actor, %trigger_id, "manual ingestion run triggered");

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        if let Err(err) = orchestrator.run(&cancel).await {
            error!(%trigger_id, error = %err, "triggered run failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(RunAccepted { run_id: trigger_id })))
}

/// Stage a manual import payload.
#[utoipa::path(post, path = "/import", request_body = ManualImportPayload,
    responses((status = 200, body = ImportOutcome)))]
pub async fn import(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(payload): Json<ManualImportPayload>,
) -> Result<Json<ImportOutcome>, ApiError> {
    let actor = authenticate(&headers, &state)?;
    if !(0.0..=1.0).contains(&payload.source.reliability) {
        return Err(ApiError::validation("source reliability must be within [0, 1]"));
    }
    info!(%actor, source = %payload.source.name, events = payload.events.len(), "manual import");

    let outcome = crate::import::stage_manual_import(&state.db, &payload)
        .await
        .map_err(|err| ApiError::internal(&err.to_string()))?;
    Ok(Json(outcome))
}

/// Candidates waiting for a human decision.
#[utoipa::path(get, path = "/review", responses((status = 200)))]
pub async fn review_queue(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authenticate(&headers, &state)?;
    let pending = CandidateRepository::list_review_pending(&state.db).await?;
    let items: Vec<serde_json::Value> = pending
        .into_iter()
        .map(|candidate| {
            json!({
                "id": candidate.id,
                "source_id": candidate.source_id,
                "external_id": candidate.external_id,
                "source_url": candidate.source_url,
                "matched_event_id": candidate.matched_event_id,
                "match_confidence": candidate.match_confidence,
                "normalized": candidate.normalized,
                "ingested_at": candidate.ingested_at,
            })
        })
        .collect();
    Ok(Json(json!({ "pending": items })))
}

/// Set or clear the verified flag.
#[utoipa::path(post, path = "/events/{id}/verify", request_body = VerifyRequest,
    responses((status = 204)))]
pub async fn verify(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<VerifyRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&headers, &state)?;
    state
        .editorial
        .verify(&actor, id, request.flag, request.notes)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set or clear the pinned flag.
#[utoipa::path(post, path = "/events/{id}/pin", request_body = PinRequest,
    responses((status = 204)))]
pub async fn pin(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<PinRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&headers, &state)?;
    state
        .editorial
        .pin(&actor, id, request.flag, request.reason)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set the cultural significance score.
#[utoipa::path(post, path = "/events/{id}/significance", request_body = SignificanceRequest,
    responses((status = 204)))]
pub async fn set_significance(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<SignificanceRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&headers, &state)?;
    state
        .editorial
        .set_significance(&actor, id, request.score)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Transition lifecycle status.
#[utoipa::path(post, path = "/events/{id}/status", request_body = StatusRequest,
    responses((status = 204)))]
pub async fn update_status(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<StatusRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&headers, &state)?;
    state
        .editorial
        .update_status(&actor, id, &request.status, request.source_url)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Merge the losing event into the keeper.
#[utoipa::path(post, path = "/events/{keep_id}/merge/{lose_id}", responses((status = 204)))]
pub async fn merge(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((keep_id, lose_id)): Path<(i32, i32)>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&headers, &state)?;
    state.editorial.merge(&actor, keep_id, lose_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Archive an event.
#[utoipa::path(post, path = "/events/{id}/archive", request_body = ArchiveRequest,
    responses((status = 204)))]
pub async fn archive(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<ArchiveRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&headers, &state)?;
    state.editorial.archive(&actor, id, request.reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::decode_basic_auth;

    #[test]
    fn basic_auth_round_trip() {
        // "amina:s3cret" in RFC 7617 form.
        let header = "Basic YW1pbmE6czNjcmV0";
        let (user, pass) = decode_basic_auth(header).unwrap();
        assert_eq!(user, "amina");
        assert_eq!(pass, "s3cret");
    }

    #[test]
    fn malformed_basic_auth_is_rejected() {
        assert!(decode_basic_auth("Bearer token").is_none());
        assert!(decode_basic_auth("Basic !!!").is_none());
        assert!(decode_basic_auth("Basic YW1pbmE=").is_none()); // no colon
    }
}
