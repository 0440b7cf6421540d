//! Manual import intake.
//!
//! Validates a manually entered payload (CSV/JSON uploads land here after
//! the admin UI converts them) and stages each valid record as a candidate
//! under a manual source. Invalid records are rejected individually with
//! their error; the rest proceed.

use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use utoipa::ToSchema;

use crate::adapters::{normalize_payload, AdapterError};
use crate::error::IngestError;
use crate::models::RawRecord;
use crate::repositories::{CandidateRepository, ReferenceRepository, SourceRepository};

/// The `source` block of a manual import payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualSourceSpec {
    #[serde(rename = "type", default)]
    pub source_type: Option<String>,
    pub name: String,
    pub reliability: f64,
}

/// A manual import request: a source block plus raw event objects.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualImportPayload {
    pub source: ManualSourceSpec,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<JsonValue>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RejectedRecord {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportOutcome {
    pub source_id: i32,
    pub accepted: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Validate and stage a manual import. Staged candidates wait for the
/// hourly manual-queue pass (or an explicit pipeline trigger).
pub async fn stage_manual_import(
    db: &DatabaseConnection,
    payload: &ManualImportPayload,
) -> Result<ImportOutcome, IngestError> {
    let matcher = ReferenceRepository::load_city_matcher(db).await?;
    let source =
        SourceRepository::find_or_create_manual(db, &payload.source.name, payload.source.reliability)
            .await?;

    let mut accepted = 0usize;
    let mut rejected = Vec::new();

    for (index, event) in payload.events.iter().enumerate() {
        let source_url = event
            .get("source_url")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if source_url.is_none() {
            rejected.push(RejectedRecord {
                index,
                error: AdapterError::Validation("missing source_url".to_string()).to_string(),
            });
            continue;
        }

        // An unmatched city is not a rejection: the candidate is retained
        // with a null city and surfaces in the review queue instead.
        let normalized = match normalize_payload(event, &matcher) {
            Ok(normalized) => normalized,
            Err(err) => {
                rejected.push(RejectedRecord {
                    index,
                    error: err.to_string(),
                });
                continue;
            }
        };

        let record = RawRecord {
            external_id: event
                .get("external_id")
                .or_else(|| event.get("id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            source_url: source_url.map(str::to_string),
            payload: event.clone(),
            fetched_at: Utc::now(),
        };

        CandidateRepository::insert(db, source.id, &record, &normalized).await?;
        accepted += 1;
    }

    info!(
        source = %payload.source.name,
        accepted,
        rejected = rejected.len(),
        "staged manual import"
    );
    Ok(ImportOutcome {
        source_id: source.id,
        accepted,
        rejected,
    })
}
