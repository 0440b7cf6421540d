//! # Error Handling
//!
//! Unified error types for the ingestion pipeline, the repository layer, the
//! search projection, and the admin API surface. The pipeline error taxonomy
//! drives the orchestrator's retry policy: retriable errors back off and
//! retry, record-scoped errors skip the offending record, fatal errors abort
//! the current run without advancing source cursors.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Classification of everything that can go wrong during an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorKind {
    /// A source did not answer within its deadline.
    NetworkTimeout,
    /// A source asked us to slow down.
    RateLimited,
    /// A source is down; retry at the next scheduled run.
    SourceUnavailable,
    /// A record could not be parsed from its payload.
    Parse,
    /// A record was parseable but violates the import contract.
    Validation,
    /// A record references a city the matcher could not resolve.
    UnknownCity,
    /// The merge transaction hit a conflicting concurrent mutation.
    MergeConflict,
    /// The authoritative store failed.
    Database,
    /// The search engine rejected a projection update.
    SearchIndex,
}

impl IngestErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            IngestErrorKind::NetworkTimeout => "network_timeout",
            IngestErrorKind::RateLimited => "rate_limited",
            IngestErrorKind::SourceUnavailable => "source_unavailable",
            IngestErrorKind::Parse => "parse_error",
            IngestErrorKind::Validation => "validation_error",
            IngestErrorKind::UnknownCity => "unknown_city",
            IngestErrorKind::MergeConflict => "conflict_on_merge",
            IngestErrorKind::Database => "database_error",
            IngestErrorKind::SearchIndex => "search_index_error",
        }
    }
}

/// An error raised somewhere along the ingestion path.
#[derive(Debug, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct IngestError {
    pub kind: IngestErrorKind,
    pub message: String,
    /// Server-provided retry delay in seconds, when the source sent one.
    pub retry_after: Option<u64>,
}

impl IngestError {
    pub fn new<S: Into<String>>(kind: IngestErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Retriable errors back off exponentially within the current run.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            IngestErrorKind::NetworkTimeout
                | IngestErrorKind::RateLimited
                | IngestErrorKind::SourceUnavailable
        )
    }

    /// Record-scoped errors skip the record and continue the source run.
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self.kind,
            IngestErrorKind::Parse
                | IngestErrorKind::Validation
                | IngestErrorKind::UnknownCity
                | IngestErrorKind::MergeConflict
        )
    }

    /// Fatal errors abort the run and leave all cursors untouched.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, IngestErrorKind::Database)
    }
}

impl From<sea_orm::DbErr> for IngestError {
    fn from(err: sea_orm::DbErr) -> Self {
        IngestError::new(IngestErrorKind::Database, err.to_string())
    }
}

impl From<RepositoryError> for IngestError {
    fn from(err: RepositoryError) -> Self {
        IngestError::new(IngestErrorKind::Database, err.to_string())
    }
}

impl From<SearchError> for IngestError {
    fn from(err: SearchError) -> Self {
        IngestError::new(IngestErrorKind::SearchIndex, err.to_string())
    }
}

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl RepositoryError {
    pub fn not_found<S: ToString>(entity: &'static str, id: S) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Errors from the search engine client.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search engine returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("search document encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SearchError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        SearchError::Status {
            status,
            body: body.into(),
        }
    }

    /// Missing-document deletes are tolerated everywhere.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SearchError::Status { status: 404, .. })
    }
}

/// Problem+json error response for the admin API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Authentication required",
        )
    }

    pub fn internal(message: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );
        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::RecordNotFound(what) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), what)
            }
            other => ApiError::internal(&other.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { .. } => ApiError::not_found(&err.to_string()),
            RepositoryError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification_matches_policy_table() {
        for kind in [
            IngestErrorKind::NetworkTimeout,
            IngestErrorKind::RateLimited,
            IngestErrorKind::SourceUnavailable,
        ] {
            assert!(IngestError::new(kind, "x").is_retriable());
        }
        for kind in [
            IngestErrorKind::Parse,
            IngestErrorKind::Validation,
            IngestErrorKind::UnknownCity,
            IngestErrorKind::MergeConflict,
        ] {
            let err = IngestError::new(kind, "x");
            assert!(err.is_record_scoped());
            assert!(!err.is_retriable());
        }
        assert!(IngestError::new(IngestErrorKind::Database, "x").is_fatal());
        assert!(!IngestError::new(IngestErrorKind::SearchIndex, "x").is_fatal());
    }

    #[test]
    fn retry_after_is_carried() {
        let err = IngestError::new(IngestErrorKind::RateLimited, "slow down").with_retry_after(17);
        assert_eq!(err.retry_after, Some(17));
    }

    #[test]
    fn search_not_found_is_tolerated() {
        assert!(SearchError::status(404, "missing").is_not_found());
        assert!(!SearchError::status(500, "boom").is_not_found());
    }

    #[test]
    fn api_error_sets_problem_json_content_type() {
        let response = ApiError::validation("bad input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }
}
