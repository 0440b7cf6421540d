//! Source adapter trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::{IngestError, IngestErrorKind};
use crate::models::{NormalizedEvent, RawRecord};

/// Errors an adapter can raise, classified for the orchestrator's retry
/// policy.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-provided Retry-After in seconds, when present.
        retry_after: Option<u64>,
    },
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("payload parse failure: {0}")]
    Parse(String),
    #[error("record validation failure: {0}")]
    Validation(String),
}

impl From<AdapterError> for IngestError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout(message) => {
                IngestError::new(IngestErrorKind::NetworkTimeout, message)
            }
            AdapterError::RateLimited {
                message,
                retry_after,
            } => {
                let ingest = IngestError::new(IngestErrorKind::RateLimited, message);
                match retry_after {
                    Some(seconds) => ingest.with_retry_after(seconds),
                    None => ingest,
                }
            }
            AdapterError::Unavailable(message) => {
                IngestError::new(IngestErrorKind::SourceUnavailable, message)
            }
            AdapterError::Parse(message) => IngestError::new(IngestErrorKind::Parse, message),
            AdapterError::Validation(message) => {
                IngestError::new(IngestErrorKind::Validation, message)
            }
        }
    }
}

/// Uniform interface over every source type.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch records changed since the cursor, in upstream order.
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>, AdapterError>;

    /// Normalize one raw record into a candidate. Must be deterministic:
    /// the same payload always yields the same candidate.
    fn normalize(&self, record: &RawRecord) -> Result<NormalizedEvent, AdapterError>;
}
