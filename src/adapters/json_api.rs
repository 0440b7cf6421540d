//! JSON API adapter.
//!
//! Covers first-party APIs and the endpoints our scraping workers publish
//! their results to. Expects a JSON array of event objects, either bare or
//! under an `events` key, and passes `updated_since` when a cursor exists.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::adapters::{normalize_payload, AdapterError, SourceAdapter};
use crate::models::{NormalizedEvent, RawRecord};
use crate::normalize::CityMatcher;

pub struct JsonApiAdapter {
    client: reqwest::Client,
    endpoint: String,
    matcher: Arc<CityMatcher>,
}

impl JsonApiAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, matcher: Arc<CityMatcher>) -> Self {
        Self {
            client,
            endpoint,
            matcher,
        }
    }

    fn record_from(&self, item: &JsonValue, fetched_at: DateTime<Utc>) -> RawRecord {
        let external_id = item
            .get("external_id")
            .or_else(|| item.get("id"))
            .and_then(|v| match v {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            });
        let source_url = item
            .get("source_url")
            .or_else(|| item.get("url"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        RawRecord {
            external_id,
            source_url,
            payload: item.clone(),
            fetched_at,
        }
    }
}

#[async_trait]
impl SourceAdapter for JsonApiAdapter {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>, AdapterError> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(since) = since {
            request = request.query(&[("updated_since", since.to_rfc3339())]);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                AdapterError::Timeout(format!("{}: {err}", self.endpoint))
            } else {
                AdapterError::Unavailable(format!("{}: {err}", self.endpoint))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(AdapterError::RateLimited {
                message: format!("{} returned 429", self.endpoint),
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(AdapterError::Unavailable(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|err| AdapterError::Parse(format!("{}: {err}", self.endpoint)))?;

        let items = body
            .as_array()
            .cloned()
            .or_else(|| body.get("events").and_then(|v| v.as_array()).cloned())
            .ok_or_else(|| {
                AdapterError::Parse(format!("{}: expected a JSON array of events", self.endpoint))
            })?;

        let fetched_at = Utc::now();
        debug!(endpoint = %self.endpoint, count = items.len(), "fetched records");
        Ok(items
            .iter()
            .map(|item| self.record_from(item, fetched_at))
            .collect())
    }

    fn normalize(&self, record: &RawRecord) -> Result<NormalizedEvent, AdapterError> {
        normalize_payload(&record.payload, &self.matcher)
    }
}
