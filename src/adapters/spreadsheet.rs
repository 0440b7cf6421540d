//! Spreadsheet dump adapter.
//!
//! Spreadsheet rows arrive as untyped string maps (the export endpoint
//! serializes each row as a JSON object of cell strings). Rows carry an
//! optional `approved` cell using loose boolean literals; unapproved rows
//! are rejected per-record rather than silently dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::adapters::{normalize_payload, AdapterError, SourceAdapter};
use crate::models::{NormalizedEvent, RawRecord};
use crate::normalize::{parse_flexible_bool, CityMatcher};

pub struct SpreadsheetAdapter {
    client: reqwest::Client,
    endpoint: String,
    matcher: Arc<CityMatcher>,
}

impl SpreadsheetAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, matcher: Arc<CityMatcher>) -> Self {
        Self {
            client,
            endpoint,
            matcher,
        }
    }
}

#[async_trait]
impl SourceAdapter for SpreadsheetAdapter {
    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>, AdapterError> {
        // Spreadsheet exports have no server-side cursor; each run reads the
        // full sheet and dedup happens downstream.
        let response = self.client.get(&self.endpoint).send().await.map_err(|err| {
            if err.is_timeout() {
                AdapterError::Timeout(format!("{}: {err}", self.endpoint))
            } else {
                AdapterError::Unavailable(format!("{}: {err}", self.endpoint))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Unavailable(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        let rows: Vec<JsonValue> = response
            .json()
            .await
            .map_err(|err| AdapterError::Parse(format!("{}: {err}", self.endpoint)))?;

        let fetched_at = Utc::now();
        debug!(endpoint = %self.endpoint, rows = rows.len(), "fetched spreadsheet rows");
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, payload)| RawRecord {
                external_id: payload
                    .get("external_id")
                    .or_else(|| payload.get("id"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or(Some(format!("row-{index}"))),
                source_url: payload
                    .get("source_url")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                payload,
                fetched_at,
            })
            .collect())
    }

    fn normalize(&self, record: &RawRecord) -> Result<NormalizedEvent, AdapterError> {
        if let Some(cell) = record.payload.get("approved").and_then(|v| v.as_str()) {
            match parse_flexible_bool(cell) {
                Some(true) => {}
                Some(false) => {
                    return Err(AdapterError::Validation("row not approved".to_string()));
                }
                None => {
                    return Err(AdapterError::Parse(format!(
                        "unreadable approved cell '{cell}'"
                    )));
                }
            }
        }

        normalize_payload(&record.payload, &self.matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{slugify, CityRef};
    use serde_json::json;

    fn adapter() -> SpreadsheetAdapter {
        let matcher = Arc::new(CityMatcher::new(vec![(
            CityRef {
                id: 2,
                region_id: 1,
                name: "Agadir".to_string(),
                slug: slugify("Agadir"),
                latitude: None,
                longitude: None,
            },
            vec![],
        )]));
        SpreadsheetAdapter::new(reqwest::Client::new(), "http://unused".to_string(), matcher)
    }

    fn row(approved: &str) -> RawRecord {
        RawRecord {
            external_id: Some("row-1".to_string()),
            source_url: None,
            payload: json!({
                "name": "Festival Timitar",
                "event_type": "festival",
                "start_date": "2025-07-02",
                "city": "Agadir",
                "approved": approved
            }),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn approved_literals_are_coerced() {
        let adapter = adapter();
        for cell in ["TRUE", "Yes", "1", "true"] {
            assert!(adapter.normalize(&row(cell)).is_ok(), "cell {cell:?}");
        }
        for cell in ["FALSE", "No", "0", "false"] {
            assert!(
                matches!(adapter.normalize(&row(cell)), Err(AdapterError::Validation(_))),
                "cell {cell:?}"
            );
        }
        assert!(matches!(
            adapter.normalize(&row("peut-être")),
            Err(AdapterError::Parse(_))
        ));
    }

    #[test]
    fn rows_without_approval_column_pass_through() {
        let adapter = adapter();
        let record = RawRecord {
            external_id: Some("row-2".to_string()),
            source_url: None,
            payload: json!({
                "name": "Festival Timitar",
                "event_type": "festival",
                "start_date": "2025-07-02",
                "city": "Agadir"
            }),
            fetched_at: Utc::now(),
        };
        let normalized = adapter.normalize(&record).unwrap();
        assert_eq!(normalized.city_id, Some(2));
    }
}
