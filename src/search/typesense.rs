//! Typesense client.
//!
//! HTTP implementation of the [`SearchEngine`] contract. Batch imports use
//! the JSONL import endpoint with the upsert action and surface per-document
//! results so a bad document never sinks its batch.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::search::{EventDocument, SearchEngine};

const API_KEY_HEADER: &str = "x-typesense-api-key";

pub struct TypesenseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Query parameters for the read path consumed by the public API layer.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub q: String,
    pub query_by: String,
    pub filter_by: Option<String>,
    pub sort_by: Option<String>,
    pub facet_by: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ImportLine {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl TypesenseClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.connection_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::status(status.as_u16(), body))
    }

    /// Run a search against a collection. This is the query surface the
    /// public read API projects through; the synchronizer never calls it.
    pub async fn query(
        &self,
        collection: &str,
        params: &SearchQuery,
    ) -> Result<JsonValue, SearchError> {
        let mut pairs: Vec<(&str, String)> = vec![
            ("q", params.q.clone()),
            ("query_by", params.query_by.clone()),
        ];
        if let Some(filter_by) = &params.filter_by {
            pairs.push(("filter_by", filter_by.clone()));
        }
        if let Some(sort_by) = &params.sort_by {
            pairs.push(("sort_by", sort_by.clone()));
        }
        if let Some(facet_by) = &params.facet_by {
            pairs.push(("facet_by", facet_by.clone()));
        }
        if let Some(page) = params.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = params.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        pairs.push(("highlight_full_fields", params.query_by.clone()));

        let response = self
            .client
            .get(self.url(&format!("/collections/{collection}/documents/search")))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&pairs)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl SearchEngine for TypesenseClient {
    async fn ensure_collection(&self, schema: &JsonValue) -> Result<(), SearchError> {
        let name = schema["name"].as_str().unwrap_or_default();
        let existing = self
            .client
            .get(self.url(&format!("/collections/{name}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status().as_u16() != 404 {
            let status = existing.status().as_u16();
            let body = existing.text().await.unwrap_or_default();
            return Err(SearchError::status(status, body));
        }

        debug!(collection = name, "creating search collection");
        let response = self
            .client
            .post(self.url("/collections"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(schema)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{name}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn import_batch(
        &self,
        collection: &str,
        documents: &[EventDocument],
    ) -> Result<Vec<Result<(), String>>, SearchError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = String::new();
        for document in documents {
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }

        let response = self
            .client
            .post(self.url(&format!(
                "/collections/{collection}/documents/import"
            )))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("action", "upsert")])
            .body(body)
            .send()
            .await?;
        let text = Self::check(response).await?.text().await?;

        // The import endpoint answers one JSON object per input line.
        let mut results = Vec::with_capacity(documents.len());
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ImportLine>(line) {
                Ok(parsed) if parsed.success => results.push(Ok(())),
                Ok(parsed) => results.push(Err(parsed
                    .error
                    .unwrap_or_else(|| "import rejected".to_string()))),
                Err(err) => results.push(Err(format!("unreadable import response: {err}"))),
            }
        }
        while results.len() < documents.len() {
            results.push(Err("missing import response line".to_string()));
        }
        Ok(results)
    }

    async fn upsert_document(
        &self,
        collection: &str,
        document: &EventDocument,
    ) -> Result<(), SearchError> {
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/documents")))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("action", "upsert")])
            .json(document)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{collection}/documents/{id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        // Idempotent: deleting a document that is not there succeeds.
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn health(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .get(self.url("/health"))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let body: JsonValue = Self::check(response).await?.json().await?;
        Ok(body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false))
    }
}
