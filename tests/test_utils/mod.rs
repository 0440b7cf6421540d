//! Shared fixtures for the integration suites: an in-memory database with
//! migrations and reference seeds applied, and a deterministic in-memory
//! search engine double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::Value as JsonValue;

use moussem::adapters::normalize_payload;
use moussem::config::PipelineConfig;
use moussem::editorial::EditorialHandler;
use moussem::error::SearchError;
use moussem::models::{candidate, source, RawRecord, SourceType};
use moussem::pipeline::{NoopSitemapNotifier, PipelineOrchestrator};
use moussem::repositories::{CandidateRepository, ReferenceRepository};
use moussem::search::{EventDocument, ProjectionSynchronizer, SearchEngine};
use moussem::seeds;

/// Deterministic stand-in for the search daemon.
#[derive(Default)]
pub struct InMemorySearchEngine {
    state: Mutex<EngineState>,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct EngineState {
    collection_exists: bool,
    documents: HashMap<String, EventDocument>,
}

impl InMemorySearchEngine {
    pub fn contains(&self, event_id: i32) -> bool {
        self.state
            .lock()
            .unwrap()
            .documents
            .contains_key(&event_id.to_string())
    }

    pub fn get(&self, event_id: i32) -> Option<EventDocument> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(&event_id.to_string())
            .cloned()
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .documents
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Simulate projection drift by dropping a document behind the
    /// synchronizer's back.
    pub fn corrupt_remove(&self, event_id: i32) {
        self.state
            .lock()
            .unwrap()
            .documents
            .remove(&event_id.to_string());
    }

    /// Make subsequent writes fail, to exercise the retry queue.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_guard(&self) -> Result<(), SearchError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(SearchError::status(503, "engine unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn ensure_collection(&self, _schema: &JsonValue) -> Result<(), SearchError> {
        self.write_guard()?;
        self.state.lock().unwrap().collection_exists = true;
        Ok(())
    }

    async fn drop_collection(&self, _name: &str) -> Result<(), SearchError> {
        self.write_guard()?;
        let mut state = self.state.lock().unwrap();
        state.collection_exists = false;
        state.documents.clear();
        Ok(())
    }

    async fn import_batch(
        &self,
        _collection: &str,
        documents: &[EventDocument],
    ) -> Result<Vec<Result<(), String>>, SearchError> {
        self.write_guard()?;
        let mut state = self.state.lock().unwrap();
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            state
                .documents
                .insert(document.id.clone(), document.clone());
            results.push(Ok(()));
        }
        Ok(results)
    }

    async fn upsert_document(
        &self,
        _collection: &str,
        document: &EventDocument,
    ) -> Result<(), SearchError> {
        self.write_guard()?;
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, _collection: &str, id: &str) -> Result<(), SearchError> {
        self.write_guard()?;
        self.state.lock().unwrap().documents.remove(id);
        Ok(())
    }

    async fn health(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

pub struct TestContext {
    pub db: DatabaseConnection,
    pub engine: Arc<InMemorySearchEngine>,
    pub search: Arc<ProjectionSynchronizer>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub editorial: EditorialHandler,
}

/// Fresh in-memory database with migrations, seeds, and a wired pipeline.
pub async fn setup() -> TestContext {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    seeds::seed_reference_data(&db)
        .await
        .expect("seed reference data");

    let engine = Arc::new(InMemorySearchEngine::default());
    let search = Arc::new(ProjectionSynchronizer::new(
        db.clone(),
        engine.clone() as Arc<dyn SearchEngine>,
    ));
    search.ensure_schema().await.expect("ensure schema");

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        db.clone(),
        search.clone(),
        Arc::new(NoopSitemapNotifier),
        PipelineConfig::default(),
    ));
    let editorial = EditorialHandler::new(db.clone(), search.clone());

    TestContext {
        db,
        engine,
        search,
        orchestrator,
        editorial,
    }
}

/// Insert a source row.
pub async fn insert_source(
    db: &DatabaseConnection,
    name: &str,
    source_type: SourceType,
    reliability: f64,
) -> source::Model {
    source::ActiveModel {
        name: Set(name.to_string()),
        source_type: Set(source_type.as_str().to_string()),
        reliability_score: Set(reliability),
        historical_accuracy: Set(None),
        is_active: Set(true),
        endpoint: Set(None),
        last_fetch_at: Set(None),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert source")
}

/// Normalize and stage one payload as a candidate of the given source.
pub async fn stage_candidate(
    db: &DatabaseConnection,
    source: &source::Model,
    payload: JsonValue,
    external_id: Option<&str>,
) -> candidate::Model {
    let matcher = ReferenceRepository::load_city_matcher(db)
        .await
        .expect("load matcher");
    let normalized = normalize_payload(&payload, &matcher).expect("normalize payload");
    let record = RawRecord {
        external_id: external_id.map(str::to_string),
        source_url: payload
            .get("source_url")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        payload,
        fetched_at: Utc::now(),
    };
    CandidateRepository::insert(db, source.id, &record, &normalized)
        .await
        .expect("stage candidate")
}

/// Stage and immediately resolve one payload, returning the event id.
#[allow(dead_code)]
pub async fn ingest_event(
    ctx: &TestContext,
    source: &source::Model,
    payload: JsonValue,
    external_id: Option<&str>,
) -> i32 {
    let staged = stage_candidate(&ctx.db, source, payload, external_id).await;
    let outcome = ctx
        .orchestrator
        .resolve_and_apply(&staged, source)
        .await
        .expect("resolve and apply");
    outcome.event_id.expect("expected an event id")
}
