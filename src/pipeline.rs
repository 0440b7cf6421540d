//! Pipeline orchestrator.
//!
//! Drives a full ingestion run: bounded-parallel fetch across active
//! sources, sequential per-source candidate processing in fetch order,
//! per-record failure isolation, cursor advancement only on clean fetches,
//! and an aggregated run report. Also hosts the maintenance entry points
//! the scheduler fires on its daily and weekly cadence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, SourceAdapter};
use crate::confidence::ConfidenceScorer;
use crate::config::PipelineConfig;
use crate::error::{IngestError, IngestErrorKind};
use crate::fingerprint;
use crate::merge::{ApplyOutcome, MergeWriter};
use crate::models::{candidate, source, CandidateOutcome, RawRecord};
use crate::repositories::{CandidateRepository, EventRepository, ReferenceRepository, SourceRepository};
use crate::resolver::DeduplicationResolver;
use crate::search::sync::RebuildOutcome;
use crate::search::ProjectionSynchronizer;

/// Backoff schedule for retriable fetch errors, in seconds.
const BACKOFF_SECONDS: [u64; 3] = [1, 2, 4];

/// Days after which an event's confidence counts as stale.
const CONFIDENCE_STALE_DAYS: i64 = 30;

/// Hook the daily maintenance fires after archival and rebuild so the page
/// generation collaborator can refresh its sitemap.
#[async_trait::async_trait]
pub trait SitemapNotifier: Send + Sync {
    async fn sitemap_stale(&self);
}

/// Default notifier for deployments without a page generator attached.
pub struct NoopSitemapNotifier;

#[async_trait::async_trait]
impl SitemapNotifier for NoopSitemapNotifier {
    async fn sitemap_stale(&self) {
        info!("sitemap regeneration requested");
    }
}

/// Per-source counters for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub fetched: usize,
    pub created: usize,
    pub merged: usize,
    pub review_needed: usize,
    pub errors: Vec<String>,
    /// Set when the fetch stage failed after retries; the cursor stays put.
    pub fetch_failed: bool,
}

/// Aggregated outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: BTreeMap<String, SourceReport>,
    pub cancelled: bool,
}

impl IngestionReport {
    pub fn totals(&self) -> SourceReport {
        let mut totals = SourceReport::default();
        for report in self.sources.values() {
            totals.fetched += report.fetched;
            totals.created += report.created;
            totals.merged += report.merged;
            totals.review_needed += report.review_needed;
            totals.errors.extend(report.errors.iter().cloned());
        }
        totals
    }
}

/// Outcome of the daily maintenance pass.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub archived: usize,
    pub rescored: usize,
    pub rebuild_indexed: usize,
    pub rebuild_errors: usize,
}

pub struct PipelineOrchestrator {
    db: DatabaseConnection,
    search: Arc<ProjectionSynchronizer>,
    sitemap: Arc<dyn SitemapNotifier>,
    config: PipelineConfig,
    client: reqwest::Client,
}

impl Clone for PipelineOrchestrator {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            search: self.search.clone(),
            sitemap: self.sitemap.clone(),
            config: self.config.clone(),
            client: self.client.clone(),
        }
    }
}

impl PipelineOrchestrator {
    pub fn new(
        db: DatabaseConnection,
        search: Arc<ProjectionSynchronizer>,
        sitemap: Arc<dyn SitemapNotifier>,
        config: PipelineConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            db,
            search,
            sitemap,
            config,
            client,
        }
    }

    pub fn search(&self) -> Arc<ProjectionSynchronizer> {
        self.search.clone()
    }

    /// Run one full ingestion pass over every active fetchable source.
    #[instrument(skip_all, fields(run_id))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<IngestionReport, IngestError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let timer = std::time::Instant::now();
        info!(%run_id, "starting ingestion run");

        // Fresh reads every run: no cached matcher, no cached source list.
        let matcher = Arc::new(ReferenceRepository::load_city_matcher(&self.db).await?);
        let sources = SourceRepository::list_active(&self.db).await?;
        let registry = Arc::new(AdapterRegistry::build(
            &sources,
            matcher,
            self.client.clone(),
        ));

        // A fatal store error anywhere stops the whole run; sources observe
        // it through this child token at their next boundary.
        let run_cancel = cancel.child_token();

        let worker_cap = if self.config.fetch_concurrency == 0 {
            sources.len().max(1)
        } else {
            self.config.fetch_concurrency
        };
        let semaphore = Arc::new(Semaphore::new(worker_cap));

        let mut handles = Vec::new();
        for source in sources {
            let Some(adapter) = registry.get(source.id) else {
                continue;
            };
            if run_cancel.is_cancelled() {
                break;
            }

            let executor = self.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| IngestError::new(IngestErrorKind::Database, "semaphore closed"))?;
            let task_cancel = run_cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let name = source.name.clone();
                let report = executor
                    .process_source(&source, adapter, &task_cancel)
                    .await;
                (name, report)
            });
            handles.push(handle);
        }

        let mut reports = BTreeMap::new();
        for handle in handles {
            match handle.await {
                Ok((name, report)) => {
                    reports.insert(name, report);
                }
                Err(err) => error!(error = %err, "source worker panicked"),
            }
        }

        // Give failed projections another chance before the run closes.
        self.search.drain_retries().await;

        let report = IngestionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            cancelled: run_cancel.is_cancelled(),
        };

        let totals = report.totals();
        counter!("pipeline_runs_total").increment(1);
        counter!("pipeline_candidates_created_total").increment(totals.created as u64);
        counter!("pipeline_candidates_merged_total").increment(totals.merged as u64);
        counter!("pipeline_candidates_review_total").increment(totals.review_needed as u64);
        histogram!("pipeline_run_duration_seconds").record(timer.elapsed().as_secs_f64());

        info!(
            %run_id,
            fetched = totals.fetched,
            created = totals.created,
            merged = totals.merged,
            review = totals.review_needed,
            errors = totals.errors.len(),
            "ingestion run finished"
        );
        Ok(report)
    }

    /// One source: fetch with retry, then process candidates sequentially in
    /// fetch order. The cursor advances only when the fetch stage completed
    /// without a retriable failure.
    #[instrument(skip_all, fields(source = %source.name))]
    async fn process_source(
        &self,
        source: &source::Model,
        adapter: Arc<dyn SourceAdapter>,
        cancel: &CancellationToken,
    ) -> SourceReport {
        let mut report = SourceReport::default();
        let fetch_started = Utc::now();
        let since = source.last_fetch_at.map(|t| t.with_timezone(&Utc));

        let records = match self.fetch_with_retry(source, &*adapter, since, cancel).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "fetch stage failed");
                report.errors.push(err.to_string());
                report.fetch_failed = true;
                return report;
            }
        };
        report.fetched = records.len();

        for record in records {
            if cancel.is_cancelled() {
                break;
            }
            match self.process_record(source, &*adapter, &record).await {
                Ok(outcome) => match outcome.outcome {
                    CandidateOutcome::Created => report.created += 1,
                    CandidateOutcome::Merged => report.merged += 1,
                    CandidateOutcome::Review => report.review_needed += 1,
                },
                Err(err) if err.is_record_scoped() => {
                    // Skip the record, keep the source going.
                    report.errors.push(err.to_string());
                }
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "fatal store error, aborting run");
                    report.errors.push(err.to_string());
                    report.fetch_failed = true;
                    cancel.cancel();
                    return report;
                }
                Err(err) => {
                    report.errors.push(err.to_string());
                }
            }
        }

        if cancel.is_cancelled() {
            return report;
        }

        if let Err(err) = SourceRepository::advance_cursor(&self.db, source.id, fetch_started).await
        {
            warn!(error = %err, "failed to advance source cursor");
            report.errors.push(err.to_string());
        }
        report
    }

    async fn fetch_with_retry(
        &self,
        source: &source::Model,
        adapter: &dyn SourceAdapter,
        since: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRecord>, IngestError> {
        let max_attempts = self.config.max_fetch_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(IngestError::new(
                    IngestErrorKind::SourceUnavailable,
                    "run cancelled before fetch completed",
                ));
            }

            match adapter.fetch(since).await {
                Ok(records) => return Ok(records),
                Err(err) => {
                    let ingest: IngestError = err.into();
                    if !ingest.is_retriable() || attempt + 1 == max_attempts {
                        return Err(ingest);
                    }
                    // Server-provided retry-after wins over the schedule.
                    let backoff = ingest.retry_after.unwrap_or_else(|| {
                        BACKOFF_SECONDS[(attempt as usize).min(BACKOFF_SECONDS.len() - 1)]
                    });
                    warn!(
                        source = %source.name,
                        attempt = attempt + 1,
                        backoff_seconds = backoff,
                        error = %ingest,
                        "retriable fetch error, backing off"
                    );
                    last_error = Some(ingest);
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sleep(Duration::from_secs(backoff)) => {}
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IngestError::new(IngestErrorKind::SourceUnavailable, "fetch retries exhausted")
        }))
    }

    /// Normalize, stage, and resolve one raw record.
    async fn process_record(
        &self,
        source: &source::Model,
        adapter: &dyn SourceAdapter,
        record: &RawRecord,
    ) -> Result<ApplyOutcome, IngestError> {
        let normalized = adapter.normalize(record).map_err(IngestError::from)?;

        // Staging is append-only and commits on its own: a crash after this
        // point leaves an unprocessed candidate the next run picks up.
        let staged =
            CandidateRepository::insert(&self.db, source.id, record, &normalized).await?;

        self.resolve_and_apply(&staged, source).await
    }

    /// Resolve + apply + fingerprint + confidence inside one transaction,
    /// then fire the projection hook post-commit.
    pub async fn resolve_and_apply(
        &self,
        staged: &candidate::Model,
        source: &source::Model,
    ) -> Result<ApplyOutcome, IngestError> {
        let normalized = staged.normalized_event().map_err(|err| {
            IngestError::new(IngestErrorKind::Parse, format!("stored candidate unreadable: {err}"))
        })?;

        let fingerprints = fingerprint::generate(
            &normalized.normalized_name,
            normalized.start_date,
            normalized.city_id,
        );

        let txn = self.db.begin().await.map_err(IngestError::from)?;
        let applied = async {
            let decision = DeduplicationResolver::resolve(&txn, &normalized, &fingerprints).await?;
            MergeWriter::apply(&txn, staged, &normalized, &decision, source).await
        }
        .await;

        let outcome = match applied {
            Ok(outcome) => {
                txn.commit().await.map_err(IngestError::from)?;
                outcome
            }
            Err(err) => {
                // Rollback happens on drop; a merge conflict additionally
                // routes the candidate to review outside the dead txn.
                drop(txn);
                if err.kind == IngestErrorKind::MergeConflict {
                    CandidateRepository::mark_processed(
                        &self.db,
                        staged.id,
                        CandidateOutcome::Review,
                        None,
                        None,
                    )
                    .await?;
                    return Ok(ApplyOutcome {
                        outcome: CandidateOutcome::Review,
                        event_id: None,
                    });
                }
                return Err(err);
            }
        };

        // Post-commit hook: eventually consistent, never rolls back the
        // authoritative transaction.
        if let Some(event_id) = outcome.event_id {
            self.search.upsert_event_or_queue(event_id).await;
        }
        Ok(outcome)
    }

    /// Drain the manual-import queue (and any candidate a crashed run left
    /// unprocessed). Runs hourly.
    #[instrument(skip_all)]
    pub async fn process_pending(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IngestionReport, IngestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let pending = CandidateRepository::list_unprocessed(&self.db).await?;
        info!(%run_id, pending = pending.len(), "processing pending candidates");

        let mut reports: BTreeMap<String, SourceReport> = BTreeMap::new();
        for staged in pending {
            if cancel.is_cancelled() {
                break;
            }
            let source = SourceRepository::find_by_id(&self.db, staged.source_id).await?;
            let entry = reports.entry(source.name.clone()).or_default();
            entry.fetched += 1;
            match self.resolve_and_apply(&staged, &source).await {
                Ok(outcome) => match outcome.outcome {
                    CandidateOutcome::Created => entry.created += 1,
                    CandidateOutcome::Merged => entry.merged += 1,
                    CandidateOutcome::Review => entry.review_needed += 1,
                },
                Err(err) if err.is_fatal() => {
                    entry.errors.push(err.to_string());
                    break;
                }
                Err(err) => entry.errors.push(err.to_string()),
            }
        }

        Ok(IngestionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            cancelled: cancel.is_cancelled(),
        })
    }

    /// Daily maintenance: archive past events, refresh stale confidence,
    /// rebuild the search collection, and ping the sitemap hook.
    #[instrument(skip_all)]
    pub async fn maintenance(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceReport, IngestError> {
        let today = Utc::now().date_naive();

        let archived_ids = EventRepository::archive_past(&self.db, today).await?;
        for &event_id in &archived_ids {
            self.search.delete_event_or_queue(event_id).await;
        }

        let stale_cutoff = Utc::now() - chrono::Duration::days(CONFIDENCE_STALE_DAYS);
        let stale = EventRepository::list_stale_confidence(&self.db, stale_cutoff).await?;
        let mut rescored = 0usize;
        for event_id in &stale {
            if cancel.is_cancelled() {
                break;
            }
            match ConfidenceScorer::recompute(&self.db, *event_id).await {
                Ok(_) => {
                    rescored += 1;
                    self.search.upsert_event_or_queue(*event_id).await;
                }
                Err(err) => warn!(event_id, error = %err, "confidence recompute failed"),
            }
        }

        let rebuild = if cancel.is_cancelled() {
            RebuildOutcome {
                indexed: 0,
                errors: 0,
            }
        } else {
            self.search.full_rebuild(cancel).await?
        };

        self.sitemap.sitemap_stale().await;

        let report = MaintenanceReport {
            archived: archived_ids.len(),
            rescored,
            rebuild_indexed: rebuild.indexed,
            rebuild_errors: rebuild.errors,
        };
        info!(?report, "maintenance finished");
        Ok(report)
    }

    /// Weekly sweep of unprocessed candidates past the retention window.
    pub async fn sweep_candidates(&self) -> Result<u64, IngestError> {
        let swept =
            CandidateRepository::garbage_collect_days(&self.db, self.config.candidate_retention_days)
                .await?;
        if swept > 0 {
            info!(swept, "garbage-collected stale candidates");
        }
        Ok(swept)
    }
}
