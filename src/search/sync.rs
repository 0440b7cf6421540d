//! Search projection synchronizer.
//!
//! The only writer to the search collection. Keeps it aligned with the
//! indexable slice of the catalog through incremental upserts and deletes,
//! with a destructive full rebuild as the recovery path of last resort.
//! Incremental updates are suspended while a rebuild is running; anything
//! that arrives meanwhile (or fails outright) lands on a retry queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IngestError, SearchError};
use crate::repositories::EventRepository;
use crate::search::{
    collection_schema, transform, SearchEngine, COLLECTION_NAME, IMPORT_BATCH_SIZE,
};

/// A deferred projection operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOp {
    Upsert(i32),
    Delete(i32),
}

/// Counts returned by a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub indexed: usize,
    pub errors: usize,
}

pub struct ProjectionSynchronizer {
    db: DatabaseConnection,
    engine: Arc<dyn SearchEngine>,
    rebuild_in_progress: AtomicBool,
    retry_queue: Mutex<VecDeque<ProjectionOp>>,
}

impl ProjectionSynchronizer {
    pub fn new(db: DatabaseConnection, engine: Arc<dyn SearchEngine>) -> Self {
        Self {
            db,
            engine,
            rebuild_in_progress: AtomicBool::new(false),
            retry_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn engine(&self) -> Arc<dyn SearchEngine> {
        self.engine.clone()
    }

    /// Create the collection with the declared schema if it is missing.
    pub async fn ensure_schema(&self) -> Result<(), SearchError> {
        self.engine.ensure_collection(&collection_schema()).await
    }

    /// Upsert one event's projection. Deletes instead when the event is
    /// gone or its status is not indexable, so callers can fire this after
    /// any mutation without inspecting the event first.
    pub async fn upsert_event(&self, event_id: i32) -> Result<(), IngestError> {
        if self.rebuild_in_progress.load(Ordering::SeqCst) {
            self.enqueue(ProjectionOp::Upsert(event_id)).await;
            return Ok(());
        }

        let row = EventRepository::load_projection(&self.db, event_id).await?;
        match row {
            Some(row) if row.event.is_indexable() => {
                let document = transform(&row);
                self.engine
                    .upsert_document(COLLECTION_NAME, &document)
                    .await
                    .map_err(IngestError::from)?;
                debug!(event_id, "projected event");
                Ok(())
            }
            _ => self.delete_event(event_id).await,
        }
    }

    /// Delete one event's projection. Idempotent.
    pub async fn delete_event(&self, event_id: i32) -> Result<(), IngestError> {
        if self.rebuild_in_progress.load(Ordering::SeqCst) {
            self.enqueue(ProjectionOp::Delete(event_id)).await;
            return Ok(());
        }

        match self
            .engine
            .delete_document(COLLECTION_NAME, &event_id.to_string())
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Post-commit hook flavor: failures are queued for retry instead of
    /// propagating, because the authoritative transaction already committed.
    pub async fn upsert_event_or_queue(&self, event_id: i32) {
        if let Err(err) = self.upsert_event(event_id).await {
            warn!(event_id, error = %err, "projection upsert failed, queueing for retry");
            self.enqueue(ProjectionOp::Upsert(event_id)).await;
        }
    }

    /// Post-commit hook flavor of [`Self::delete_event`].
    pub async fn delete_event_or_queue(&self, event_id: i32) {
        if let Err(err) = self.delete_event(event_id).await {
            warn!(event_id, error = %err, "projection delete failed, queueing for retry");
            self.enqueue(ProjectionOp::Delete(event_id)).await;
        }
    }

    async fn enqueue(&self, op: ProjectionOp) {
        let mut queue = self.retry_queue.lock().await;
        if !queue.contains(&op) {
            queue.push_back(op);
        }
    }

    /// Replay queued operations. Ops that fail again go back on the queue;
    /// the next full rebuild reconciles whatever never makes it.
    pub async fn drain_retries(&self) -> usize {
        if self.rebuild_in_progress.load(Ordering::SeqCst) {
            return 0;
        }

        let pending: Vec<ProjectionOp> = {
            let mut queue = self.retry_queue.lock().await;
            queue.drain(..).collect()
        };
        let mut applied = 0;
        for op in pending {
            let result = match op {
                ProjectionOp::Upsert(id) => self.upsert_event(id).await,
                ProjectionOp::Delete(id) => self.delete_event(id).await,
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => {
                    warn!(?op, error = %err, "projection retry failed");
                    self.enqueue(op).await;
                }
            }
        }
        applied
    }

    /// Number of operations currently waiting for retry.
    pub async fn retry_backlog(&self) -> usize {
        self.retry_queue.lock().await.len()
    }

    /// Drop and recreate the collection, then stream every indexable event
    /// back in. Per-document failures are logged and counted without
    /// stopping other batches; cancellation is honored between batches.
    pub async fn full_rebuild(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RebuildOutcome, IngestError> {
        self.rebuild_in_progress.store(true, Ordering::SeqCst);
        let result = self.rebuild_inner(cancel).await;
        self.rebuild_in_progress.store(false, Ordering::SeqCst);

        // Whatever was deferred during the rebuild replays on top of the
        // fresh snapshot.
        self.drain_retries().await;
        result
    }

    async fn rebuild_inner(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RebuildOutcome, IngestError> {
        self.engine
            .drop_collection(COLLECTION_NAME)
            .await
            .map_err(IngestError::from)?;
        self.engine
            .ensure_collection(&collection_schema())
            .await
            .map_err(IngestError::from)?;

        let ids = EventRepository::list_indexable_ids(&self.db).await?;
        let total = ids.len();
        let mut indexed = 0usize;
        let mut errors = 0usize;

        for chunk in ids.chunks(IMPORT_BATCH_SIZE) {
            if cancel.is_cancelled() {
                info!(indexed, errors, "full rebuild cancelled at batch boundary");
                break;
            }

            let mut documents = Vec::with_capacity(chunk.len());
            for &event_id in chunk {
                match EventRepository::load_projection(&self.db, event_id).await {
                    Ok(Some(row)) => documents.push(transform(&row)),
                    Ok(None) => {
                        // Raced with a concurrent delete; nothing to index.
                        errors += 1;
                    }
                    Err(err) => {
                        warn!(event_id, error = %err, "failed to load event for rebuild");
                        errors += 1;
                    }
                }
            }

            match self.engine.import_batch(COLLECTION_NAME, &documents).await {
                Ok(results) => {
                    for (document, result) in documents.iter().zip(results) {
                        match result {
                            Ok(()) => indexed += 1,
                            Err(message) => {
                                warn!(id = %document.id, message, "document rejected during rebuild");
                                errors += 1;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "batch import failed during rebuild");
                    errors += documents.len();
                }
            }
        }

        info!(total, indexed, errors, "full rebuild finished");
        Ok(RebuildOutcome { indexed, errors })
    }
}
