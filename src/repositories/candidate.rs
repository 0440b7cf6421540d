//! Candidate store: the durable queue of staged inbound records.
//!
//! Inserts always append, even for a duplicate external id: deduplication
//! is the resolver's job, not the store's.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::candidate::{ActiveModel, Column, Entity as Candidate, Model};
use crate::models::{CandidateOutcome, NormalizedEvent, RawRecord};

pub struct CandidateRepository;

impl CandidateRepository {
    /// Stage a normalized record. Always appends.
    pub async fn insert<C: ConnectionTrait>(
        db: &C,
        source_id: i32,
        raw: &RawRecord,
        normalized: &NormalizedEvent,
    ) -> Result<Model, RepositoryError> {
        let now = Utc::now();
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            source_id: Set(source_id),
            external_id: Set(raw.external_id.clone()),
            source_url: Set(raw.source_url.clone()),
            raw_payload: Set(raw.payload.clone()),
            normalized: Set(serde_json::to_value(normalized)
                .map_err(|e| sea_orm::DbErr::Custom(e.to_string()))?),
            processed: Set(false),
            outcome: Set(None),
            matched_event_id: Set(None),
            match_confidence: Set(None),
            ingested_at: Set(now.into()),
            processed_at: Set(None),
        };
        Ok(model.insert(db).await?)
    }

    /// Record the resolution outcome on a candidate.
    pub async fn mark_processed<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        outcome: CandidateOutcome,
        matched_event_id: Option<i32>,
        match_confidence: Option<f64>,
    ) -> Result<(), RepositoryError> {
        let candidate = Candidate::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("candidate", id))?;

        let mut active: ActiveModel = candidate.into();
        active.processed = Set(true);
        active.outcome = Set(Some(outcome.as_str().to_string()));
        active.matched_event_id = Set(matched_event_id);
        active.match_confidence = Set(match_confidence);
        active.processed_at = Set(Some(Utc::now().into()));
        active.update(db).await?;
        Ok(())
    }

    /// Unprocessed candidates in ingestion order.
    pub async fn list_unprocessed<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, RepositoryError> {
        Ok(Candidate::find()
            .filter(Column::Processed.eq(false))
            .order_by_asc(Column::IngestedAt)
            .all(db)
            .await?)
    }

    /// Candidates waiting on a human decision.
    pub async fn list_review_pending<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<Model>, RepositoryError> {
        Ok(Candidate::find()
            .filter(Column::Outcome.eq(CandidateOutcome::Review.as_str()))
            .order_by_asc(Column::IngestedAt)
            .all(db)
            .await?)
    }

    /// Sweep unprocessed candidates older than the retention window.
    pub async fn garbage_collect_older_than<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = Candidate::delete_many()
            .filter(Column::Processed.eq(false))
            .filter(Column::IngestedAt.lt(cutoff))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Convenience wrapper for the weekly sweep.
    pub async fn garbage_collect_days<C: ConnectionTrait>(
        db: &C,
        days: i64,
    ) -> Result<u64, RepositoryError> {
        Self::garbage_collect_older_than(db, Utc::now() - Duration::days(days)).await
    }
}
