//! Editorial command handler.
//!
//! The six human-initiated commands, each applied transactionally, recorded
//! in the append-only audit log, and followed by the matching projection
//! update. Ingestion never calls into this module; the admin interface does.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

use crate::confidence::ConfidenceScorer;
use crate::error::RepositoryError;
use crate::models::{
    editorial_action, event, event_artist, event_snapshot, event_source, EventStatus,
};
use crate::repositories::{EventRepository, SourceRepository};
use crate::search::ProjectionSynchronizer;

/// Source name under which editorially supplied provenance is recorded.
const EDITORIAL_SOURCE_NAME: &str = "editorial";

#[derive(Debug, Error)]
pub enum EditorialError {
    #[error("event {0} not found")]
    EventNotFound(i32),
    #[error("cultural significance must be within 0..=10, got {0}")]
    InvalidSignificance(i32),
    #[error("unknown status '{0}'")]
    InvalidStatus(String),
    #[error("cannot merge an event into itself")]
    SelfMerge,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct EditorialHandler {
    db: DatabaseConnection,
    search: Arc<ProjectionSynchronizer>,
}

impl EditorialHandler {
    pub fn new(db: DatabaseConnection, search: Arc<ProjectionSynchronizer>) -> Self {
        Self { db, search }
    }

    /// Mark an event as editorially verified (or retract that mark).
    #[instrument(skip(self))]
    pub async fn verify(
        &self,
        actor: &str,
        event_id: i32,
        flag: bool,
        notes: Option<String>,
    ) -> Result<(), EditorialError> {
        let txn = self.db.begin().await?;
        let event = Self::load(&txn, event_id).await?;

        let now = Utc::now();
        let mut active: event::ActiveModel = event.into();
        active.is_verified = Set(flag);
        active.last_verified_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(&txn).await?;

        Self::log_action(
            &txn,
            "verify",
            event_id,
            actor,
            json!({"flag": flag, "notes": notes}),
        )
        .await?;
        txn.commit().await?;

        self.search.upsert_event_or_queue(event_id).await;
        Ok(())
    }

    /// Pin an event to the top of significance-ranked listings.
    #[instrument(skip(self))]
    pub async fn pin(
        &self,
        actor: &str,
        event_id: i32,
        flag: bool,
        reason: Option<String>,
    ) -> Result<(), EditorialError> {
        let txn = self.db.begin().await?;
        let event = Self::load(&txn, event_id).await?;

        let mut active: event::ActiveModel = event.into();
        active.is_pinned = Set(flag);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        Self::log_action(
            &txn,
            "pin",
            event_id,
            actor,
            json!({"flag": flag, "reason": reason}),
        )
        .await?;
        txn.commit().await?;

        self.search.upsert_event_or_queue(event_id).await;
        Ok(())
    }

    /// Set the 0..=10 cultural significance score.
    #[instrument(skip(self))]
    pub async fn set_significance(
        &self,
        actor: &str,
        event_id: i32,
        score: i32,
    ) -> Result<(), EditorialError> {
        if !(0..=10).contains(&score) {
            return Err(EditorialError::InvalidSignificance(score));
        }

        let txn = self.db.begin().await?;
        let event = Self::load(&txn, event_id).await?;

        let mut active: event::ActiveModel = event.into();
        active.cultural_significance = Set(score);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        Self::log_action(&txn, "set_significance", event_id, actor, json!({"score": score}))
            .await?;
        txn.commit().await?;

        self.search.upsert_event_or_queue(event_id).await;
        Ok(())
    }

    /// Transition an event's lifecycle status, optionally recording where
    /// the editor learned about the change.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        actor: &str,
        event_id: i32,
        status: &str,
        source_url: Option<String>,
    ) -> Result<(), EditorialError> {
        let parsed = EventStatus::parse(status)
            .ok_or_else(|| EditorialError::InvalidStatus(status.to_string()))?;

        let txn = self.db.begin().await?;
        let event = Self::load(&txn, event_id).await?;

        let now = Utc::now();
        let mut active: event::ActiveModel = event.into();
        active.status = Set(parsed.as_str().to_string());
        active.updated_at = Set(now.into());
        active.update(&txn).await?;

        if let Some(url) = &source_url {
            // Editorial provenance rides on a dedicated full-trust source.
            let source =
                SourceRepository::find_or_create_manual(&txn, EDITORIAL_SOURCE_NAME, 1.0).await?;
            event_source::ActiveModel {
                event_id: Set(event_id),
                source_id: Set(source.id),
                external_id: Set(None),
                source_url: Set(Some(url.clone())),
                raw_payload: Set(json!({"status": parsed.as_str(), "source_url": url})),
                fetched_at: Set(now.into()),
                created_at: Set(now.into()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            ConfidenceScorer::recompute(&txn, event_id).await?;
        }

        Self::log_action(
            &txn,
            "update_status",
            event_id,
            actor,
            json!({"status": parsed.as_str(), "source_url": source_url}),
        )
        .await?;
        txn.commit().await?;

        // A non-indexable status turns the upsert into a delete.
        self.search.upsert_event_or_queue(event_id).await;
        Ok(())
    }

    /// Merge `lose_id` into `keep_id`: snapshot the loser, re-link its
    /// provenance and non-duplicate artists, then remove it.
    #[instrument(skip(self))]
    pub async fn merge(
        &self,
        actor: &str,
        keep_id: i32,
        lose_id: i32,
    ) -> Result<(), EditorialError> {
        if keep_id == lose_id {
            return Err(EditorialError::SelfMerge);
        }

        let txn = self.db.begin().await?;

        // Row locks are taken in ascending id order to avoid deadlock with a
        // concurrent merge of the same pair.
        let (first, second) = if keep_id < lose_id {
            (keep_id, lose_id)
        } else {
            (lose_id, keep_id)
        };
        let first_event = Self::load(&txn, first).await?;
        let second_event = Self::load(&txn, second).await?;
        let (keep, lose) = if keep_id < lose_id {
            (first_event, second_event)
        } else {
            (second_event, first_event)
        };

        // Snapshot the loser before anything mutates.
        let now = Utc::now();
        event_snapshot::ActiveModel {
            event_id: Set(lose.id),
            snapshot: Set(serde_json::to_value(&lose)
                .map_err(|e| sea_orm::DbErr::Custom(e.to_string()))?),
            reason: Set(format!("merged into event {}", keep.id)),
            created_at: Set(now.into()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        // Provenance follows the surviving event.
        event_source::Entity::update_many()
            .col_expr(event_source::Column::EventId, Expr::value(keep.id))
            .filter(event_source::Column::EventId.eq(lose.id))
            .exec(&txn)
            .await?;

        // Artists move over unless the keeper already has them.
        let losing_artists = event_artist::Entity::find()
            .filter(event_artist::Column::EventId.eq(lose.id))
            .order_by_asc(event_artist::Column::ArtistId)
            .all(&txn)
            .await?;
        for link in &losing_artists {
            let duplicate = event_artist::Entity::find_by_id((keep.id, link.artist_id))
                .one(&txn)
                .await?;
            if duplicate.is_none() {
                event_artist::ActiveModel {
                    event_id: Set(keep.id),
                    artist_id: Set(link.artist_id),
                }
                .insert(&txn)
                .await?;
            }
        }
        event_artist::Entity::delete_many()
            .filter(event_artist::Column::EventId.eq(lose.id))
            .exec(&txn)
            .await?;

        let lose_id_final = lose.id;
        event::Entity::delete_by_id(lose_id_final).exec(&txn).await?;

        // The keeper's source set changed; its confidence must follow.
        ConfidenceScorer::recompute(&txn, keep.id).await?;

        Self::log_action(
            &txn,
            "merge",
            keep.id,
            actor,
            json!({"kept": keep.id, "lost": lose_id_final}),
        )
        .await?;
        txn.commit().await?;

        self.search.upsert_event_or_queue(keep_id).await;
        self.search.delete_event_or_queue(lose_id_final).await;

        info!(keep_id, lose_id, "editorial merge applied");
        Ok(())
    }

    /// Archive an event: terminal for visibility, gone from search.
    #[instrument(skip(self))]
    pub async fn archive(
        &self,
        actor: &str,
        event_id: i32,
        reason: Option<String>,
    ) -> Result<(), EditorialError> {
        let txn = self.db.begin().await?;
        let event = Self::load(&txn, event_id).await?;

        let mut active: event::ActiveModel = event.into();
        active.status = Set(EventStatus::Archived.as_str().to_string());
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        Self::log_action(&txn, "archive", event_id, actor, json!({"reason": reason})).await?;
        txn.commit().await?;

        self.search.delete_event_or_queue(event_id).await;
        Ok(())
    }

    async fn load<C: ConnectionTrait>(db: &C, event_id: i32) -> Result<event::Model, EditorialError> {
        EventRepository::find_by_id(db, event_id)
            .await?
            .ok_or(EditorialError::EventNotFound(event_id))
    }

    async fn log_action<C: ConnectionTrait>(
        db: &C,
        action_type: &str,
        event_id: i32,
        actor: &str,
        payload: serde_json::Value,
    ) -> Result<(), EditorialError> {
        editorial_action::ActiveModel {
            action_type: Set(action_type.to_string()),
            event_id: Set(event_id),
            actor: Set(actor.to_string()),
            payload: Set(payload),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(())
    }
}
