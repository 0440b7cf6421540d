//! Source repository: the registry's persistent half.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::error::RepositoryError;
use crate::models::source::{ActiveModel, Column, Entity as Source, Model};
use crate::models::SourceType;

pub struct SourceRepository;

impl SourceRepository {
    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Model, RepositoryError> {
        Source::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("source", id))
    }

    pub async fn find_by_name<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        Ok(Source::find().filter(Column::Name.eq(name)).one(db).await?)
    }

    /// Active sources in id order, for deterministic run reports.
    pub async fn list_active<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, RepositoryError> {
        Ok(Source::find()
            .filter(Column::IsActive.eq(true))
            .order_by_asc(Column::Id)
            .all(db)
            .await?)
    }

    pub async fn list_active_of_type<C: ConnectionTrait>(
        db: &C,
        source_type: SourceType,
    ) -> Result<Vec<Model>, RepositoryError> {
        Ok(Source::find()
            .filter(Column::IsActive.eq(true))
            .filter(Column::SourceType.eq(source_type.as_str()))
            .order_by_asc(Column::Id)
            .all(db)
            .await?)
    }

    /// Look up a manual-entry source by name, creating it on first use.
    /// Supplied reliability is clamped into [0, 1].
    pub async fn find_or_create_manual<C: ConnectionTrait>(
        db: &C,
        name: &str,
        reliability: f64,
    ) -> Result<Model, RepositoryError> {
        if let Some(existing) = Self::find_by_name(db, name).await? {
            return Ok(existing);
        }

        let model = ActiveModel {
            name: Set(name.to_string()),
            source_type: Set(SourceType::Manual.as_str().to_string()),
            reliability_score: Set(reliability.clamp(0.0, 1.0)),
            historical_accuracy: Set(None),
            is_active: Set(true),
            endpoint: Set(None),
            last_fetch_at: Set(None),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        Ok(model.insert(db).await?)
    }

    /// Advance the fetch cursor. Called only after a fetch stage completed
    /// without a retriable error.
    pub async fn advance_cursor<C: ConnectionTrait>(
        db: &C,
        id: i32,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let source = Self::find_by_id(db, id).await?;
        let mut active: ActiveModel = source.into();
        active.last_fetch_at = Set(Some(fetched_at.into()));
        active.update(db).await?;
        Ok(())
    }
}
