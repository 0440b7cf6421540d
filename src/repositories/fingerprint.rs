//! Fingerprint repository: the dedup lookup table.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::error::RepositoryError;
use crate::fingerprint::{FingerprintKind, FingerprintSet};
use crate::models::fingerprint::{ActiveModel, Column, Entity as Fingerprint};

pub struct FingerprintRepository;

impl FingerprintRepository {
    /// Event ids owning the given (kind, hash), in id order.
    pub async fn events_matching<C: ConnectionTrait>(
        db: &C,
        kind: FingerprintKind,
        hash: &str,
    ) -> Result<Vec<i32>, RepositoryError> {
        let rows = Fingerprint::find()
            .filter(Column::Kind.eq(kind.as_str()))
            .filter(Column::Hash.eq(hash))
            .order_by_asc(Column::EventId)
            .all(db)
            .await?;

        let mut ids: Vec<i32> = rows.into_iter().map(|row| row.event_id).collect();
        ids.dedup();
        Ok(ids)
    }

    /// Atomically replace an event's fingerprint set: old rows out, new rows
    /// in, inside whatever transaction the caller is holding.
    pub async fn replace_for_event<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
        set: &FingerprintSet,
    ) -> Result<(), RepositoryError> {
        Fingerprint::delete_many()
            .filter(Column::EventId.eq(event_id))
            .exec(db)
            .await?;

        let rows: Vec<ActiveModel> = set
            .entries()
            .into_iter()
            .map(|(kind, hash)| ActiveModel {
                event_id: Set(event_id),
                kind: Set(kind.as_str().to_string()),
                hash: Set(hash.to_string()),
                ..Default::default()
            })
            .collect();

        if !rows.is_empty() {
            Fingerprint::insert_many(rows).exec(db).await?;
        }
        Ok(())
    }

    /// All fingerprint rows for an event, used by tests and diagnostics.
    pub async fn for_event<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
    ) -> Result<Vec<crate::models::fingerprint::Model>, RepositoryError> {
        Ok(Fingerprint::find()
            .filter(Column::EventId.eq(event_id))
            .order_by_asc(Column::Kind)
            .all(db)
            .await?)
    }
}
