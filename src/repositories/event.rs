//! Event repository: catalog reads shared by the resolver, the confidence
//! scorer, the projection synchronizer, and maintenance jobs.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::error::RepositoryError;
use crate::models::{
    artist, city, event, event_artist, event_genre, event_source, genre, organizer, region, source,
    venue, EventStatus,
};

/// An event with every reference row the search document denormalizes.
#[derive(Debug, Clone)]
pub struct ProjectionRow {
    pub event: event::Model,
    pub city: city::Model,
    pub region: region::Model,
    pub venue: Option<venue::Model>,
    pub organizer: Option<organizer::Model>,
    pub genres: Vec<genre::Model>,
    pub artists: Vec<artist::Model>,
}

pub struct EventRepository;

impl EventRepository {
    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<event::Model>, RepositoryError> {
        Ok(event::Entity::find_by_id(id).one(db).await?)
    }

    /// Provenance rows joined with their sources, earliest linkage first.
    /// The first row is the event's primary source.
    pub async fn linked_sources<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
    ) -> Result<Vec<(event_source::Model, source::Model)>, RepositoryError> {
        let rows = event_source::Entity::find()
            .filter(event_source::Column::EventId.eq(event_id))
            .find_also_related(source::Entity)
            .order_by_asc(event_source::Column::Id)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(link, src)| src.map(|s| (link, s)))
            .collect())
    }

    /// Highest reliability among the event's linked sources.
    pub async fn best_source_reliability<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
    ) -> Result<Option<f64>, RepositoryError> {
        let linked = Self::linked_sources(db, event_id).await?;
        Ok(linked
            .iter()
            .map(|(_, src)| src.reliability_score)
            .fold(None, |best, score| match best {
                Some(current) if current >= score => Some(current),
                _ => Some(score),
            }))
    }

    /// Whether a slug is taken by any non-archived event.
    pub async fn slug_is_taken<C: ConnectionTrait>(
        db: &C,
        slug: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(event::Entity::find()
            .filter(event::Column::Slug.eq(slug))
            .filter(event::Column::Status.ne(EventStatus::Archived.as_str()))
            .one(db)
            .await?
            .is_some())
    }

    /// Ids of events whose status makes them searchable, in id order.
    pub async fn list_indexable_ids<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<i32>, RepositoryError> {
        let rows = event::Entity::find()
            .filter(event::Column::Status.is_in(vec![
                EventStatus::Announced.as_str(),
                EventStatus::Confirmed.as_str(),
            ]))
            .order_by_asc(event::Column::Id)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(|e| e.id).collect())
    }

    /// Load an event with all joined reference data for projection.
    pub async fn load_projection<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
    ) -> Result<Option<ProjectionRow>, RepositoryError> {
        let Some(event) = Self::find_by_id(db, event_id).await? else {
            return Ok(None);
        };

        let city = city::Entity::find_by_id(event.city_id)
            .one(db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("city", event.city_id))?;
        let region = region::Entity::find_by_id(event.region_id)
            .one(db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("region", event.region_id))?;

        let venue = match event.venue_id {
            Some(id) => venue::Entity::find_by_id(id).one(db).await?,
            None => None,
        };
        let organizer = match event.organizer_id {
            Some(id) => organizer::Entity::find_by_id(id).one(db).await?,
            None => None,
        };

        let genres = event_genre::Entity::find()
            .filter(event_genre::Column::EventId.eq(event_id))
            .find_also_related(genre::Entity)
            .order_by_asc(event_genre::Column::GenreId)
            .all(db)
            .await?
            .into_iter()
            .filter_map(|(_, g)| g)
            .collect();

        let artists = event_artist::Entity::find()
            .filter(event_artist::Column::EventId.eq(event_id))
            .find_also_related(artist::Entity)
            .order_by_asc(event_artist::Column::ArtistId)
            .all(db)
            .await?
            .into_iter()
            .filter_map(|(_, a)| a)
            .collect();

        Ok(Some(ProjectionRow {
            event,
            city,
            region,
            venue,
            organizer,
            genres,
            artists,
        }))
    }

    /// Archive events that already happened. Returns the archived ids so the
    /// caller can drop their projections.
    pub async fn archive_past<C: ConnectionTrait>(
        db: &C,
        today: NaiveDate,
    ) -> Result<Vec<i32>, RepositoryError> {
        let live = event::Entity::find()
            .filter(event::Column::Status.is_in(vec![
                EventStatus::Announced.as_str(),
                EventStatus::Confirmed.as_str(),
                EventStatus::Postponed.as_str(),
            ]))
            .all(db)
            .await?;

        let now = Utc::now();
        let mut archived = Vec::new();
        for event in live {
            let last_day = event.end_date.unwrap_or(event.start_date);
            if last_day >= today {
                continue;
            }
            let id = event.id;
            let mut active: event::ActiveModel = event.into();
            active.status = Set(EventStatus::Archived.as_str().to_string());
            active.updated_at = Set(now.into());
            active.update(db).await?;
            archived.push(id);
        }
        Ok(archived)
    }

    /// Events whose confidence has gone stale.
    pub async fn list_stale_confidence<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i32>, RepositoryError> {
        let rows = event::Entity::find()
            .filter(event::Column::Status.ne(EventStatus::Archived.as_str()))
            .filter(
                sea_orm::Condition::any()
                    .add(event::Column::LastVerifiedAt.is_null())
                    .add(event::Column::LastVerifiedAt.lt(cutoff)),
            )
            .order_by_asc(event::Column::Id)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(|e| e.id).collect())
    }
}
