//! Event entity model.
//!
//! The canonical catalog record. Events are created by the merge writer on a
//! resolver `create` decision and mutated by the merge writer, the
//! confidence scorer, and the editorial handler. They are never hard-deleted
//! outside of an editorial merge; `archived` is terminal for visibility.

use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::{EventStatus, EventType};

#[derive(Clone, Debug, PartialEq, Serialize, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Short URL-safe identifier, unique across non-archived events.
    pub slug: String,
    pub name: String,
    pub event_type: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub city_id: i32,
    pub region_id: i32,
    pub venue_id: Option<i32>,
    pub organizer_id: Option<i32>,
    pub official_website: Option<String>,
    pub ticket_url: Option<String>,
    pub status: String,
    pub is_verified: bool,
    pub is_pinned: bool,
    pub cultural_significance: i32,
    pub confidence_score: f64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub last_verified_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn status(&self) -> Option<EventStatus> {
        EventStatus::parse(&self.status)
    }

    pub fn event_type(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }

    pub fn is_indexable(&self) -> bool {
        self.status().map(EventStatus::is_indexable).unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::city::Entity",
        from = "Column::CityId",
        to = "super::city::Column::Id"
    )]
    City,
    #[sea_orm(
        belongs_to = "super::region::Entity",
        from = "Column::RegionId",
        to = "super::region::Column::Id"
    )]
    Region,
    #[sea_orm(
        belongs_to = "super::venue::Entity",
        from = "Column::VenueId",
        to = "super::venue::Column::Id"
    )]
    Venue,
    #[sea_orm(
        belongs_to = "super::organizer::Entity",
        from = "Column::OrganizerId",
        to = "super::organizer::Column::Id"
    )]
    Organizer,
    #[sea_orm(has_many = "super::event_source::Entity")]
    EventSources,
    #[sea_orm(has_many = "super::fingerprint::Entity")]
    Fingerprints,
}

impl Related<super::city::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::City.def()
    }
}

impl Related<super::region::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Region.def()
    }
}

impl Related<super::venue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Venue.def()
    }
}

impl Related<super::organizer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organizer.def()
    }
}

impl Related<super::event_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventSources.def()
    }
}

impl Related<super::fingerprint::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fingerprints.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
