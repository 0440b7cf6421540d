//! Source entity model.
//!
//! A named producer of event records. Reliability governs both confidence
//! scoring and overwrite precedence on merge; `last_fetch_at` is the fetch
//! cursor, advanced only after a clean fetch stage.

use sea_orm::entity::prelude::*;

use super::SourceType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sources")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub source_type: String,
    pub reliability_score: f64,
    /// Long-term accuracy of this source's past records, when known.
    pub historical_accuracy: Option<f64>,
    pub is_active: bool,
    pub endpoint: Option<String>,
    pub last_fetch_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn source_type(&self) -> Option<SourceType> {
        SourceType::parse(&self.source_type)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_source::Entity")]
    EventSources,
    #[sea_orm(has_many = "super::candidate::Entity")]
    Candidates,
}

impl Related<super::event_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventSources.def()
    }
}

impl Related<super::candidate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Candidates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
