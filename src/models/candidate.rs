//! Candidate entity model: the durable staging area for normalized inbound
//! records prior to resolution.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::NormalizedEvent;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "candidates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub source_id: i32,
    pub external_id: Option<String>,
    pub source_url: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_payload: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub normalized: JsonValue,
    pub processed: bool,
    pub outcome: Option<String>,
    pub matched_event_id: Option<i32>,
    pub match_confidence: Option<f64>,
    pub ingested_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Deserialize the stored normalized record.
    pub fn normalized_event(&self) -> Result<NormalizedEvent, serde_json::Error> {
        serde_json::from_value(self.normalized.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::source::Entity",
        from = "Column::SourceId",
        to = "super::source::Column::Id"
    )]
    Source,
}

impl Related<super::source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Source.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
