//! Search projection types and the engine-facing contract.
//!
//! The search collection holds a fixed, denormalized projection of the
//! event catalog. The synchronizer is its only writer, and never reads it
//! back to make decisions about the authoritative store.

pub mod sync;
pub mod typesense;

pub use sync::ProjectionSynchronizer;
pub use typesense::TypesenseClient;

use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::SearchError;
use crate::repositories::ProjectionRow;

/// Name of the single collection the synchronizer owns.
pub const COLLECTION_NAME: &str = "events";

/// Batch size for full rebuild imports.
pub const IMPORT_BATCH_SIZE: usize = 100;

/// Sort expression for the default listing.
pub const SORT_DEFAULT: &str = "start_date:asc";
/// Sort expression for text relevance.
pub const SORT_RELEVANCE: &str = "_text_match:desc,start_date:asc";
/// Sort expression for cultural significance.
pub const SORT_SIGNIFICANCE: &str = "is_pinned:desc,cultural_significance:desc,start_date:asc";

/// The read-optimized document shape. Date-like fields are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDocument {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    pub year: i32,
    pub month: i32,
    pub city_id: i32,
    pub region_id: i32,
    pub city_name: String,
    pub region_name: String,
    pub city_slug: String,
    pub region_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<[f64; 2]>,
    pub genres: Vec<String>,
    pub genre_slugs: Vec<String>,
    pub artists: Vec<String>,
    pub artist_slugs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_website: Option<String>,
    pub status: String,
    pub confidence_score: f32,
    pub is_verified: bool,
    pub is_pinned: bool,
    pub cultural_significance: i32,
    pub has_tickets: bool,
    pub updated_at: i64,
}

/// Materialize the denormalized document from an event and its joined
/// reference rows. This is the only place denormalization happens.
pub fn transform(row: &ProjectionRow) -> EventDocument {
    let event = &row.event;
    let start = event
        .start_date
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc();
    let end = event
        .end_date
        .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc());

    // Venue coordinates win over the city centroid when present.
    let geo_location = row
        .venue
        .as_ref()
        .and_then(|v| v.latitude.zip(v.longitude))
        .or_else(|| row.city.latitude.zip(row.city.longitude))
        .map(|(lat, lng)| [lat, lng]);

    EventDocument {
        id: event.id.to_string(),
        name: event.name.clone(),
        slug: event.slug.clone(),
        event_type: event.event_type.clone(),
        description: event.description.clone(),
        start_date: start.timestamp(),
        end_date: end.map(|e| e.timestamp()),
        year: event.start_date.year(),
        month: event.start_date.month() as i32,
        city_id: row.city.id,
        region_id: row.region.id,
        city_name: row.city.name.clone(),
        region_name: row.region.name.clone(),
        city_slug: row.city.slug.clone(),
        region_slug: row.region.slug.clone(),
        venue_name: row.venue.as_ref().map(|v| v.name.clone()),
        venue_slug: row.venue.as_ref().map(|v| v.slug.clone()),
        geo_location,
        genres: row.genres.iter().map(|g| g.name.clone()).collect(),
        genre_slugs: row.genres.iter().map(|g| g.slug.clone()).collect(),
        artists: row.artists.iter().map(|a| a.name.clone()).collect(),
        artist_slugs: row.artists.iter().map(|a| a.slug.clone()).collect(),
        organizer_name: row.organizer.as_ref().map(|o| o.name.clone()),
        official_website: event.official_website.clone(),
        status: event.status.clone(),
        confidence_score: event.confidence_score as f32,
        is_verified: event.is_verified,
        is_pinned: event.is_pinned,
        cultural_significance: event.cultural_significance,
        has_tickets: event.ticket_url.is_some(),
        updated_at: event.updated_at.timestamp(),
    }
}

/// Declarative collection schema, in the engine's wire format.
pub fn collection_schema() -> JsonValue {
    json!({
        "name": COLLECTION_NAME,
        "default_sorting_field": "start_date",
        "token_separators": ["-", "/"],
        "symbols_to_index": ["&"],
        "fields": [
            {"name": "name", "type": "string", "infix": true},
            {"name": "slug", "type": "string", "index": false, "optional": true},
            {"name": "event_type", "type": "string", "facet": true},
            {"name": "description", "type": "string", "optional": true},
            {"name": "start_date", "type": "int64", "facet": true},
            {"name": "end_date", "type": "int64", "optional": true},
            {"name": "year", "type": "int32", "facet": true},
            {"name": "month", "type": "int32", "facet": true},
            {"name": "city_id", "type": "int32", "facet": true},
            {"name": "region_id", "type": "int32", "facet": true},
            {"name": "city_name", "type": "string", "facet": true},
            {"name": "region_name", "type": "string", "facet": true},
            {"name": "city_slug", "type": "string", "index": false, "optional": true},
            {"name": "region_slug", "type": "string", "index": false, "optional": true},
            {"name": "venue_name", "type": "string", "optional": true},
            {"name": "venue_slug", "type": "string", "index": false, "optional": true},
            {"name": "geo_location", "type": "geopoint", "optional": true},
            {"name": "genres", "type": "string[]", "facet": true},
            {"name": "genre_slugs", "type": "string[]", "facet": true},
            {"name": "artists", "type": "string[]", "infix": true},
            {"name": "artist_slugs", "type": "string[]", "index": false, "optional": true},
            {"name": "organizer_name", "type": "string", "optional": true},
            {"name": "official_website", "type": "string", "index": false, "optional": true},
            {"name": "status", "type": "string", "facet": true},
            {"name": "confidence_score", "type": "float"},
            {"name": "is_verified", "type": "bool", "facet": true},
            {"name": "is_pinned", "type": "bool"},
            {"name": "cultural_significance", "type": "int32"},
            {"name": "has_tickets", "type": "bool", "facet": true},
            {"name": "updated_at", "type": "int64"}
        ]
    })
}

/// The search engine daemon, behind a thin interface.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, schema: &JsonValue) -> Result<(), SearchError>;

    /// Drop the collection. Absent collections are fine.
    async fn drop_collection(&self, name: &str) -> Result<(), SearchError>;

    /// Batch upsert. Returns one result per document, in order.
    async fn import_batch(
        &self,
        collection: &str,
        documents: &[EventDocument],
    ) -> Result<Vec<Result<(), String>>, SearchError>;

    /// Upsert a single document.
    async fn upsert_document(
        &self,
        collection: &str,
        document: &EventDocument,
    ) -> Result<(), SearchError>;

    /// Delete by id. Missing documents are swallowed.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), SearchError>;

    /// Liveness of the daemon.
    async fn health(&self) -> Result<bool, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_every_document_field() {
        let schema = collection_schema();
        let fields: Vec<&str> = schema["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();

        for expected in [
            "name",
            "event_type",
            "start_date",
            "year",
            "month",
            "city_id",
            "region_id",
            "genres",
            "artists",
            "status",
            "confidence_score",
            "is_verified",
            "has_tickets",
            "geo_location",
            "updated_at",
        ] {
            assert!(fields.contains(&expected), "schema missing {expected}");
        }
        assert_eq!(schema["default_sorting_field"], "start_date");
    }

    #[test]
    fn facet_flags_match_the_contract() {
        let schema = collection_schema();
        let facet = |name: &str| {
            schema["fields"]
                .as_array()
                .unwrap()
                .iter()
                .find(|f| f["name"] == name)
                .and_then(|f| f["facet"].as_bool())
                .unwrap_or(false)
        };
        for faceted in ["event_type", "year", "month", "city_name", "status", "genres"] {
            assert!(facet(faceted), "{faceted} should be facetable");
        }
        for plain in ["name", "artists", "cultural_significance"] {
            assert!(!facet(plain), "{plain} should not be facetable");
        }
    }
}
