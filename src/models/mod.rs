//! # Data Models
//!
//! SeaORM entities for the authoritative store plus the shared domain enums
//! and the normalized candidate shape exchanged between adapters, resolver,
//! and merge writer.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod artist;
pub mod candidate;
pub mod city;
pub mod editorial_action;
pub mod event;
pub mod event_artist;
pub mod event_genre;
pub mod event_snapshot;
pub mod event_source;
pub mod fingerprint;
pub mod genre;
pub mod organizer;
pub mod region;
pub mod source;
pub mod venue;

pub use artist::Entity as Artist;
pub use candidate::Entity as Candidate;
pub use city::Entity as City;
pub use editorial_action::Entity as EditorialAction;
pub use event::Entity as Event;
pub use event_artist::Entity as EventArtist;
pub use event_genre::Entity as EventGenre;
pub use event_snapshot::Entity as EventSnapshot;
pub use event_source::Entity as EventSource;
pub use fingerprint::Entity as Fingerprint;
pub use genre::Entity as Genre;
pub use organizer::Entity as Organizer;
pub use region::Entity as Region;
pub use source::Entity as Source;
pub use venue::Entity as Venue;

/// The fixed set of event types the catalog accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Festival,
    Concert,
    Showcase,
    Ritual,
    Conference,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Festival => "festival",
            EventType::Concert => "concert",
            EventType::Showcase => "showcase",
            EventType::Ritual => "ritual",
            EventType::Conference => "conference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "festival" => Some(EventType::Festival),
            "concert" => Some(EventType::Concert),
            "showcase" => Some(EventType::Showcase),
            "ritual" => Some(EventType::Ritual),
            "conference" => Some(EventType::Conference),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event lifecycle status. `Archived` is terminal for visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Announced,
    Confirmed,
    Cancelled,
    Postponed,
    Archived,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventStatus::Announced => "announced",
            EventStatus::Confirmed => "confirmed",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Postponed => "postponed",
            EventStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "announced" => Some(EventStatus::Announced),
            "confirmed" => Some(EventStatus::Confirmed),
            "cancelled" => Some(EventStatus::Cancelled),
            "postponed" => Some(EventStatus::Postponed),
            "archived" => Some(EventStatus::Archived),
            _ => None,
        }
    }

    /// Only these statuses are projected into the search collection.
    pub fn is_indexable(self) -> bool {
        matches!(self, EventStatus::Announced | EventStatus::Confirmed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of producer behind a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Api,
    Scraper,
    Manual,
    Spreadsheet,
}

impl SourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceType::Api => "api",
            SourceType::Scraper => "scraper",
            SourceType::Manual => "manual",
            SourceType::Spreadsheet => "spreadsheet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "api" => Some(SourceType::Api),
            "scraper" => Some(SourceType::Scraper),
            "manual" => Some(SourceType::Manual),
            "spreadsheet" => Some(SourceType::Spreadsheet),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution outcome recorded on a processed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOutcome {
    Created,
    Merged,
    Review,
}

impl CandidateOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            CandidateOutcome::Created => "created",
            CandidateOutcome::Merged => "merged",
            CandidateOutcome::Review => "review",
        }
    }
}

impl fmt::Display for CandidateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staged, normalized inbound record, serialized into the candidate row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedEvent {
    /// Name as supplied by the source, trimmed.
    pub name: String,
    /// Canonical form produced by the text normalizer.
    pub normalized_name: String,
    pub event_type: EventType,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// City as supplied, kept for editorial triage when matching fails.
    pub city_raw: String,
    pub city_id: Option<i32>,
    pub region_id: Option<i32>,
    pub venue_name: Option<String>,
    pub organizer_name: Option<String>,
    pub official_website: Option<String>,
    pub ticket_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
}

/// A record as fetched from a source, before normalization.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub external_id: Option<String>,
    pub source_url: Option<String>,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}
