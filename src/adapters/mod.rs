//! Source adapters.
//!
//! Every source type implements the same two-operation contract: fetch raw
//! records since a cursor, and normalize one raw record into a candidate.
//! Adapters are idempotent on re-fetch: the same upstream record always
//! normalizes to the same candidate, modulo `fetched_at`.

pub mod json_api;
pub mod registry;
pub mod spreadsheet;
pub mod trait_;

pub use json_api::JsonApiAdapter;
pub use registry::AdapterRegistry;
pub use spreadsheet::SpreadsheetAdapter;
pub use trait_::{AdapterError, SourceAdapter};

use serde_json::Value as JsonValue;

use crate::models::{EventType, NormalizedEvent};
use crate::normalize::{normalize_name, parse_event_date, CityMatcher, DateParseError};

/// Upper bound on event names accepted from any source.
pub const MAX_NAME_LEN: usize = 300;

fn string_field<'a>(payload: &'a JsonValue, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn string_list(payload: &JsonValue, keys: &[&str]) -> Vec<String> {
    for key in keys {
        if let Some(items) = payload.get(*key).and_then(|v| v.as_array()) {
            return items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    Vec::new()
}

/// Shared payload-to-candidate normalization used by the JSON API adapter
/// and the manual import path. City matching is fuzzy and never guesses;
/// unmatched cities come back with `city_id: None`.
pub fn normalize_payload(
    payload: &JsonValue,
    matcher: &CityMatcher,
) -> Result<NormalizedEvent, AdapterError> {
    let name = string_field(payload, &["name", "title"])
        .ok_or_else(|| AdapterError::Validation("missing event name".to_string()))?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AdapterError::Validation(format!(
            "event name exceeds {MAX_NAME_LEN} characters"
        )));
    }

    let event_type_raw = string_field(payload, &["event_type", "type"])
        .ok_or_else(|| AdapterError::Validation("missing event_type".to_string()))?;
    let event_type = EventType::parse(event_type_raw).ok_or_else(|| {
        AdapterError::Validation(format!("unknown event_type '{event_type_raw}'"))
    })?;

    let start_raw = string_field(payload, &["start_date", "date"])
        .ok_or_else(|| AdapterError::Validation("missing start_date".to_string()))?;
    let start_date = parse_event_date(start_raw).map_err(|err| match err {
        DateParseError::Ambiguous(_) => AdapterError::Validation(err.to_string()),
        _ => AdapterError::Parse(err.to_string()),
    })?;

    let end_date = match string_field(payload, &["end_date"]) {
        Some(raw) => {
            let parsed = parse_event_date(raw).map_err(|err| AdapterError::Parse(err.to_string()))?;
            if parsed < start_date {
                return Err(AdapterError::Validation(
                    "end_date precedes start_date".to_string(),
                ));
            }
            Some(parsed)
        }
        None => None,
    };

    let city_raw = string_field(payload, &["city"])
        .ok_or_else(|| AdapterError::Validation("missing city".to_string()))?;
    let matched = matcher.match_city(city_raw);

    Ok(NormalizedEvent {
        name: name.to_string(),
        normalized_name: normalize_name(name),
        event_type,
        description: string_field(payload, &["description"]).map(str::to_string),
        start_date,
        end_date,
        city_raw: city_raw.to_string(),
        city_id: matched.map(|c| c.id),
        region_id: matched.map(|c| c.region_id),
        venue_name: string_field(payload, &["venue", "venue_name"]).map(str::to_string),
        organizer_name: string_field(payload, &["organizer", "organizer_name"]).map(str::to_string),
        official_website: string_field(payload, &["official_website", "website"])
            .map(str::to_string),
        ticket_url: string_field(payload, &["ticket_url", "tickets"]).map(str::to_string),
        genres: string_list(payload, &["genres"]),
        artists: string_list(payload, &["artists", "lineup"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{slugify, CityRef};
    use serde_json::json;

    fn matcher() -> CityMatcher {
        CityMatcher::new(vec![(
            CityRef {
                id: 7,
                region_id: 3,
                name: "Essaouira".to_string(),
                slug: slugify("Essaouira"),
                latitude: Some(31.51),
                longitude: Some(-9.77),
            },
            vec![],
        )])
    }

    #[test]
    fn full_payload_normalizes() {
        let payload = json!({
            "name": "Festival Gnaoua et Musiques du Monde 2025",
            "event_type": "festival",
            "start_date": "2025-06-26",
            "end_date": "2025-06-28",
            "city": "Essaouira",
            "venue": "Scène Moulay Hassan",
            "website": "https://www.festival-gnaoua.net",
            "genres": ["gnaoua", "jazz"],
            "artists": ["Maalem Hamid El Kasri"]
        });

        let normalized = normalize_payload(&payload, &matcher()).unwrap();
        assert_eq!(normalized.normalized_name, "gnaoua et musiques du monde");
        assert_eq!(normalized.city_id, Some(7));
        assert_eq!(normalized.region_id, Some(3));
        assert_eq!(normalized.genres, vec!["gnaoua", "jazz"]);
    }

    #[test]
    fn unknown_city_is_kept_not_guessed() {
        let payload = json!({
            "name": "Concert X",
            "event_type": "concert",
            "start_date": "2025-06-26",
            "city": "Atlantis"
        });
        let normalized = normalize_payload(&payload, &matcher()).unwrap();
        assert_eq!(normalized.city_id, None);
        assert_eq!(normalized.city_raw, "Atlantis");
    }

    #[test]
    fn missing_required_fields_are_validation_errors() {
        let matcher = matcher();
        for payload in [
            json!({"event_type": "concert", "start_date": "2025-06-26", "city": "Essaouira"}),
            json!({"name": "X", "start_date": "2025-06-26", "city": "Essaouira"}),
            json!({"name": "X", "event_type": "concert", "city": "Essaouira"}),
            json!({"name": "X", "event_type": "concert", "start_date": "2025-06-26"}),
            json!({"name": "X", "event_type": "rave", "start_date": "2025-06-26", "city": "Essaouira"}),
        ] {
            assert!(matches!(
                normalize_payload(&payload, &matcher),
                Err(AdapterError::Validation(_))
            ));
        }
    }

    #[test]
    fn ambiguous_date_fails_closed_as_validation() {
        let payload = json!({
            "name": "X",
            "event_type": "concert",
            "start_date": "03/04/2025",
            "city": "Essaouira"
        });
        assert!(matches!(
            normalize_payload(&payload, &matcher()),
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let payload = json!({
            "name": "X",
            "event_type": "concert",
            "start_date": "2025-06-26",
            "end_date": "2025-06-20",
            "city": "Essaouira"
        });
        assert!(matches!(
            normalize_payload(&payload, &matcher()),
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn oversized_name_is_rejected() {
        let payload = json!({
            "name": "x".repeat(MAX_NAME_LEN + 1),
            "event_type": "concert",
            "start_date": "2025-06-26",
            "city": "Essaouira"
        });
        assert!(matches!(
            normalize_payload(&payload, &matcher()),
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn normalization_is_idempotent_per_payload() {
        let payload = json!({
            "name": "Festival Timitar",
            "event_type": "festival",
            "start_date": "2025-07-02",
            "city": "Essaouira"
        });
        let m = matcher();
        assert_eq!(
            normalize_payload(&payload, &m).unwrap(),
            normalize_payload(&payload, &m).unwrap()
        );
    }
}
