//! Confidence scorer.
//!
//! Recomputes an event's confidence from its linked sources, field
//! completeness, cross-source agreement, verification recency, and the
//! primary source's historical accuracy:
//!
//! ```text
//! confidence = 0.35·R + 0.25·C + 0.20·A + 0.10·T + 0.10·H
//! ```

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::RepositoryError;
use crate::models::{event, EventStatus};
use crate::normalize::{fold, parse_event_date};
use crate::repositories::EventRepository;

const RELIABILITY_WEIGHT: f64 = 0.35;
const COMPLETENESS_WEIGHT: f64 = 0.25;
const AGREEMENT_WEIGHT: f64 = 0.20;
const RECENCY_WEIGHT: f64 = 0.10;
const HISTORY_WEIGHT: f64 = 0.10;

/// Reliability assumed for an event with no linked sources.
const NO_SOURCE_RELIABILITY: f64 = 0.3;
/// Neutral agreement when fewer than two sources can be compared.
const SINGLE_SOURCE_AGREEMENT: f64 = 0.5;
/// Default historical accuracy when the primary source has no track record.
const DEFAULT_HISTORY: f64 = 0.5;
/// Days after which recency decays to zero.
const RECENCY_HORIZON_DAYS: f64 = 90.0;

/// The five scored dimensions, separated for unit testing.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreInputs {
    pub max_reliability: Option<f64>,
    pub completeness: f64,
    pub agreement: f64,
    pub days_since_verified: f64,
    pub historical_accuracy: Option<f64>,
}

/// Combine the dimensions into a clamped [0, 1] confidence.
pub fn combine(inputs: &ScoreInputs) -> f64 {
    let reliability = inputs.max_reliability.unwrap_or(NO_SOURCE_RELIABILITY);
    let recency = (1.0 - inputs.days_since_verified / RECENCY_HORIZON_DAYS).max(0.0);
    let history = inputs.historical_accuracy.unwrap_or(DEFAULT_HISTORY);

    let score = RELIABILITY_WEIGHT * reliability
        + COMPLETENESS_WEIGHT * inputs.completeness
        + AGREEMENT_WEIGHT * inputs.agreement
        + RECENCY_WEIGHT * recency
        + HISTORY_WEIGHT * history;

    score.clamp(0.0, 1.0)
}

/// Field completeness: required fields weigh 0.7, optional fields 0.3.
pub fn completeness(event: &event::Model) -> f64 {
    let required = [
        !event.name.trim().is_empty(),
        true, // start_date is non-null by schema
        event.city_id > 0,
        EventStatus::parse(&event.status).is_some(),
    ];
    let optional = [
        event.end_date.is_some(),
        event.venue_id.is_some(),
        event.description.as_deref().is_some_and(|d| !d.is_empty()),
        event
            .official_website
            .as_deref()
            .is_some_and(|w| !w.is_empty()),
    ];

    let required_present = required.iter().filter(|p| **p).count() as f64;
    let optional_present = optional.iter().filter(|p| **p).count() as f64;

    0.7 * (required_present / required.len() as f64)
        + 0.3 * (optional_present / optional.len() as f64)
}

/// Cross-source agreement over {start date, venue name}.
///
/// Each attribute scores 1 when every source reporting it agrees (after
/// normalization), 0 otherwise; the result averages over attributes that at
/// least two sources carry. A single source, or no comparable attribute,
/// yields the neutral 0.5.
pub fn agreement(payloads: &[&JsonValue]) -> f64 {
    if payloads.len() < 2 {
        return SINGLE_SOURCE_AGREEMENT;
    }

    let dates: Vec<String> = payloads
        .iter()
        .filter_map(|p| payload_start_date(p))
        .collect();
    let venues: Vec<String> = payloads.iter().filter_map(|p| payload_venue(p)).collect();

    let mut scored = Vec::new();
    if dates.len() >= 2 {
        scored.push(all_equal(&dates));
    }
    if venues.len() >= 2 {
        scored.push(all_equal(&venues));
    }

    if scored.is_empty() {
        SINGLE_SOURCE_AGREEMENT
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    }
}

fn all_equal(values: &[String]) -> f64 {
    if values.windows(2).all(|w| w[0] == w[1]) {
        1.0
    } else {
        0.0
    }
}

/// Normalized start date reported by a raw source payload, if any.
fn payload_start_date(payload: &JsonValue) -> Option<String> {
    for key in ["start_date", "date"] {
        if let Some(raw) = payload.get(key).and_then(|v| v.as_str()) {
            if let Ok(date) = parse_event_date(raw) {
                return Some(date.format("%Y-%m-%d").to_string());
            }
        }
    }
    None
}

/// Normalized venue name reported by a raw source payload, if any.
fn payload_venue(payload: &JsonValue) -> Option<String> {
    for key in ["venue", "venue_name", "location"] {
        if let Some(raw) = payload.get(key).and_then(|v| v.as_str()) {
            let folded = fold(raw);
            if !folded.is_empty() {
                return Some(folded);
            }
        }
    }
    None
}

pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Recompute and persist an event's confidence. Returns the new score.
    pub async fn recompute<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
    ) -> Result<f64, RepositoryError> {
        let event = EventRepository::find_by_id(db, event_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("event", event_id))?;
        let linked = EventRepository::linked_sources(db, event_id).await?;

        let max_reliability = linked
            .iter()
            .map(|(_, src)| src.reliability_score)
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            });

        // Agreement compares distinct sources, not raw provenance rows: two
        // fetches of the same source are one voice. Later links win so each
        // source speaks with its freshest payload.
        let mut by_source: std::collections::BTreeMap<i32, &JsonValue> =
            std::collections::BTreeMap::new();
        for (link, src) in &linked {
            by_source.insert(src.id, &link.raw_payload);
        }
        let payloads: Vec<&JsonValue> = by_source.into_values().collect();

        let now = Utc::now();
        let verified_reference = event
            .last_verified_at
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| event.created_at.with_timezone(&Utc));
        let days_since_verified =
            (now - verified_reference).num_seconds().max(0) as f64 / 86_400.0;

        let historical_accuracy = linked
            .first()
            .and_then(|(_, src)| src.historical_accuracy);

        let inputs = ScoreInputs {
            max_reliability,
            completeness: completeness(&event),
            agreement: agreement(&payloads),
            days_since_verified,
            historical_accuracy,
        };
        let score = combine(&inputs);

        debug!(event_id, score, "recomputed confidence");

        let mut active: event::ActiveModel = event.into();
        active.confidence_score = Set(score);
        active.last_verified_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(db).await?;

        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn combine_stays_in_bounds() {
        let full = ScoreInputs {
            max_reliability: Some(1.0),
            completeness: 1.0,
            agreement: 1.0,
            days_since_verified: 0.0,
            historical_accuracy: Some(1.0),
        };
        assert!((combine(&full) - 1.0).abs() < 1e-9);

        let empty = ScoreInputs {
            max_reliability: None,
            completeness: 0.0,
            agreement: 0.0,
            days_since_verified: 400.0,
            historical_accuracy: None,
        };
        let score = combine(&empty);
        assert!(score > 0.0 && score < 0.3, "score was {score}");
    }

    #[test]
    fn combine_matches_formula() {
        // The S1 shape: one 0.8-reliability source, neutral agreement and
        // history, fresh verification.
        let inputs = ScoreInputs {
            max_reliability: Some(0.8),
            completeness: 0.7,
            agreement: 0.5,
            days_since_verified: 0.0,
            historical_accuracy: None,
        };
        let expected = 0.35 * 0.8 + 0.25 * 0.7 + 0.20 * 0.5 + 0.10 * 1.0 + 0.10 * 0.5;
        assert!((combine(&inputs) - expected).abs() < 1e-9);
    }

    #[test]
    fn recency_decays_to_zero_at_horizon() {
        let at = |days: f64| ScoreInputs {
            max_reliability: Some(0.0),
            completeness: 0.0,
            agreement: 0.0,
            days_since_verified: days,
            historical_accuracy: Some(0.0),
        };
        assert!(combine(&at(0.0)) > combine(&at(45.0)));
        assert!((combine(&at(90.0)) - 0.0).abs() < 1e-9);
        assert!((combine(&at(200.0)) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn single_source_agreement_is_neutral() {
        let payload = json!({"start_date": "2025-06-26"});
        assert_eq!(agreement(&[&payload]), 0.5);
        assert_eq!(agreement(&[]), 0.5);
    }

    #[test]
    fn agreeing_sources_score_one() {
        let a = json!({"start_date": "2025-06-26", "venue": "Scène Moulay Hassan"});
        let b = json!({"date": "26 June 2025", "venue": "scene moulay hassan"});
        assert_eq!(agreement(&[&a, &b]), 1.0);
    }

    #[test]
    fn disagreeing_dates_score_zero_for_that_attribute() {
        let a = json!({"start_date": "2025-06-26"});
        let b = json!({"start_date": "2025-06-27"});
        assert_eq!(agreement(&[&a, &b]), 0.0);

        // One attribute agrees, one does not: averaged.
        let c = json!({"start_date": "2025-06-26", "venue": "Dar Souiri"});
        let d = json!({"start_date": "2025-06-27", "venue": "Dar Souiri"});
        assert_eq!(agreement(&[&c, &d]), 0.5);
    }

    #[test]
    fn incomparable_payloads_are_neutral() {
        let a = json!({"start_date": "2025-06-26"});
        let b = json!({"venue": "Dar Souiri"});
        assert_eq!(agreement(&[&a, &b]), 0.5);
    }
}
