//! Deduplication resolver.
//!
//! Maps a normalized candidate to one of {create, merge, review} against the
//! authoritative store by walking the fingerprint kinds in priority order.
//! The resolver is strictly read-only; applying its decision is the merge
//! writer's job.

use chrono::NaiveDate;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::debug;

use crate::error::RepositoryError;
use crate::fingerprint::{FingerprintKind, FingerprintSet};
use crate::models::{event, venue, NormalizedEvent};
use crate::normalize::{fold, normalize_name};
use crate::repositories::{EventRepository, FingerprintRepository};

/// Confidence assigned to an exact fingerprint hit.
const EXACT_CONFIDENCE: f64 = 0.95;
/// Weighted similarity at or above which a fuzzy-name hit merges.
const FUZZY_MERGE_THRESHOLD: f64 = 0.85;
/// Jaro-Winkler at or above which a date+location hit goes to review.
const REVIEW_THRESHOLD: f64 = 0.70;
/// Confidence for create decisions on candidates with no resolvable city.
const UNKNOWN_CITY_CONFIDENCE: f64 = 0.3;

const NAME_WEIGHT: f64 = 0.40;
const DATE_WEIGHT: f64 = 0.30;
const LOCATION_WEIGHT: f64 = 0.20;
const VENUE_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverAction {
    Create,
    Merge,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    FuzzyName,
    DateLocation,
    None,
}

/// The resolver's verdict for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct DeduplicationResult {
    pub action: ResolverAction,
    pub existing_event_id: Option<i32>,
    pub confidence: f64,
    pub match_type: MatchType,
}

/// Date proximity score: identical 1.0, within a day 0.8, within a week 0.5.
pub fn date_score(a: NaiveDate, b: NaiveDate) -> f64 {
    let days = (a - b).num_days().abs();
    match days {
        0 => 1.0,
        1 => 0.8,
        2..=7 => 0.5,
        _ => 0.0,
    }
}

/// Venue score: equal 1.0, both present but different 0.0, either unknown 0.5.
pub fn venue_score(candidate_venue: Option<&str>, event_venue: Option<&str>) -> f64 {
    match (candidate_venue, event_venue) {
        (Some(a), Some(b)) => {
            if fold(a) == fold(b) {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.5,
    }
}

/// Weighted similarity between a candidate and an existing event.
pub fn weighted_similarity(
    candidate: &NormalizedEvent,
    event_normalized_name: &str,
    event_start: NaiveDate,
    event_city_id: i32,
    event_venue_name: Option<&str>,
) -> f64 {
    let name = strsim::jaro_winkler(&candidate.normalized_name, event_normalized_name);
    let date = date_score(candidate.start_date, event_start);
    let location = if candidate.city_id == Some(event_city_id) {
        1.0
    } else {
        0.0
    };
    let venue = venue_score(candidate.venue_name.as_deref(), event_venue_name);

    NAME_WEIGHT * name + DATE_WEIGHT * date + LOCATION_WEIGHT * location + VENUE_WEIGHT * venue
}

/// A bucket entry with everything needed for deterministic ordering.
struct ScoredEvent {
    event_id: i32,
    similarity: f64,
    best_reliability: f64,
    created_at: chrono::DateTime<chrono::FixedOffset>,
}

pub struct DeduplicationResolver;

impl DeduplicationResolver {
    /// Resolve one candidate against the current fingerprint view.
    pub async fn resolve<C: ConnectionTrait>(
        db: &C,
        candidate: &NormalizedEvent,
        fingerprints: &FingerprintSet,
    ) -> Result<DeduplicationResult, RepositoryError> {
        if candidate.city_id.is_none() {
            // No city means no fingerprints; the record can only surface as a
            // low-confidence create for editorial attention.
            return Ok(DeduplicationResult {
                action: ResolverAction::Create,
                existing_event_id: None,
                confidence: UNKNOWN_CITY_CONFIDENCE,
                match_type: MatchType::None,
            });
        }

        // 1. Exact fingerprint.
        if let Some(hash) = &fingerprints.exact {
            let ids = FingerprintRepository::events_matching(db, FingerprintKind::Exact, hash).await?;
            if let Some(winner) = Self::break_tie(db, &ids).await? {
                debug!(event_id = winner, "exact fingerprint hit");
                return Ok(DeduplicationResult {
                    action: ResolverAction::Merge,
                    existing_event_id: Some(winner),
                    confidence: EXACT_CONFIDENCE,
                    match_type: MatchType::Exact,
                });
            }
        }

        // 2. Fuzzy-name stage with weighted similarity. Every fuzzy_name
        // hash implies the same date_location hash, so the stage scans both
        // buckets: fuzzy_name first for the cheap high-precision hit, then
        // the wider same-day-same-city bucket.
        let mut fuzzy_ids = Vec::new();
        if let Some(hash) = &fingerprints.fuzzy_name {
            fuzzy_ids.extend(
                FingerprintRepository::events_matching(db, FingerprintKind::FuzzyName, hash)
                    .await?,
            );
        }
        if let Some(hash) = &fingerprints.date_location {
            for id in
                FingerprintRepository::events_matching(db, FingerprintKind::DateLocation, hash)
                    .await?
            {
                if !fuzzy_ids.contains(&id) {
                    fuzzy_ids.push(id);
                }
            }
        }
        if !fuzzy_ids.is_empty() {
            let scored = Self::score_bucket(db, candidate, &fuzzy_ids, true).await?;
            if let Some(best) = scored
                .into_iter()
                .find(|s| s.similarity >= FUZZY_MERGE_THRESHOLD)
            {
                debug!(
                    event_id = best.event_id,
                    similarity = best.similarity,
                    "fuzzy name merge"
                );
                return Ok(DeduplicationResult {
                    action: ResolverAction::Merge,
                    existing_event_id: Some(best.event_id),
                    confidence: best.similarity,
                    match_type: MatchType::FuzzyName,
                });
            }
        }

        // 3. Same-city nearby-date stage: the week bucket catches records
        // whose dates disagree. Close names need a human decision.
        let mut nearby_ids = Vec::new();
        for (kind, hash) in [
            (FingerprintKind::DateLocation, &fingerprints.date_location),
            (FingerprintKind::WeekLocation, &fingerprints.week_location),
        ] {
            if let Some(hash) = hash {
                for id in FingerprintRepository::events_matching(db, kind, hash).await? {
                    if !nearby_ids.contains(&id) {
                        nearby_ids.push(id);
                    }
                }
            }
        }
        if !nearby_ids.is_empty() {
            let scored = Self::score_bucket(db, candidate, &nearby_ids, false).await?;
            if let Some(best) = scored
                .into_iter()
                .find(|s| s.similarity >= REVIEW_THRESHOLD)
            {
                debug!(
                    event_id = best.event_id,
                    similarity = best.similarity,
                    "date+location review"
                );
                return Ok(DeduplicationResult {
                    action: ResolverAction::Review,
                    existing_event_id: Some(best.event_id),
                    confidence: best.similarity,
                    match_type: MatchType::DateLocation,
                });
            }
        }

        Ok(DeduplicationResult {
            action: ResolverAction::Create,
            existing_event_id: None,
            confidence: 1.0,
            match_type: MatchType::None,
        })
    }

    /// Score every event in a fingerprint bucket and order it: similarity
    /// descending, then best source reliability descending, then earliest
    /// created_at, then id.
    async fn score_bucket<C: ConnectionTrait>(
        db: &C,
        candidate: &NormalizedEvent,
        event_ids: &[i32],
        weighted: bool,
    ) -> Result<Vec<ScoredEvent>, RepositoryError> {
        let mut scored = Vec::with_capacity(event_ids.len());
        for &event_id in event_ids {
            let Some(event) = EventRepository::find_by_id(db, event_id).await? else {
                continue;
            };
            let event_norm = normalize_name(&event.name);
            let similarity = if weighted {
                let venue_name = Self::venue_name(db, &event).await?;
                weighted_similarity(
                    candidate,
                    &event_norm,
                    event.start_date,
                    event.city_id,
                    venue_name.as_deref(),
                )
            } else {
                strsim::jaro_winkler(&candidate.normalized_name, &event_norm)
            };
            let best_reliability = EventRepository::best_source_reliability(db, event_id)
                .await?
                .unwrap_or(0.0);
            scored.push(ScoredEvent {
                event_id,
                similarity,
                best_reliability,
                created_at: event.created_at,
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.best_reliability
                        .partial_cmp(&a.best_reliability)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.created_at.cmp(&b.created_at))
                .then(a.event_id.cmp(&b.event_id))
        });
        Ok(scored)
    }

    /// Exact-bucket tie break: highest source reliability, then earliest
    /// created_at, then id.
    async fn break_tie<C: ConnectionTrait>(
        db: &C,
        event_ids: &[i32],
    ) -> Result<Option<i32>, RepositoryError> {
        if event_ids.is_empty() {
            return Ok(None);
        }
        if event_ids.len() == 1 {
            return Ok(Some(event_ids[0]));
        }

        let mut contenders = Vec::with_capacity(event_ids.len());
        for &event_id in event_ids {
            let Some(event) = EventRepository::find_by_id(db, event_id).await? else {
                continue;
            };
            let best_reliability = EventRepository::best_source_reliability(db, event_id)
                .await?
                .unwrap_or(0.0);
            contenders.push((event_id, best_reliability, event.created_at));
        }

        contenders.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });
        Ok(contenders.first().map(|(id, _, _)| *id))
    }

    async fn venue_name<C: ConnectionTrait>(
        db: &C,
        event: &event::Model,
    ) -> Result<Option<String>, RepositoryError> {
        use sea_orm::EntityTrait;
        Ok(match event.venue_id {
            Some(id) => venue::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(|v| v.name),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn candidate(name: &str, start: &str, city: Option<i32>, venue: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            name: name.to_string(),
            normalized_name: normalize_name(name),
            event_type: EventType::Festival,
            description: None,
            start_date: date(start),
            end_date: None,
            city_raw: "Essaouira".to_string(),
            city_id: city,
            region_id: city.map(|_| 1),
            venue_name: venue.map(str::to_string),
            organizer_name: None,
            official_website: None,
            ticket_url: None,
            genres: vec![],
            artists: vec![],
        }
    }

    #[test]
    fn date_score_steps() {
        assert_eq!(date_score(date("2025-06-26"), date("2025-06-26")), 1.0);
        assert_eq!(date_score(date("2025-06-26"), date("2025-06-27")), 0.8);
        assert_eq!(date_score(date("2025-06-26"), date("2025-07-01")), 0.5);
        assert_eq!(date_score(date("2025-06-26"), date("2025-08-01")), 0.0);
    }

    #[test]
    fn venue_score_handles_unknowns() {
        assert_eq!(venue_score(Some("Scène Moulay Hassan"), Some("scene moulay hassan")), 1.0);
        assert_eq!(venue_score(Some("Scène Plage"), Some("Dar Souiri")), 0.0);
        assert_eq!(venue_score(None, Some("Dar Souiri")), 0.5);
        assert_eq!(venue_score(Some("Dar Souiri"), None), 0.5);
        assert_eq!(venue_score(None, None), 0.5);
    }

    #[test]
    fn identical_records_score_above_merge_threshold() {
        let c = candidate("Festival Gnaoua 2025", "2025-06-26", Some(7), None);
        let sim = weighted_similarity(&c, "gnaoua", date("2025-06-26"), 7, None);
        assert!(sim > FUZZY_MERGE_THRESHOLD, "similarity was {sim}");
    }

    #[test]
    fn city_mismatch_drags_similarity_down() {
        let c = candidate("Festival Gnaoua 2025", "2025-06-26", Some(7), None);
        let same_city = weighted_similarity(&c, "gnaoua", date("2025-06-26"), 7, None);
        let other_city = weighted_similarity(&c, "gnaoua", date("2025-06-26"), 8, None);
        assert!((same_city - other_city - LOCATION_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn unrelated_names_stay_below_threshold() {
        let c = candidate("Festival Gnaoua", "2025-06-26", Some(7), None);
        let sim = weighted_similarity(
            &c,
            "salon international du livre",
            date("2025-06-26"),
            7,
            None,
        );
        assert!(sim < FUZZY_MERGE_THRESHOLD, "similarity was {sim}");
    }
}
