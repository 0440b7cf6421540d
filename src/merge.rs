//! Merge & provenance writer.
//!
//! Applies a resolver decision inside the caller's transaction: creating or
//! enriching events, recording provenance, maintaining the fingerprint set,
//! and marking the candidate row processed. The confidence scorer runs as
//! the final step of every event mutation.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use tracing::{info, warn};

use crate::confidence::ConfidenceScorer;
use crate::error::{IngestError, IngestErrorKind};
use crate::fingerprint;
use crate::models::{
    candidate, event, event_artist, event_genre, event_source, source, CandidateOutcome,
    EventStatus, NormalizedEvent,
};
use crate::normalize::{normalize_name, slugify};
use crate::repositories::{CandidateRepository, EventRepository, FingerprintRepository, ReferenceRepository};
use crate::resolver::{DeduplicationResult, ResolverAction};

/// What the writer did with a candidate.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub outcome: CandidateOutcome,
    /// The event created or merged into, when one exists.
    pub event_id: Option<i32>,
}

pub struct MergeWriter;

impl MergeWriter {
    /// Apply one resolver decision. Must run inside a transaction: every
    /// mutation here commits or rolls back together with the candidate row.
    pub async fn apply<C: ConnectionTrait>(
        db: &C,
        candidate: &candidate::Model,
        normalized: &NormalizedEvent,
        decision: &DeduplicationResult,
        source: &source::Model,
    ) -> Result<ApplyOutcome, IngestError> {
        match decision.action {
            ResolverAction::Create => {
                if normalized.city_id.is_none() {
                    // A city is required to anchor an event; hold the record
                    // for editorial attention instead of guessing.
                    CandidateRepository::mark_processed(
                        db,
                        candidate.id,
                        CandidateOutcome::Review,
                        None,
                        Some(decision.confidence),
                    )
                    .await?;
                    return Ok(ApplyOutcome {
                        outcome: CandidateOutcome::Review,
                        event_id: None,
                    });
                }
                let event_id = Self::create_event(db, candidate, normalized, source).await?;
                CandidateRepository::mark_processed(
                    db,
                    candidate.id,
                    CandidateOutcome::Created,
                    Some(event_id),
                    Some(decision.confidence),
                )
                .await?;
                Ok(ApplyOutcome {
                    outcome: CandidateOutcome::Created,
                    event_id: Some(event_id),
                })
            }
            ResolverAction::Merge => {
                let event_id = decision.existing_event_id.ok_or_else(|| {
                    IngestError::new(
                        IngestErrorKind::MergeConflict,
                        "merge decision without an existing event id",
                    )
                })?;
                let outcome =
                    Self::merge_into(db, candidate, normalized, source, event_id).await?;
                CandidateRepository::mark_processed(
                    db,
                    candidate.id,
                    outcome,
                    Some(event_id),
                    Some(decision.confidence),
                )
                .await?;
                Ok(ApplyOutcome {
                    outcome,
                    event_id: Some(event_id),
                })
            }
            ResolverAction::Review => {
                CandidateRepository::mark_processed(
                    db,
                    candidate.id,
                    CandidateOutcome::Review,
                    decision.existing_event_id,
                    Some(decision.confidence),
                )
                .await?;
                Ok(ApplyOutcome {
                    outcome: CandidateOutcome::Review,
                    event_id: None,
                })
            }
        }
    }

    async fn create_event<C: ConnectionTrait>(
        db: &C,
        candidate: &candidate::Model,
        normalized: &NormalizedEvent,
        source: &source::Model,
    ) -> Result<i32, IngestError> {
        let city_id = normalized
            .city_id
            .expect("create_event requires a resolved city");
        let region_id = normalized
            .region_id
            .expect("city resolution always carries its region");

        let venue_id = match &normalized.venue_name {
            Some(name) => Some(
                ReferenceRepository::find_or_create_venue(db, city_id, name)
                    .await?
                    .id,
            ),
            None => None,
        };
        let organizer_id = match &normalized.organizer_name {
            Some(name) => Some(
                ReferenceRepository::find_or_create_organizer(db, name)
                    .await?
                    .id,
            ),
            None => None,
        };

        let slug = Self::unique_slug(db, &normalized.name).await?;
        let now = Utc::now();
        let inserted = event::ActiveModel {
            slug: Set(slug),
            name: Set(normalized.name.clone()),
            event_type: Set(normalized.event_type.as_str().to_string()),
            description: Set(normalized.description.clone()),
            start_date: Set(normalized.start_date),
            end_date: Set(normalized.end_date),
            city_id: Set(city_id),
            region_id: Set(region_id),
            venue_id: Set(venue_id),
            organizer_id: Set(organizer_id),
            official_website: Set(normalized.official_website.clone()),
            ticket_url: Set(normalized.ticket_url.clone()),
            status: Set(EventStatus::Announced.as_str().to_string()),
            is_verified: Set(false),
            is_pinned: Set(false),
            cultural_significance: Set(0),
            confidence_score: Set(0.0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            last_verified_at: Set(Some(now.into())),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(IngestError::from)?;

        Self::link_genres_and_artists(db, inserted.id, normalized).await?;
        Self::insert_provenance(db, inserted.id, candidate, source).await?;

        let set = fingerprint::generate(
            &normalized.normalized_name,
            normalized.start_date,
            Some(city_id),
        );
        FingerprintRepository::replace_for_event(db, inserted.id, &set).await?;

        ConfidenceScorer::recompute(db, inserted.id).await?;

        info!(event_id = inserted.id, source = %source.name, "created event");
        Ok(inserted.id)
    }

    async fn merge_into<C: ConnectionTrait>(
        db: &C,
        candidate: &candidate::Model,
        normalized: &NormalizedEvent,
        source: &source::Model,
        event_id: i32,
    ) -> Result<CandidateOutcome, IngestError> {
        let existing = EventRepository::find_by_id(db, event_id)
            .await?
            .ok_or_else(|| {
                IngestError::new(
                    IngestErrorKind::MergeConflict,
                    format!("event {event_id} vanished during merge"),
                )
            })?;

        // Precedence is judged against the sources linked before this one.
        let best_reliability = EventRepository::best_source_reliability(db, event_id)
            .await?
            .unwrap_or(0.0);

        Self::insert_provenance(db, event_id, candidate, source).await?;
        Self::link_genres_and_artists(db, event_id, normalized).await?;

        let now = Utc::now();
        let mut outcome = CandidateOutcome::Merged;

        if source.reliability_score > best_reliability {
            // A strictly more reliable source overwrites the canonical
            // attributes it carries.
            let venue_id = match &normalized.venue_name {
                Some(name) => Some(
                    ReferenceRepository::find_or_create_venue(db, existing.city_id, name)
                        .await?
                        .id,
                ),
                None => existing.venue_id,
            };
            let organizer_id = match &normalized.organizer_name {
                Some(name) => Some(
                    ReferenceRepository::find_or_create_organizer(db, name)
                        .await?
                        .id,
                ),
                None => existing.organizer_id,
            };

            let city_id = existing.city_id;
            let new_start = normalized.start_date;
            let new_norm_name = normalize_name(&normalized.name);

            let mut active: event::ActiveModel = existing.into();
            active.name = Set(normalized.name.clone());
            active.start_date = Set(new_start);
            active.end_date = Set(normalized.end_date);
            active.venue_id = Set(venue_id);
            active.organizer_id = Set(organizer_id);
            if normalized.official_website.is_some() {
                active.official_website = Set(normalized.official_website.clone());
            }
            active.updated_at = Set(now.into());
            active.update(db).await.map_err(IngestError::from)?;

            let set = fingerprint::generate(&new_norm_name, new_start, Some(city_id));
            FingerprintRepository::replace_for_event(db, event_id, &set).await?;
        } else if (source.reliability_score - best_reliability).abs() < f64::EPSILON
            && Self::conflicts_with(&existing, normalized)
        {
            // Equal reliability with disagreeing values: keep the older
            // value and surface the candidate for review.
            warn!(
                event_id,
                source = %source.name,
                "reliability tie with conflicting attributes, keeping existing values"
            );
            outcome = CandidateOutcome::Review;
        }

        // Linking a source re-verifies the event regardless of precedence.
        let refreshed = EventRepository::find_by_id(db, event_id)
            .await?
            .ok_or_else(|| {
                IngestError::new(
                    IngestErrorKind::MergeConflict,
                    format!("event {event_id} vanished during merge"),
                )
            })?;
        let mut active: event::ActiveModel = refreshed.into();
        active.last_verified_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(db).await.map_err(IngestError::from)?;

        ConfidenceScorer::recompute(db, event_id).await?;

        info!(event_id, source = %source.name, outcome = %outcome, "merged candidate");
        Ok(outcome)
    }

    fn conflicts_with(existing: &event::Model, normalized: &NormalizedEvent) -> bool {
        normalize_name(&existing.name) != normalized.normalized_name
            || existing.start_date != normalized.start_date
    }

    async fn insert_provenance<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
        candidate: &candidate::Model,
        source: &source::Model,
    ) -> Result<(), IngestError> {
        event_source::ActiveModel {
            event_id: Set(event_id),
            source_id: Set(source.id),
            external_id: Set(candidate.external_id.clone()),
            source_url: Set(candidate.source_url.clone()),
            raw_payload: Set(candidate.raw_payload.clone()),
            fetched_at: Set(candidate.ingested_at),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(IngestError::from)?;
        Ok(())
    }

    async fn link_genres_and_artists<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
        normalized: &NormalizedEvent,
    ) -> Result<(), IngestError> {
        for name in &normalized.genres {
            if name.trim().is_empty() {
                continue;
            }
            let genre = ReferenceRepository::find_or_create_genre(db, name).await?;
            let exists = event_genre::Entity::find_by_id((event_id, genre.id))
                .one(db)
                .await
                .map_err(IngestError::from)?;
            if exists.is_none() {
                event_genre::ActiveModel {
                    event_id: Set(event_id),
                    genre_id: Set(genre.id),
                }
                .insert(db)
                .await
                .map_err(IngestError::from)?;
            }
        }

        for name in &normalized.artists {
            if name.trim().is_empty() {
                continue;
            }
            let artist = ReferenceRepository::find_or_create_artist(db, name).await?;
            let exists = event_artist::Entity::find_by_id((event_id, artist.id))
                .one(db)
                .await
                .map_err(IngestError::from)?;
            if exists.is_none() {
                event_artist::ActiveModel {
                    event_id: Set(event_id),
                    artist_id: Set(artist.id),
                }
                .insert(db)
                .await
                .map_err(IngestError::from)?;
            }
        }
        Ok(())
    }

    /// Derive a slug unique among non-archived events, suffixing on
    /// collision.
    async fn unique_slug<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<String, IngestError> {
        let base = {
            let slug = slugify(name);
            if slug.is_empty() {
                "event".to_string()
            } else {
                slug
            }
        };

        if !EventRepository::slug_is_taken(db, &base).await? {
            return Ok(base);
        }
        for n in 2..100 {
            let attempt = format!("{base}-{n}");
            if !EventRepository::slug_is_taken(db, &attempt).await? {
                return Ok(attempt);
            }
        }
        // Pathological collision runs fall back to a random suffix.
        Ok(format!("{base}-{}", &uuid::Uuid::new_v4().to_string()[..8]))
    }
}
