//! End-to-end ingestion scenarios over an in-memory store: duplicate
//! collapse, fuzzy merges, review routing, provenance coverage, and
//! candidate retention.

mod test_utils;

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;

use moussem::fingerprint;
use moussem::models::{candidate, event, event_source, CandidateOutcome, EventStatus, SourceType};
use moussem::normalize::normalize_name;
use moussem::repositories::{CandidateRepository, FingerprintRepository};

use test_utils::{insert_source, setup, stage_candidate};

fn gnaoua_payload() -> serde_json::Value {
    json!({
        "name": "Festival Gnaoua et Musiques du Monde",
        "event_type": "festival",
        "start_date": "2025-06-26",
        "city": "Essaouira",
        "source_url": "https://api.example.com/events/EB-123"
    })
}

#[tokio::test]
async fn exact_duplicate_collapses_to_one_event_with_two_provenance_rows() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;

    let first = stage_candidate(&ctx.db, &source, gnaoua_payload(), Some("EB-123")).await;
    let second = stage_candidate(&ctx.db, &source, gnaoua_payload(), Some("EB-123")).await;

    let first_outcome = ctx
        .orchestrator
        .resolve_and_apply(&first, &source)
        .await
        .unwrap();
    let second_outcome = ctx
        .orchestrator
        .resolve_and_apply(&second, &source)
        .await
        .unwrap();

    assert_eq!(first_outcome.outcome, CandidateOutcome::Created);
    assert_eq!(second_outcome.outcome, CandidateOutcome::Merged);
    assert_eq!(first_outcome.event_id, second_outcome.event_id);

    let events = event::Entity::find().all(&ctx.db).await.unwrap();
    assert_eq!(events.len(), 1, "ingesting the same record twice must create one event");

    let event_id = events[0].id;
    let links = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(event_id))
        .all(&ctx.db)
        .await
        .unwrap();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.external_id.as_deref() == Some("EB-123")));

    // Both candidates point at the same event once processed.
    for id in [first.id, second.id] {
        let row = candidate::Entity::find_by_id(id)
            .one(&ctx.db)
            .await
            .unwrap()
            .unwrap();
        assert!(row.processed);
        assert_eq!(row.matched_event_id, Some(event_id));
    }

    // One 0.8-reliability source, full required fields, no optional fields,
    // single-source agreement, fresh verification, unknown history:
    // 0.35*0.8 + 0.25*0.7 + 0.20*0.5 + 0.10*1.0 + 0.10*0.5.
    let expected = 0.35 * 0.8 + 0.25 * 0.7 + 0.20 * 0.5 + 0.10 * 1.0 + 0.10 * 0.5;
    let stored = events[0].confidence_score;
    let refreshed = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert!((refreshed.confidence_score - expected).abs() < 0.01, "got {stored}");

    // The projection hook indexed the event.
    assert!(ctx.engine.contains(event_id));
}

#[tokio::test]
async fn higher_reliability_source_overwrites_on_fuzzy_merge() {
    let ctx = setup().await;
    let aggregator = insert_source(&ctx.db, "aggregator", SourceType::Api, 0.8).await;
    let official = insert_source(&ctx.db, "official-site", SourceType::Scraper, 1.0).await;

    let first = stage_candidate(
        &ctx.db,
        &aggregator,
        json!({
            "name": "Festival Gnaoua et Musiques du Monde 2025",
            "event_type": "festival",
            "start_date": "2025-06-26",
            "city": "Essaouira",
            "source_url": "https://agg.example.com/1"
        }),
        Some("agg-1"),
    )
    .await;
    let created = ctx
        .orchestrator
        .resolve_and_apply(&first, &aggregator)
        .await
        .unwrap();
    let event_id = created.event_id.unwrap();
    let before = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();

    let second = stage_candidate(
        &ctx.db,
        &official,
        json!({
            "name": "Festival Gnaoua 2025 — 27e édition",
            "event_type": "festival",
            "start_date": "2025-06-26",
            "city": "Essaouira",
            "source_url": "https://www.festival-gnaoua.net/edition"
        }),
        Some("off-1"),
    )
    .await;
    let merged = ctx
        .orchestrator
        .resolve_and_apply(&second, &official)
        .await
        .unwrap();

    assert_eq!(merged.outcome, CandidateOutcome::Merged);
    assert_eq!(merged.event_id, Some(event_id));
    assert_eq!(event::Entity::find().count(&ctx.db).await.unwrap(), 1);

    let after = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    // The official site is strictly more reliable, so its raw name wins.
    assert_eq!(after.name, "Festival Gnaoua 2025 — 27e édition");
    assert!(after.confidence_score > before.confidence_score);

    let links = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(event_id))
        .all(&ctx.db)
        .await
        .unwrap();
    assert_eq!(links.len(), 2);

    // Fingerprints were recomputed from the new canonical name.
    let expected = fingerprint::generate(
        &normalize_name(&after.name),
        after.start_date,
        Some(after.city_id),
    );
    let stored = FingerprintRepository::for_event(&ctx.db, event_id)
        .await
        .unwrap();
    let exact = stored.iter().find(|f| f.kind == "exact").unwrap();
    assert_eq!(Some(&exact.hash), expected.exact.as_ref());
}

#[tokio::test]
async fn date_disagreement_routes_to_review_without_mutation() {
    let ctx = setup().await;
    let source_a = insert_source(&ctx.db, "source-a", SourceType::Api, 0.8).await;
    let source_c = insert_source(&ctx.db, "source-c", SourceType::Api, 0.8).await;

    let first = stage_candidate(&ctx.db, &source_a, gnaoua_payload(), Some("a-1")).await;
    let created = ctx
        .orchestrator
        .resolve_and_apply(&first, &source_a)
        .await
        .unwrap();
    let event_id = created.event_id.unwrap();

    let disputed = stage_candidate(
        &ctx.db,
        &source_c,
        json!({
            "name": "Festival Gnaoua et Musiques du Monde",
            "event_type": "festival",
            "start_date": "2025-06-27",
            "city": "Essaouira",
            "source_url": "https://c.example.com/1"
        }),
        Some("c-1"),
    )
    .await;
    let outcome = ctx
        .orchestrator
        .resolve_and_apply(&disputed, &source_c)
        .await
        .unwrap();

    assert_eq!(outcome.outcome, CandidateOutcome::Review);
    assert_eq!(outcome.event_id, None, "review must not mutate any event");

    // The event kept its original date and single provenance row.
    let untouched = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        untouched.start_date,
        NaiveDate::from_ymd_opt(2025, 6, 26).unwrap()
    );
    let links = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(event_id))
        .count(&ctx.db)
        .await
        .unwrap();
    assert_eq!(links, 1);

    // And the candidate sits in the review queue pointing at its suspect.
    let pending = CandidateRepository::list_review_pending(&ctx.db).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, disputed.id);
    assert_eq!(pending[0].matched_event_id, Some(event_id));
}

#[tokio::test]
async fn unknown_city_is_retained_for_editorial_attention() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "mystery", SourceType::Api, 0.8).await;

    let staged = stage_candidate(
        &ctx.db,
        &source,
        json!({
            "name": "Concert Perdu",
            "event_type": "concert",
            "start_date": "2025-09-01",
            "city": "Atlantis",
            "source_url": "https://m.example.com/1"
        }),
        Some("m-1"),
    )
    .await;
    let outcome = ctx
        .orchestrator
        .resolve_and_apply(&staged, &source)
        .await
        .unwrap();

    assert_eq!(outcome.outcome, CandidateOutcome::Review);
    assert_eq!(event::Entity::find().count(&ctx.db).await.unwrap(), 0);

    let pending = CandidateRepository::list_review_pending(&ctx.db).await.unwrap();
    assert_eq!(pending.len(), 1);
    let normalized = pending[0].normalized_event().unwrap();
    assert_eq!(normalized.city_id, None);
    assert_eq!(normalized.city_raw, "Atlantis");
}

#[tokio::test]
async fn every_ingested_event_has_provenance() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;

    for (name, date) in [
        ("Festival Gnaoua et Musiques du Monde", "2025-06-26"),
        ("Jazzablanca", "2025-07-03"),
        ("Festival Timitar", "2025-07-09"),
    ] {
        let staged = stage_candidate(
            &ctx.db,
            &source,
            json!({
                "name": name,
                "event_type": "festival",
                "start_date": date,
                "city": if name == "Jazzablanca" { "Casablanca" } else { "Essaouira" },
                "source_url": "https://api.example.com/x"
            }),
            None,
        )
        .await;
        ctx.orchestrator
            .resolve_and_apply(&staged, &source)
            .await
            .unwrap();
    }

    let events = event::Entity::find().all(&ctx.db).await.unwrap();
    assert_eq!(events.len(), 3);
    for e in events {
        let links = event_source::Entity::find()
            .filter(event_source::Column::EventId.eq(e.id))
            .count(&ctx.db)
            .await
            .unwrap();
        assert!(links >= 1, "event {} has no provenance", e.id);
        assert!((0.0..=1.0).contains(&e.confidence_score));
        assert_eq!(e.status, EventStatus::Announced.as_str());
    }
}

#[tokio::test]
async fn created_events_own_their_four_fingerprints() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;

    let staged = stage_candidate(&ctx.db, &source, gnaoua_payload(), None).await;
    let outcome = ctx
        .orchestrator
        .resolve_and_apply(&staged, &source)
        .await
        .unwrap();
    let event_id = outcome.event_id.unwrap();

    let stored = FingerprintRepository::for_event(&ctx.db, event_id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 4);
    let mut kinds: Vec<&str> = stored.iter().map(|f| f.kind.as_str()).collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["date_location", "exact", "fuzzy_name", "week_location"]);
    assert!(stored.iter().all(|f| f.hash.len() == 64));
}

#[tokio::test]
async fn process_pending_drains_the_manual_queue() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "manual-entry", SourceType::Manual, 0.9).await;

    stage_candidate(&ctx.db, &source, gnaoua_payload(), None).await;
    stage_candidate(&ctx.db, &source, gnaoua_payload(), None).await;

    let cancel = tokio_util::sync::CancellationToken::new();
    let report = ctx.orchestrator.process_pending(&cancel).await.unwrap();

    let totals = report.totals();
    assert_eq!(totals.fetched, 2);
    assert_eq!(totals.created, 1);
    assert_eq!(totals.merged, 1);
    assert!(CandidateRepository::list_unprocessed(&ctx.db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn stale_unprocessed_candidates_are_swept() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;

    let stale = stage_candidate(&ctx.db, &source, gnaoua_payload(), Some("old")).await;
    let fresh = stage_candidate(&ctx.db, &source, gnaoua_payload(), Some("new")).await;

    // Age the first candidate past the retention window.
    let mut aged: candidate::ActiveModel = stale.clone().into();
    aged.ingested_at = Set((Utc::now() - Duration::days(45)).into());
    aged.update(&ctx.db).await.unwrap();

    let swept = ctx.orchestrator.sweep_candidates().await.unwrap();
    assert_eq!(swept, 1);

    let remaining = CandidateRepository::list_unprocessed(&ctx.db).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, fresh.id);
}

#[tokio::test]
async fn reingesting_the_same_record_is_stable_across_runs() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;

    // Three passes over the identical upstream record: still one event.
    for _ in 0..3 {
        let staged = stage_candidate(&ctx.db, &source, gnaoua_payload(), Some("EB-123")).await;
        let outcome = ctx
            .orchestrator
            .resolve_and_apply(&staged, &source)
            .await
            .unwrap();
        assert!(outcome.event_id.is_some());
    }

    assert_eq!(event::Entity::find().count(&ctx.db).await.unwrap(), 1);
    assert_eq!(
        event_source::Entity::find().count(&ctx.db).await.unwrap(),
        3
    );
}
