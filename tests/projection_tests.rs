//! Projection synchronizer scenarios: rebuild parity, drift recovery,
//! idempotent deletes, and the retry queue.

mod test_utils;

use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use moussem::models::{event, SourceType};
use moussem::repositories::EventRepository;

use test_utils::{ingest_event, insert_source, setup, TestContext};

async fn seed_catalog(ctx: &TestContext) -> Vec<i32> {
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;
    let mut ids = Vec::new();
    for (name, date, city) in [
        ("Festival Gnaoua et Musiques du Monde", "2025-06-26", "Essaouira"),
        ("Jazzablanca", "2025-07-03", "Casablanca"),
        ("Festival Timitar", "2025-07-16", "Agadir"),
        ("Moussem Tan-Tan", "2025-05-14", "Guelmim"),
    ] {
        ids.push(
            ingest_event(
                ctx,
                &source,
                json!({
                    "name": name,
                    "event_type": "festival",
                    "start_date": date,
                    "city": city,
                    "source_url": format!("https://api.example.com/{name}")
                }),
                Some(name),
            )
            .await,
        );
    }
    ids
}

#[tokio::test]
async fn full_rebuild_reaches_projection_parity() {
    let ctx = setup().await;
    let ids = seed_catalog(&ctx).await;

    // Knock one event out of the indexable set first.
    ctx.editorial
        .update_status("amina", ids[3], "cancelled", None)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let outcome = ctx.search.full_rebuild(&cancel).await.unwrap();

    let indexable = EventRepository::list_indexable_ids(&ctx.db).await.unwrap();
    assert_eq!(outcome.indexed + outcome.errors, indexable.len());
    assert_eq!(outcome.errors, 0);

    // Exactly one document per indexable event, and nothing else.
    let mut expected: Vec<String> = indexable.iter().map(|id| id.to_string()).collect();
    expected.sort();
    assert_eq!(ctx.engine.document_ids(), expected);
}

#[tokio::test]
async fn full_rebuild_recovers_from_projection_drift() {
    let ctx = setup().await;
    let ids = seed_catalog(&ctx).await;

    // Corrupt the collection: half the documents vanish behind our back.
    ctx.engine.corrupt_remove(ids[0]);
    ctx.engine.corrupt_remove(ids[1]);
    assert_eq!(ctx.engine.document_count(), ids.len() - 2);

    let cancel = CancellationToken::new();
    let outcome = ctx.search.full_rebuild(&cancel).await.unwrap();

    let total = event::Entity::find().count(&ctx.db).await.unwrap() as usize;
    assert_eq!(outcome.indexed + outcome.errors, total);
    for id in ids {
        assert!(ctx.engine.contains(id), "event {id} missing after rebuild");
    }
}

#[tokio::test]
async fn deleting_an_absent_document_succeeds() {
    let ctx = setup().await;
    // Nothing was ever indexed; both calls must be clean no-ops.
    ctx.search.delete_event(424_242).await.unwrap();
    ctx.search.delete_event(424_242).await.unwrap();
}

#[tokio::test]
async fn upserting_a_missing_or_hidden_event_deletes_its_document() {
    let ctx = setup().await;
    let ids = seed_catalog(&ctx).await;

    // An id with no event behind it: upsert acts as delete and succeeds.
    ctx.search.upsert_event(999_999).await.unwrap();

    // A cancelled event stops being indexable; the next upsert removes it.
    ctx.editorial
        .update_status("amina", ids[0], "cancelled", None)
        .await
        .unwrap();
    ctx.search.upsert_event(ids[0]).await.unwrap();
    assert!(!ctx.engine.contains(ids[0]));
}

#[tokio::test]
async fn failed_projection_writes_land_on_the_retry_queue() {
    let ctx = setup().await;
    let ids = seed_catalog(&ctx).await;

    ctx.engine.set_fail_writes(true);
    ctx.engine.corrupt_remove(ids[0]);
    ctx.search.upsert_event_or_queue(ids[0]).await;
    assert_eq!(ctx.search.retry_backlog().await, 1);
    assert!(!ctx.engine.contains(ids[0]));

    // Once the engine recovers, draining replays the lost write.
    ctx.engine.set_fail_writes(false);
    let applied = ctx.search.drain_retries().await;
    assert_eq!(applied, 1);
    assert_eq!(ctx.search.retry_backlog().await, 0);
    assert!(ctx.engine.contains(ids[0]));
}

#[tokio::test]
async fn document_shape_carries_denormalized_references() {
    let ctx = setup().await;
    let source = insert_source(&ctx.db, "eventbrite", SourceType::Api, 0.8).await;
    let event_id = ingest_event(
        &ctx,
        &source,
        json!({
            "name": "Festival Gnaoua et Musiques du Monde",
            "event_type": "festival",
            "start_date": "2025-06-26",
            "end_date": "2025-06-28",
            "city": "Essaouira",
            "venue": "Scène Moulay Hassan",
            "tickets": "https://tickets.example.com/gnaoua",
            "genres": ["gnaoua", "world"],
            "artists": ["Maalem Hamid El Kasri"],
            "source_url": "https://api.example.com/gnaoua"
        }),
        Some("gnaoua"),
    )
    .await;

    let doc = ctx.engine.get(event_id).unwrap();
    assert_eq!(doc.id, event_id.to_string());
    assert_eq!(doc.city_name, "Essaouira");
    assert_eq!(doc.region_name, "Marrakech-Safi");
    assert_eq!(doc.year, 2025);
    assert_eq!(doc.month, 6);
    assert_eq!(doc.genres, vec!["gnaoua", "world"]);
    assert_eq!(doc.artists, vec!["Maalem Hamid El Kasri"]);
    assert!(doc.has_tickets);
    assert!(doc.geo_location.is_some());
    assert_eq!(doc.venue_name.as_deref(), Some("Scène Moulay Hassan"));
    // Unix-seconds date: 2025-06-26T00:00:00Z.
    assert_eq!(doc.start_date, 1_750_896_000);
    assert!(doc.end_date.unwrap() > doc.start_date);
}
