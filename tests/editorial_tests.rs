//! Editorial command scenarios: audit logging, the merge command's
//! snapshot-and-relink contract, and status transitions driving the search
//! projection.

mod test_utils;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use moussem::editorial::EditorialError;
use moussem::models::{
    editorial_action, event, event_artist, event_snapshot, event_source, EventStatus, SourceType,
};

use test_utils::{ingest_event, insert_source, setup, TestContext};

async fn seed_event(ctx: &TestContext, name: &str, date: &str, city: &str) -> i32 {
    let source = insert_source(
        &ctx.db,
        &format!("src-{}", name.to_lowercase().replace(' ', "-")),
        SourceType::Api,
        0.8,
    )
    .await;
    ingest_event(
        ctx,
        &source,
        json!({
            "name": name,
            "event_type": "festival",
            "start_date": date,
            "city": city,
            "source_url": format!("https://api.example.com/{name}"),
            "artists": ["Maalem Hamid El Kasri", "Asmaa Hamzaoui"]
        }),
        Some(name),
    )
    .await
}

#[tokio::test]
async fn verify_pin_and_significance_are_audited() {
    let ctx = setup().await;
    let event_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;

    ctx.editorial
        .verify("amina", event_id, true, Some("checked official site".to_string()))
        .await
        .unwrap();
    ctx.editorial
        .pin("amina", event_id, true, Some("flagship event".to_string()))
        .await
        .unwrap();
    ctx.editorial
        .set_significance("amina", event_id, 9)
        .await
        .unwrap();

    let updated = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.is_verified);
    assert!(updated.is_pinned);
    assert_eq!(updated.cultural_significance, 9);
    assert!(updated.last_verified_at.is_some());

    let actions = editorial_action::Entity::find()
        .filter(editorial_action::Column::EventId.eq(event_id))
        .all(&ctx.db)
        .await
        .unwrap();
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().all(|a| a.actor == "amina"));

    // The projection reflects the editorial flags.
    let doc = ctx.engine.get(event_id).unwrap();
    assert!(doc.is_verified);
    assert!(doc.is_pinned);
    assert_eq!(doc.cultural_significance, 9);
}

#[tokio::test]
async fn significance_outside_bounds_is_rejected() {
    let ctx = setup().await;
    let event_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;

    for score in [-1, 11] {
        let result = ctx.editorial.set_significance("amina", event_id, score).await;
        assert!(matches!(
            result,
            Err(EditorialError::InvalidSignificance(_))
        ));
    }

    // Nothing was logged for the rejected commands.
    let actions = editorial_action::Entity::find().count(&ctx.db).await.unwrap();
    assert_eq!(actions, 0);
}

#[tokio::test]
async fn merge_snapshots_loser_and_relinks_everything() {
    let ctx = setup().await;
    // Different weeks so ingestion does not collapse them first.
    let keep_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;
    let lose_id = seed_event(&ctx, "Gnaoua Festival Essaouira", "2025-07-15", "Essaouira").await;

    let lose_sources_before = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(lose_id))
        .count(&ctx.db)
        .await
        .unwrap();
    assert!(lose_sources_before >= 1);

    ctx.editorial.merge("amina", keep_id, lose_id).await.unwrap();

    // The loser's prior state is snapshotted.
    let snapshots = event_snapshot::Entity::find()
        .filter(event_snapshot::Column::EventId.eq(lose_id))
        .all(&ctx.db)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        snapshots[0].snapshot.get("name").and_then(|v| v.as_str()),
        Some("Gnaoua Festival Essaouira")
    );

    // Provenance moved to the keeper; the loser is gone.
    assert!(event::Entity::find_by_id(lose_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .is_none());
    let orphaned = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(lose_id))
        .count(&ctx.db)
        .await
        .unwrap();
    assert_eq!(orphaned, 0);
    let keeper_links = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(keep_id))
        .count(&ctx.db)
        .await
        .unwrap();
    assert_eq!(keeper_links, 2);

    // Artists carried over without duplicates.
    let keeper_artists = event_artist::Entity::find()
        .filter(event_artist::Column::EventId.eq(keep_id))
        .count(&ctx.db)
        .await
        .unwrap();
    assert_eq!(keeper_artists, 2);

    // Search holds the keeper and nothing for the loser.
    assert!(ctx.engine.contains(keep_id));
    assert!(!ctx.engine.contains(lose_id));
}

#[tokio::test]
async fn merge_rejects_self_and_missing_events() {
    let ctx = setup().await;
    let event_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;

    assert!(matches!(
        ctx.editorial.merge("amina", event_id, event_id).await,
        Err(EditorialError::SelfMerge)
    ));
    assert!(matches!(
        ctx.editorial.merge("amina", event_id, 99_999).await,
        Err(EditorialError::EventNotFound(99_999))
    ));
}

#[tokio::test]
async fn cancelling_an_event_removes_it_from_search_but_not_the_store() {
    let ctx = setup().await;
    let event_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;
    assert!(ctx.engine.contains(event_id));

    ctx.editorial
        .update_status(
            "amina",
            event_id,
            "cancelled",
            Some("https://www.festival-gnaoua.net/annulation".to_string()),
        )
        .await
        .unwrap();

    let stored = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EventStatus::Cancelled.as_str());

    // Cancelled is not indexable: the document is gone, the row is not.
    assert!(!ctx.engine.contains(event_id));

    // The editorially supplied URL became provenance.
    let links = event_source::Entity::find()
        .filter(event_source::Column::EventId.eq(event_id))
        .all(&ctx.db)
        .await
        .unwrap();
    assert!(links
        .iter()
        .any(|l| l.source_url.as_deref()
            == Some("https://www.festival-gnaoua.net/annulation")));
}

#[tokio::test]
async fn unknown_status_fails_closed() {
    let ctx = setup().await;
    let event_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;

    assert!(matches!(
        ctx.editorial
            .update_status("amina", event_id, "limbo", None)
            .await,
        Err(EditorialError::InvalidStatus(_))
    ));
}

#[tokio::test]
async fn archive_is_terminal_for_search_visibility() {
    let ctx = setup().await;
    let event_id = seed_event(&ctx, "Festival Gnaoua", "2025-06-26", "Essaouira").await;
    assert!(ctx.engine.contains(event_id));

    ctx.editorial
        .archive("amina", event_id, Some("past edition".to_string()))
        .await
        .unwrap();

    let stored = event::Entity::find_by_id(event_id)
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EventStatus::Archived.as_str());
    assert!(!ctx.engine.contains(event_id));

    let actions = editorial_action::Entity::find()
        .filter(editorial_action::Column::ActionType.eq("archive"))
        .count(&ctx.db)
        .await
        .unwrap();
    assert_eq!(actions, 1);
}
