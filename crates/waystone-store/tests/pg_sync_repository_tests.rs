//! Integration tests for `PgSyncRepository`.

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use waystone_core::record::{SyncConflict, SyncDirection, SyncMetadata, SyncSubscription};
use waystone_core::repository::SyncRepository;
use waystone_core::state::FieldPath;
use waystone_store::PgSyncRepository;

fn make_conflict(character_id: Uuid, campaign_id: Uuid) -> SyncConflict {
    SyncConflict::unresolved(
        character_id,
        campaign_id,
        FieldPath::new("combat.hit_points"),
        json!(15),
        json!(12),
        4,
        2,
        Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).unwrap(),
    )
}

// --- metadata ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_metadata_returns_none_for_unknown_pair(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);

    let metadata = repo
        .get_metadata(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap();

    assert!(metadata.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_metadata_upsert_round_trip(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let mut metadata = SyncMetadata {
        character_id: Uuid::new_v4(),
        campaign_id: Uuid::new_v4(),
        character_version: 3,
        campaign_version: 1,
        last_sync: Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).unwrap(),
    };

    repo.upsert_metadata(&metadata).await.unwrap();
    metadata.campaign_version = 2;
    repo.upsert_metadata(&metadata).await.unwrap();

    let loaded = repo
        .get_metadata(metadata.character_id, metadata.campaign_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, metadata);
}

// --- conflicts ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_conflict_is_create_if_absent(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let character_id = Uuid::new_v4();
    let campaign_id = Uuid::new_v4();
    let conflict = make_conflict(character_id, campaign_id);

    assert!(repo.insert_conflict(&conflict).await.unwrap());

    // Same dedupe key, different record id: rejected.
    let duplicate = make_conflict(character_id, campaign_id);
    assert!(!repo.insert_conflict(&duplicate).await.unwrap());

    let unresolved = repo
        .list_unresolved_conflicts(character_id, campaign_id)
        .await
        .unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].id, conflict.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_conflict_resolved_removes_it_from_unresolved(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let character_id = Uuid::new_v4();
    let campaign_id = Uuid::new_v4();
    let conflict = make_conflict(character_id, campaign_id);
    repo.insert_conflict(&conflict).await.unwrap();

    repo.mark_conflict_resolved(
        conflict.id,
        "rule_based",
        &json!(12),
        Utc.with_ymd_and_hms(2026, 3, 10, 18, 45, 0).unwrap(),
    )
    .await
    .unwrap();

    let unresolved = repo
        .list_unresolved_conflicts(character_id, campaign_id)
        .await
        .unwrap();
    assert!(unresolved.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_resolved_conflicts_are_immutable(pool: PgPool) {
    let repo = PgSyncRepository::new(pool.clone());
    let conflict = make_conflict(Uuid::new_v4(), Uuid::new_v4());
    repo.insert_conflict(&conflict).await.unwrap();
    let resolved_at = Utc.with_ymd_and_hms(2026, 3, 10, 18, 45, 0).unwrap();

    repo.mark_conflict_resolved(conflict.id, "rule_based", &json!(12), resolved_at)
        .await
        .unwrap();
    // A second mark with a different value is a no-op.
    repo.mark_conflict_resolved(
        conflict.id,
        "structural",
        &json!(99),
        Utc.with_ymd_and_hms(2026, 3, 10, 19, 0, 0).unwrap(),
    )
    .await
    .unwrap();

    let row: (String, serde_json::Value) = sqlx::query_as(
        "SELECT resolution_strategy, resolved_value FROM sync_conflicts WHERE id = $1",
    )
    .bind(conflict.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "rule_based");
    assert_eq!(row.1, json!(12));
}

// --- subscriptions ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_subscription_round_trip_and_delete(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let subscription = SyncSubscription {
        character_id: Uuid::new_v4(),
        campaign_id: Uuid::new_v4(),
        fields: vec![
            FieldPath::new("combat.hit_points"),
            FieldPath::new("progress.experience_points"),
        ],
        direction: SyncDirection::Bidirectional,
    };

    repo.upsert_subscription(&subscription).await.unwrap();

    let loaded = repo
        .get_subscription(subscription.character_id, subscription.campaign_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, subscription);

    repo.delete_subscription(subscription.character_id, subscription.campaign_id)
        .await
        .unwrap();
    assert!(
        repo.get_subscription(subscription.character_id, subscription.campaign_id)
            .await
            .unwrap()
            .is_none()
    );
    // Deleting again stays a no-op.
    repo.delete_subscription(subscription.character_id, subscription.campaign_id)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_subscriptions_scopes_to_character(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let character_id = Uuid::new_v4();
    for _ in 0..2 {
        repo.upsert_subscription(&SyncSubscription {
            character_id,
            campaign_id: Uuid::new_v4(),
            fields: vec![FieldPath::new("combat")],
            direction: SyncDirection::PushOnly,
        })
        .await
        .unwrap();
    }
    repo.upsert_subscription(&SyncSubscription {
        character_id: Uuid::new_v4(),
        campaign_id: Uuid::new_v4(),
        fields: vec![FieldPath::new("combat")],
        direction: SyncDirection::PushOnly,
    })
    .await
    .unwrap();

    let listed = repo
        .list_subscriptions_for_character(character_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

// --- character state and base snapshots ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_character_state_upsert_round_trip(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let character_id = Uuid::new_v4();

    repo.upsert_character_state(character_id, &json!({"combat": {"hit_points": 20}}))
        .await
        .unwrap();
    repo.upsert_character_state(character_id, &json!({"combat": {"hit_points": 12}}))
        .await
        .unwrap();

    let state = repo.get_character_state(character_id).await.unwrap();
    assert_eq!(state, Some(json!({"combat": {"hit_points": 12}})));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_base_snapshots_are_versioned_independently(pool: PgPool) {
    let repo = PgSyncRepository::new(pool);
    let character_id = Uuid::new_v4();
    let campaign_id = Uuid::new_v4();

    repo.upsert_base_snapshot(character_id, campaign_id, 1, &json!({"hp": 20}))
        .await
        .unwrap();
    repo.upsert_base_snapshot(character_id, campaign_id, 2, &json!({"hp": 12}))
        .await
        .unwrap();

    assert_eq!(
        repo.get_base_snapshot(character_id, campaign_id, 1)
            .await
            .unwrap(),
        Some(json!({"hp": 20}))
    );
    assert_eq!(
        repo.get_base_snapshot(character_id, campaign_id, 2)
            .await
            .unwrap(),
        Some(json!({"hp": 12}))
    );
    assert_eq!(
        repo.get_base_snapshot(character_id, campaign_id, 3)
            .await
            .unwrap(),
        None
    );
}
