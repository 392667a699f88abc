//! Campaign→character push handler.

use serde_json::Value;
use uuid::Uuid;

use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;
use waystone_core::state::{ChangeSource, StateChange, SyncMode};
use waystone_resolve::{ResolutionOutcome, set_value_at};

use crate::context::SyncContext;
use crate::handlers::send_error_reply;
use crate::messages::{
    CAMPAIGN_STATE_ACK_TOPIC, CAMPAIGN_STATE_ERROR_TOPIC, CampaignStateAck, CampaignStateUpdate,
};
use crate::retry::with_retry;

/// Converts the update's field changes into the pipeline's transient
/// `StateChange` form.
fn to_state_changes(update: &CampaignStateUpdate) -> Vec<StateChange> {
    update
        .changes
        .iter()
        .map(|entry| StateChange {
            character_id: update.character_id,
            campaign_id: Some(update.campaign_id),
            field_path: entry.field_path.clone(),
            old_value: entry.old_value.clone(),
            new_value: entry.new_value.clone(),
            timestamp: update.timestamp,
            source: ChangeSource::Campaign,
            sync_mode: SyncMode::Realtime,
        })
        .collect()
}

/// Folds state changes into the partial remote document the resolver
/// diffs against the base.
fn to_remote_document(changes: &[StateChange]) -> Value {
    let mut document = Value::Object(serde_json::Map::new());
    for change in changes {
        set_value_at(&mut document, &change.field_path, change.new_value.clone());
    }
    document
}

fn validate(update: &CampaignStateUpdate) -> Result<(), SyncError> {
    if update.changes.is_empty() {
        return Err(SyncError::Message(
            "campaign state update carries no changes".into(),
        ));
    }
    if update.version <= 0 {
        return Err(SyncError::Message(format!(
            "campaign state update carries non-positive version {}",
            update.version
        )));
    }
    Ok(())
}

async fn apply(ctx: &SyncContext, update: &CampaignStateUpdate) -> Result<ResolutionOutcome, SyncError> {
    validate(update)?;
    let changes = to_state_changes(update);
    let remote_document = to_remote_document(&changes);
    ctx.resolver
        .resolve_campaign_update(
            update.character_id,
            update.campaign_id,
            &remote_document,
            update.version,
        )
        .await
}

/// Handles one campaign→character push: resolves it through the
/// conflict pipeline and always answers with a correlated ack or a
/// typed error.
///
/// # Errors
///
/// Returns [`SyncError::Sync`] only when the reply itself cannot be
/// published, so the transport redelivers the inbound message.
pub async fn handle_campaign_state_update(
    ctx: &SyncContext,
    update: &CampaignStateUpdate,
) -> Result<(), SyncError> {
    let result = with_retry(&ctx.retry, "campaign_state_update", async || {
        apply(ctx, update).await
    })
    .await;

    match result {
        Ok(outcome) => {
            let ack = CampaignStateAck {
                message_id: Uuid::new_v4(),
                in_reply_to: update.message_id,
                character_id: update.character_id,
                campaign_id: update.campaign_id,
                applied_fields: outcome.applied_fields.len(),
                conflicts: outcome.conflicts.len(),
                unresolved: outcome.unresolved_count(),
                timestamp: ctx.clock.now(),
            };
            let payload = serde_json::to_value(&ack)
                .map_err(|e| SyncError::Sync(format!("ack encode failed: {e}")))?;
            ctx.bus.publish(CAMPAIGN_STATE_ACK_TOPIC, payload).await
        }
        Err(err) => {
            tracing::warn!(
                message_id = %update.message_id,
                character_id = %update.character_id,
                error = %err,
                "campaign state update failed"
            );
            send_error_reply(ctx, CAMPAIGN_STATE_ERROR_TOPIC, update.message_id, &err).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use waystone_core::repository::SyncRepository;
    use waystone_core::state::FieldPath;

    use crate::handlers::test_util::test_context;
    use crate::messages::FieldChangeEntry;

    fn update(changes: Vec<FieldChangeEntry>, version: i64) -> CampaignStateUpdate {
        CampaignStateUpdate {
            message_id: Uuid::new_v4(),
            character_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            version,
            changes,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 18, 29, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_update_applies_and_acks() {
        let fixture = test_context();
        let update = update(
            vec![FieldChangeEntry {
                field_path: FieldPath::new("combat.hit_points"),
                old_value: Some(json!(20)),
                new_value: json!(12),
            }],
            1,
        );

        handle_campaign_state_update(&fixture.ctx, &update)
            .await
            .unwrap();

        let acks = fixture.bus.published_to(CAMPAIGN_STATE_ACK_TOPIC);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0]["in_reply_to"], json!(update.message_id));
        assert_eq!(acks[0]["applied_fields"], json!(1));
        assert_eq!(acks[0]["conflicts"], json!(0));

        let state = fixture
            .repository
            .get_character_state(update.character_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, json!({"combat": {"hit_points": 12}}));
    }

    #[tokio::test]
    async fn test_empty_update_answers_typed_error() {
        let fixture = test_context();
        let update = update(vec![], 1);

        handle_campaign_state_update(&fixture.ctx, &update)
            .await
            .unwrap();

        assert!(fixture.bus.published_to(CAMPAIGN_STATE_ACK_TOPIC).is_empty());
        let errors = fixture.bus.published_to(CAMPAIGN_STATE_ERROR_TOPIC);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["in_reply_to"], json!(update.message_id));
        assert_eq!(errors[0]["code"], json!("message_error"));
    }

    #[tokio::test]
    async fn test_redelivered_update_acks_idempotently() {
        let fixture = test_context();
        let update = update(
            vec![FieldChangeEntry {
                field_path: FieldPath::new("combat.hit_points"),
                old_value: None,
                new_value: json!(12),
            }],
            1,
        );

        handle_campaign_state_update(&fixture.ctx, &update)
            .await
            .unwrap();
        handle_campaign_state_update(&fixture.ctx, &update)
            .await
            .unwrap();

        // Both deliveries ack; the second absorbs no changes and
        // records nothing new.
        assert_eq!(fixture.bus.published_to(CAMPAIGN_STATE_ACK_TOPIC).len(), 2);
        assert!(fixture.repository.all_conflicts().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_becomes_correlated_error_after_retries() {
        let (ctx, bus) = crate::handlers::test_util::failing_repository_context();
        let update = update(
            vec![FieldChangeEntry {
                field_path: FieldPath::new("combat.hit_points"),
                old_value: None,
                new_value: json!(12),
            }],
            1,
        );

        handle_campaign_state_update(&ctx, &update).await.unwrap();

        assert!(bus.published_to(CAMPAIGN_STATE_ACK_TOPIC).is_empty());
        let errors = bus.published_to(CAMPAIGN_STATE_ERROR_TOPIC);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["in_reply_to"], json!(update.message_id));
        assert_eq!(errors[0]["code"], json!("sync_error"));
    }

    #[tokio::test]
    async fn test_conflicting_update_reports_conflict_counts() {
        let fixture = test_context();
        let update = update(
            vec![FieldChangeEntry {
                field_path: FieldPath::new("combat.hit_points"),
                old_value: Some(json!(20)),
                new_value: json!(12),
            }],
            1,
        );
        fixture
            .repository
            .seed_state(update.character_id, json!({"combat": {"hit_points": 15}}));

        handle_campaign_state_update(&fixture.ctx, &update)
            .await
            .unwrap();

        let acks = fixture.bus.published_to(CAMPAIGN_STATE_ACK_TOPIC);
        assert_eq!(acks[0]["conflicts"], json!(1));
        assert_eq!(acks[0]["unresolved"], json!(0));
        let conflicts = fixture.repository.all_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resolution_strategy.as_deref(), Some("rule_based"));
    }
}
