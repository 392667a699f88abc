//! Subscription control handler.

use uuid::Uuid;

use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;
use waystone_core::record::{SyncDirection, SyncSubscription};
use waystone_core::repository::SyncRepository;

use crate::context::SyncContext;
use crate::handlers::send_error_reply;
use crate::messages::{SYNC_ERROR_TOPIC, SYNC_STATUS_TOPIC, SyncControlCommand, SyncStatus};
use crate::retry::with_retry;

async fn subscribe(ctx: &SyncContext, command: &SyncControlCommand) -> Result<(), SyncError> {
    let fields = command
        .fields
        .as_ref()
        .filter(|fields| !fields.is_empty())
        .ok_or_else(|| {
            SyncError::Message("subscribe requires an explicit field allow-list".into())
        })?;
    let subscription = SyncSubscription {
        character_id: command.character_id,
        campaign_id: command.campaign_id,
        fields: fields.clone(),
        direction: command.direction.unwrap_or(SyncDirection::Bidirectional),
    };
    ctx.repository.upsert_subscription(&subscription).await?;
    if let Err(err) = ctx.cache.set_subscription(&subscription).await {
        tracing::warn!(character_id = %command.character_id, error = %err, "subscription cache refresh failed");
    }
    Ok(())
}

async fn unsubscribe(ctx: &SyncContext, command: &SyncControlCommand) -> Result<(), SyncError> {
    ctx.repository
        .delete_subscription(command.character_id, command.campaign_id)
        .await?;
    if let Err(err) = ctx
        .cache
        .delete_subscription(command.character_id, command.campaign_id)
        .await
    {
        tracing::warn!(character_id = %command.character_id, error = %err, "subscription cache eviction failed");
    }
    Ok(())
}

/// Handles one subscription control command. `subscribe` and
/// `unsubscribe` answer with a status message; an unrecognized command
/// answers with a typed error and never crashes the handler loop.
///
/// # Errors
///
/// Returns [`SyncError::Sync`] only when the reply itself cannot be
/// published, so the transport redelivers the inbound message.
pub async fn handle_sync_control(
    ctx: &SyncContext,
    command: &SyncControlCommand,
) -> Result<(), SyncError> {
    let result = with_retry(&ctx.retry, "sync_control", async || {
        match command.command.as_str() {
            "subscribe" => subscribe(ctx, command).await,
            "unsubscribe" => unsubscribe(ctx, command).await,
            other => Err(SyncError::Message(format!(
                "unrecognized sync command: {other}"
            ))),
        }
    })
    .await;

    match result {
        Ok(()) => {
            let status_label = if command.command == "subscribe" {
                "subscribed"
            } else {
                "unsubscribed"
            };
            let status = SyncStatus {
                message_id: Uuid::new_v4(),
                in_reply_to: command.message_id,
                character_id: command.character_id,
                campaign_id: Some(command.campaign_id),
                status: status_label.to_owned(),
                timestamp: ctx.clock.now(),
            };
            let payload = serde_json::to_value(&status)
                .map_err(|e| SyncError::Sync(format!("status encode failed: {e}")))?;
            ctx.bus.publish(SYNC_STATUS_TOPIC, payload).await
        }
        Err(err) => {
            tracing::warn!(
                message_id = %command.message_id,
                command = command.command,
                error = %err,
                "sync control command failed"
            );
            send_error_reply(ctx, SYNC_ERROR_TOPIC, command.message_id, &err).await
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

    use crate::handlers::campaign_state::handle_campaign_state_update;
    use crate::handlers::test_util::test_context;
    use crate::messages::{
        CAMPAIGN_STATE_ACK_TOPIC, CampaignStateUpdate, FieldChangeEntry,
    };

    fn command(
        character_id: Uuid,
        campaign_id: Uuid,
        verb: &str,
        fields: Option<Vec<FieldPath>>,
    ) -> SyncControlCommand {
        SyncControlCommand {
            message_id: Uuid::new_v4(),
            character_id,
            campaign_id,
            command: verb.to_owned(),
            fields,
            direction: Some(SyncDirection::Bidirectional),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 18, 29, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_persists_subscription_and_answers_status() {
        let fixture = test_context();
        let character_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();

        handle_sync_control(
            &fixture.ctx,
            &command(
                character_id,
                campaign_id,
                "subscribe",
                Some(vec![
                    FieldPath::new("combat.hit_points"),
                    FieldPath::new("progress.experience_points"),
                ]),
            ),
        )
        .await
        .unwrap();

        let subscription = fixture
            .repository
            .get_subscription(character_id, campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subscription.fields.len(), 2);
        assert_eq!(subscription.direction, SyncDirection::Bidirectional);

        let statuses = fixture.bus.published_to(SYNC_STATUS_TOPIC);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["status"], json!("subscribed"));
    }

    #[tokio::test]
    async fn test_subscribe_without_fields_answers_typed_error() {
        let fixture = test_context();

        handle_sync_control(
            &fixture.ctx,
            &command(Uuid::new_v4(), Uuid::new_v4(), "subscribe", None),
        )
        .await
        .unwrap();

        let errors = fixture.bus.published_to(SYNC_ERROR_TOPIC);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["code"], json!("message_error"));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let fixture = test_context();
        let character_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();

        // Nothing subscribed yet: still a clean status.
        handle_sync_control(
            &fixture.ctx,
            &command(character_id, campaign_id, "unsubscribe", None),
        )
        .await
        .unwrap();

        let statuses = fixture.bus.published_to(SYNC_STATUS_TOPIC);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["status"], json!("unsubscribed"));
    }

    #[tokio::test]
    async fn test_unknown_command_answers_typed_error_without_crashing() {
        let fixture = test_context();

        handle_sync_control(
            &fixture.ctx,
            &command(Uuid::new_v4(), Uuid::new_v4(), "resubscribe", None),
        )
        .await
        .unwrap();

        let errors = fixture.bus.published_to(SYNC_ERROR_TOPIC);
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0]["message"]
                .as_str()
                .unwrap()
                .contains("unrecognized sync command")
        );
    }

    #[tokio::test]
    async fn test_campaign_updates_still_accepted_after_unsubscribe() {
        let fixture = test_context();
        let character_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();

        handle_sync_control(
            &fixture.ctx,
            &command(
                character_id,
                campaign_id,
                "subscribe",
                Some(vec![
                    FieldPath::new("combat.hit_points"),
                    FieldPath::new("progress.experience_points"),
                ]),
            ),
        )
        .await
        .unwrap();
        handle_sync_control(
            &fixture.ctx,
            &command(character_id, campaign_id, "unsubscribe", None),
        )
        .await
        .unwrap();

        // A later campaign push for the pair is still accepted and
        // leaves no active-subscription side effects behind.
        let update = CampaignStateUpdate {
            message_id: Uuid::new_v4(),
            character_id,
            campaign_id,
            version: 1,
            changes: vec![FieldChangeEntry {
                field_path: FieldPath::new("combat.hit_points"),
                old_value: None,
                new_value: json!(12),
            }],
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 18, 31, 0).unwrap(),
        };
        handle_campaign_state_update(&fixture.ctx, &update)
            .await
            .unwrap();

        assert_eq!(fixture.bus.published_to(CAMPAIGN_STATE_ACK_TOPIC).len(), 1);
        assert_eq!(
            fixture
                .repository
                .get_subscription(character_id, campaign_id)
                .await
                .unwrap(),
            None
        );
    }
}
