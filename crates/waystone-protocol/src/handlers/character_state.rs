//! Character→campaign push handler.

use serde_json::Value;
use uuid::Uuid;

use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;
use waystone_core::message::{CharacterStatePayload, SyncMessage, SyncMessageKind};
use waystone_core::record::{SyncMetadata, SyncSubscription};
use waystone_core::repository::SyncRepository;
use waystone_resolve::set_value_at;

use crate::context::SyncContext;
use crate::handlers::send_error_reply;
use crate::messages::{
    CharacterStateChange, FieldChangeEntry, SYNC_ERROR_TOPIC, SYNC_STATUS_TOPIC, SyncStatus,
};
use crate::retry::with_retry;

struct Applied {
    campaign_id: Option<Uuid>,
    forwarded: bool,
}

/// Picks the subscription the push travels under: the named campaign's
/// subscription, or the character's first subscription when the sender
/// left the campaign out.
async fn resolve_subscription(
    ctx: &SyncContext,
    change: &CharacterStateChange,
) -> Result<Option<SyncSubscription>, SyncError> {
    match change.campaign_id {
        Some(campaign_id) => {
            ctx.repository
                .get_subscription(change.character_id, campaign_id)
                .await
        }
        None => Ok(ctx
            .repository
            .list_subscriptions_for_character(change.character_id)
            .await?
            .into_iter()
            .next()),
    }
}

/// The subset of changes the subscription's field allow-list admits.
fn allowed_changes<'a>(
    subscription: &SyncSubscription,
    changes: &'a [FieldChangeEntry],
) -> Vec<&'a FieldChangeEntry> {
    changes
        .iter()
        .filter(|entry| {
            subscription
                .fields
                .iter()
                .any(|allowed| entry.field_path.starts_with(allowed.as_str()))
        })
        .collect()
}

async fn apply(ctx: &SyncContext, change: &CharacterStateChange) -> Result<Applied, SyncError> {
    if change.changes.is_empty() {
        return Err(SyncError::Message(
            "character state change carries no changes".into(),
        ));
    }

    let subscription = resolve_subscription(ctx, change).await?;

    // Apply the deltas to the durable local state first; the cache is
    // refreshed afterwards and may lag.
    let mut state = ctx
        .repository
        .get_character_state(change.character_id)
        .await?
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    for entry in &change.changes {
        set_value_at(&mut state, &entry.field_path, entry.new_value.clone());
    }
    ctx.repository
        .upsert_character_state(change.character_id, &state)
        .await?;
    if let Err(err) = ctx.cache.set_state(change.character_id, &state).await {
        tracing::warn!(character_id = %change.character_id, error = %err, "state cache refresh failed");
    }

    let Some(subscription) = subscription else {
        // No subscription: the local mutation stands, nothing to
        // forward and no pair bookkeeping to advance.
        return Ok(Applied {
            campaign_id: change.campaign_id,
            forwarded: false,
        });
    };

    let now = ctx.clock.now();
    let mut metadata = ctx
        .repository
        .get_metadata(subscription.character_id, subscription.campaign_id)
        .await?
        .unwrap_or_else(|| {
            SyncMetadata::new(subscription.character_id, subscription.campaign_id, now)
        });
    metadata.character_version += 1;
    metadata.last_sync = now;
    ctx.repository.upsert_metadata(&metadata).await?;
    if let Err(err) = ctx.cache.set_metadata(&metadata).await {
        tracing::warn!(character_id = %change.character_id, error = %err, "metadata cache refresh failed");
    }

    let admitted = allowed_changes(&subscription, &change.changes);
    if !subscription.pushes() || admitted.is_empty() {
        return Ok(Applied {
            campaign_id: Some(subscription.campaign_id),
            forwarded: false,
        });
    }

    let mut delta = Value::Object(serde_json::Map::new());
    for entry in admitted {
        set_value_at(&mut delta, &entry.field_path, entry.new_value.clone());
    }
    let message = SyncMessage::new(
        SyncMessageKind::CharacterState(CharacterStatePayload {
            character_id: change.character_id,
            campaign_id: Some(subscription.campaign_id),
            version: metadata.character_version,
            state_data: delta,
        }),
        now,
    );
    ctx.publisher.enqueue(message)?;

    Ok(Applied {
        campaign_id: Some(subscription.campaign_id),
        forwarded: true,
    })
}

/// Handles one character→campaign push: applies the deltas locally,
/// advances the pair's character version, and forwards the admitted
/// fields toward the campaign via the publication manager.
///
/// # Errors
///
/// Returns [`SyncError::Sync`] only when the reply itself cannot be
/// published, so the transport redelivers the inbound message.
pub async fn handle_character_state_change(
    ctx: &SyncContext,
    change: &CharacterStateChange,
) -> Result<(), SyncError> {
    let result = with_retry(&ctx.retry, "character_state_change", async || {
        apply(ctx, change).await
    })
    .await;

    match result {
        Ok(applied) => {
            let status = SyncStatus {
                message_id: Uuid::new_v4(),
                in_reply_to: change.message_id,
                character_id: change.character_id,
                campaign_id: applied.campaign_id,
                status: if applied.forwarded {
                    "forwarded".to_owned()
                } else {
                    "accepted".to_owned()
                },
                timestamp: ctx.clock.now(),
            };
            let payload = serde_json::to_value(&status)
                .map_err(|e| SyncError::Sync(format!("status encode failed: {e}")))?;
            ctx.bus.publish(SYNC_STATUS_TOPIC, payload).await
        }
        Err(err) => {
            tracing::warn!(
                message_id = %change.message_id,
                character_id = %change.character_id,
                error = %err,
                "character state change failed"
            );
            send_error_reply(ctx, SYNC_ERROR_TOPIC, change.message_id, &err).await
        }
    }
}
