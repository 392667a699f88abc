//! Version query handler.

use uuid::Uuid;

use waystone_core::bus::MessageBus;
use waystone_core::clock::Clock;
use waystone_core::error::SyncError;
use waystone_core::record::SyncMetadata;
use waystone_core::repository::SyncRepository;

use crate::context::SyncContext;
use crate::handlers::send_error_reply;
use crate::messages::{SYNC_ERROR_TOPIC, VERSION_INFO_TOPIC, VersionInfo, VersionQuery};
use crate::retry::with_retry;

/// Cache first, repository second; a repository hit backfills the
/// cache for the next reconnect burst.
async fn load_metadata(
    ctx: &SyncContext,
    query: &VersionQuery,
) -> Result<Option<SyncMetadata>, SyncError> {
    match ctx
        .cache
        .get_metadata(query.character_id, query.campaign_id)
        .await
    {
        Ok(Some(metadata)) => return Ok(Some(metadata)),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(character_id = %query.character_id, error = %err, "metadata cache read failed, using repository");
        }
    }
    let metadata = ctx
        .repository
        .get_metadata(query.character_id, query.campaign_id)
        .await?;
    if let Some(metadata) = &metadata
        && let Err(err) = ctx.cache.set_metadata(metadata).await
    {
        tracing::warn!(character_id = %query.character_id, error = %err, "metadata cache backfill failed");
    }
    Ok(metadata)
}

/// Handles one version query: answers with the pair's version
/// bookkeeping, or zero-defaults when the pair has never synced, so a
/// reconnecting peer can reconcile.
///
/// # Errors
///
/// Returns [`SyncError::Sync`] only when the reply itself cannot be
/// published, so the transport redelivers the inbound message.
pub async fn handle_version_query(
    ctx: &SyncContext,
    query: &VersionQuery,
) -> Result<(), SyncError> {
    let result = with_retry(&ctx.retry, "version_query", async || {
        load_metadata(ctx, query).await
    })
    .await;

    match result {
        Ok(metadata) => {
            let info = match metadata {
                Some(metadata) => VersionInfo {
                    message_id: Uuid::new_v4(),
                    in_reply_to: query.message_id,
                    character_id: query.character_id,
                    campaign_id: query.campaign_id,
                    character_version: metadata.character_version,
                    campaign_version: metadata.campaign_version,
                    last_sync: Some(metadata.last_sync),
                    timestamp: ctx.clock.now(),
                },
                None => VersionInfo {
                    message_id: Uuid::new_v4(),
                    in_reply_to: query.message_id,
                    character_id: query.character_id,
                    campaign_id: query.campaign_id,
                    character_version: 0,
                    campaign_version: 0,
                    last_sync: None,
                    timestamp: ctx.clock.now(),
                },
            };
            let payload = serde_json::to_value(&info)
                .map_err(|e| SyncError::Sync(format!("version info encode failed: {e}")))?;
            ctx.bus.publish(VERSION_INFO_TOPIC, payload).await
        }
        Err(err) => {
            tracing::warn!(
                message_id = %query.message_id,
                character_id = %query.character_id,
                error = %err,
                "version query failed"
            );
            send_error_reply(ctx, SYNC_ERROR_TOPIC, query.message_id, &err).await
        }
    }
}
