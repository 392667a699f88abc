//! Topic consume loop.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use waystone_protocol::SyncContext;
use waystone_protocol::handlers::{
    handle_campaign_state_update, handle_character_state_change, handle_sync_control,
    handle_version_query,
};
use waystone_protocol::messages::{
    CAMPAIGN_STATE_UPDATE_TOPIC, CHARACTER_STATE_CHANGE_TOPIC, CampaignStateUpdate,
    CharacterStateChange, SYNC_CONTROL_TOPIC, SyncControlCommand, VERSION_QUERY_TOPIC,
    VersionQuery,
};

use crate::bus::InProcessBus;

/// Receivers for the four consumed topics.
pub struct TopicConsumers {
    campaign_updates: UnboundedReceiver<Value>,
    character_changes: UnboundedReceiver<Value>,
    control_commands: UnboundedReceiver<Value>,
    version_queries: UnboundedReceiver<Value>,
}

impl TopicConsumers {
    /// Binds all consumed topics on the bus.
    #[must_use]
    pub fn bind(bus: &InProcessBus) -> Self {
        Self {
            campaign_updates: bus.subscribe(CAMPAIGN_STATE_UPDATE_TOPIC),
            character_changes: bus.subscribe(CHARACTER_STATE_CHANGE_TOPIC),
            control_commands: bus.subscribe(SYNC_CONTROL_TOPIC),
            version_queries: bus.subscribe(VERSION_QUERY_TOPIC),
        }
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(message) => Some(message),
        Err(err) => {
            // Undecodable input carries no message id to correlate an
            // error reply to; drop it loudly.
            tracing::warn!(topic, error = %err, "discarding undecodable message");
            None
        }
    }
}

/// Multiplexes the four consumed topics into their handlers until
/// every topic sender is gone. Handler failures are logged; a real
/// broker would redeliver.
pub async fn run(ctx: &SyncContext, consumers: &mut TopicConsumers) {
    loop {
        tokio::select! {
            payload = consumers.campaign_updates.recv() => {
                let Some(payload) = payload else { break };
                if let Some(update) = decode::<CampaignStateUpdate>(CAMPAIGN_STATE_UPDATE_TOPIC, payload)
                    && let Err(err) = handle_campaign_state_update(ctx, &update).await
                {
                    tracing::error!(error = %err, "campaign state handler reply failed");
                }
            }
            payload = consumers.character_changes.recv() => {
                let Some(payload) = payload else { break };
                if let Some(change) = decode::<CharacterStateChange>(CHARACTER_STATE_CHANGE_TOPIC, payload)
                    && let Err(err) = handle_character_state_change(ctx, &change).await
                {
                    tracing::error!(error = %err, "character state handler reply failed");
                }
            }
            payload = consumers.control_commands.recv() => {
                let Some(payload) = payload else { break };
                if let Some(command) = decode::<SyncControlCommand>(SYNC_CONTROL_TOPIC, payload)
                    && let Err(err) = handle_sync_control(ctx, &command).await
                {
                    tracing::error!(error = %err, "sync control handler reply failed");
                }
            }
            payload = consumers.version_queries.recv() => {
                let Some(payload) = payload else { break };
                if let Some(query) = decode::<VersionQuery>(VERSION_QUERY_TOPIC, payload)
                    && let Err(err) = handle_version_query(ctx, &query).await
                {
                    tracing::error!(error = %err, "version query handler reply failed");
                }
            }
        }
    }
    tracing::info!("all consumed topics closed, consumer loop ending");
}
