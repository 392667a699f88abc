//! Outbound message envelope for the publication pipeline.
//!
//! Every message carries a globally unique id, a type tag, an ISO-8601
//! timestamp, and a typed payload. The publisher routes each message to
//! the bus topic keyed by its type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Topic for campaign-scoped domain events.
pub const CAMPAIGN_EVENTS_TOPIC: &str = "campaign-events";

/// Topic for character state pushes toward the campaign side.
pub const CHARACTER_STATE_EVENTS_TOPIC: &str = "character-state-events";

/// Topic for character progress events.
pub const PROGRESS_EVENTS_TOPIC: &str = "progress-events";

/// Topic for terminal publication failures.
pub const SYNC_ERRORS_TOPIC: &str = "sync-errors";

/// Message type identifier for [`CampaignEventPayload`].
pub const CAMPAIGN_EVENT_MESSAGE_TYPE: &str = "sync.campaign_event";

/// Message type identifier for [`CharacterStatePayload`].
pub const CHARACTER_STATE_MESSAGE_TYPE: &str = "sync.character_state";

/// Message type identifier for [`ProgressEventPayload`].
pub const PROGRESS_EVENT_MESSAGE_TYPE: &str = "sync.progress_event";

/// Message type identifier for [`ErrorPayload`].
pub const ERROR_MESSAGE_TYPE: &str = "sync.error";

/// Metadata attached to every outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
}

/// A campaign-scoped domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignEventPayload {
    /// The campaign the event belongs to.
    pub campaign_id: Uuid,
    /// The character involved, if any.
    pub character_id: Option<Uuid>,
    /// Domain event name, e.g. `encounter_started`.
    pub event_name: String,
    /// Event-specific data.
    pub data: Value,
}

/// A character state push toward the campaign side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStatePayload {
    /// The character whose state is pushed.
    pub character_id: Uuid,
    /// The target campaign, once resolved.
    pub campaign_id: Option<Uuid>,
    /// Character-side version after the push.
    pub version: i64,
    /// The changed portion of the state document.
    pub state_data: Value,
}

/// A character progress event (experience, level, milestones).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEventPayload {
    /// The character that progressed.
    pub character_id: Uuid,
    /// The campaign the progress happened in, if known.
    pub campaign_id: Option<Uuid>,
    /// Progress event name, e.g. `level_up`.
    pub event_name: String,
    /// Event-specific data.
    pub data: Value,
}

/// A terminal failure converted into a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// The message that failed, when the error relates to one.
    pub related_message_id: Option<Uuid>,
}

/// Payload variants for outbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessageKind {
    /// A campaign-scoped domain event.
    CampaignEvent(CampaignEventPayload),
    /// A character state push.
    CharacterState(CharacterStatePayload),
    /// A character progress event.
    ProgressEvent(ProgressEventPayload),
    /// A terminal failure.
    Error(ErrorPayload),
}

/// Outbound message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Message metadata.
    pub metadata: MessageMetadata,
    /// Message-specific payload.
    pub kind: SyncMessageKind,
}

impl SyncMessage {
    /// Creates a message with a fresh id.
    #[must_use]
    pub fn new(kind: SyncMessageKind, now: DateTime<Utc>) -> Self {
        Self {
            metadata: MessageMetadata {
                message_id: Uuid::new_v4(),
                timestamp: now,
            },
            kind,
        }
    }

    /// Returns the message type tag.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match &self.kind {
            SyncMessageKind::CampaignEvent(_) => CAMPAIGN_EVENT_MESSAGE_TYPE,
            SyncMessageKind::CharacterState(_) => CHARACTER_STATE_MESSAGE_TYPE,
            SyncMessageKind::ProgressEvent(_) => PROGRESS_EVENT_MESSAGE_TYPE,
            SyncMessageKind::Error(_) => ERROR_MESSAGE_TYPE,
        }
    }

    /// Returns the bus topic this message publishes to, keyed by type.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match &self.kind {
            SyncMessageKind::CampaignEvent(_) => CAMPAIGN_EVENTS_TOPIC,
            SyncMessageKind::CharacterState(_) => CHARACTER_STATE_EVENTS_TOPIC,
            SyncMessageKind::ProgressEvent(_) => PROGRESS_EVENTS_TOPIC,
            SyncMessageKind::Error(_) => SYNC_ERRORS_TOPIC,
        }
    }

    /// Serializes the message for the wire.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(self).expect("SyncMessage serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character_state_message() -> SyncMessage {
        SyncMessage::new(
            SyncMessageKind::CharacterState(CharacterStatePayload {
                character_id: Uuid::new_v4(),
                campaign_id: Some(Uuid::new_v4()),
                version: 3,
                state_data: serde_json::json!({"combat": {"hit_points": 12}}),
            }),
            Utc::now(),
        )
    }

    #[test]
    fn test_topic_is_keyed_by_message_type() {
        let now = Utc::now();
        let cases = [
            (
                SyncMessageKind::CampaignEvent(CampaignEventPayload {
                    campaign_id: Uuid::new_v4(),
                    character_id: None,
                    event_name: "encounter_started".to_owned(),
                    data: serde_json::json!({}),
                }),
                CAMPAIGN_EVENT_MESSAGE_TYPE,
                CAMPAIGN_EVENTS_TOPIC,
            ),
            (
                character_state_message().kind,
                CHARACTER_STATE_MESSAGE_TYPE,
                CHARACTER_STATE_EVENTS_TOPIC,
            ),
            (
                SyncMessageKind::ProgressEvent(ProgressEventPayload {
                    character_id: Uuid::new_v4(),
                    campaign_id: None,
                    event_name: "level_up".to_owned(),
                    data: serde_json::json!({"level": 4}),
                }),
                PROGRESS_EVENT_MESSAGE_TYPE,
                PROGRESS_EVENTS_TOPIC,
            ),
            (
                SyncMessageKind::Error(ErrorPayload {
                    code: "publication_failed".to_owned(),
                    message: "out of retries".to_owned(),
                    related_message_id: Some(Uuid::new_v4()),
                }),
                ERROR_MESSAGE_TYPE,
                SYNC_ERRORS_TOPIC,
            ),
        ];

        for (kind, message_type, topic) in cases {
            let message = SyncMessage::new(kind, now);
            assert_eq!(message.message_type(), message_type);
            assert_eq!(message.topic(), topic);
        }
    }

    #[test]
    fn test_message_round_trips_through_json() {
        let message = character_state_message();
        let value = message.to_payload();
        let decoded: SyncMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_new_messages_get_distinct_ids() {
        let a = character_state_message();
        let b = character_state_message();
        assert_ne!(a.metadata.message_id, b.metadata.message_id);
    }
}
