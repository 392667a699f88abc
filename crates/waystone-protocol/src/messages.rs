//! Wire messages for the synchronization control plane.
//!
//! Inbound messages arrive on the consumed topics; outbound replies
//! always correlate back to the inbound message id. Identifiers are
//! opaque globally-unique strings on the wire; timestamps are
//! ISO-8601.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use waystone_core::record::SyncDirection;
use waystone_core::state::FieldPath;

/// Topic carrying campaign→character state pushes.
pub const CAMPAIGN_STATE_UPDATE_TOPIC: &str = "campaign-state-update";

/// Topic carrying character→campaign state pushes.
pub const CHARACTER_STATE_CHANGE_TOPIC: &str = "character-state-change";

/// Topic carrying subscription control commands.
pub const SYNC_CONTROL_TOPIC: &str = "sync-control";

/// Topic carrying version queries.
pub const VERSION_QUERY_TOPIC: &str = "version-query";

/// Topic for campaign push acknowledgements.
pub const CAMPAIGN_STATE_ACK_TOPIC: &str = "campaign-state-ack";

/// Topic for campaign push failures.
pub const CAMPAIGN_STATE_ERROR_TOPIC: &str = "campaign-state-error";

/// Topic for control-plane status replies.
pub const SYNC_STATUS_TOPIC: &str = "sync-status";

/// Topic for control-plane failures.
pub const SYNC_ERROR_TOPIC: &str = "sync-error";

/// Topic for version query replies.
pub const VERSION_INFO_TOPIC: &str = "version-info";

/// One changed field inside a state push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChangeEntry {
    /// The field that changed.
    pub field_path: FieldPath,
    /// The value before the change, when the sender knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// The value after the change.
    pub new_value: Value,
}

/// Campaign→character push: one or more field changes plus the
/// sender's version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStateUpdate {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The character the update targets.
    pub character_id: Uuid,
    /// The campaign pushing the update.
    pub campaign_id: Uuid,
    /// Campaign-side version after these changes.
    pub version: i64,
    /// The changed fields.
    pub changes: Vec<FieldChangeEntry>,
    /// When the sender created the message.
    pub timestamp: DateTime<Utc>,
}

/// Character→campaign push: local field deltas headed for the
/// pipeline. The campaign is resolved via subscription lookup when the
/// sender does not name it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStateChange {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The character whose state changed.
    pub character_id: Uuid,
    /// The target campaign, if the sender knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
    /// The changed fields.
    pub changes: Vec<FieldChangeEntry>,
    /// When the sender created the message.
    pub timestamp: DateTime<Utc>,
}

/// Subscription control command. The command is a raw string so an
/// unrecognized verb degrades to a typed error instead of a decode
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncControlCommand {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The character the command concerns.
    pub character_id: Uuid,
    /// The campaign the command concerns.
    pub campaign_id: Uuid,
    /// `subscribe` or `unsubscribe`.
    pub command: String,
    /// Field allow-list for `subscribe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldPath>>,
    /// Sync direction for `subscribe`; defaults to bidirectional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SyncDirection>,
    /// When the sender created the message.
    pub timestamp: DateTime<Utc>,
}

/// Read-only query for a pair's version bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionQuery {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The character side of the pair.
    pub character_id: Uuid,
    /// The campaign side of the pair.
    pub campaign_id: Uuid,
    /// When the sender created the message.
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement of an applied campaign push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStateAck {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The inbound message this acknowledges.
    pub in_reply_to: Uuid,
    /// The character the update targeted.
    pub character_id: Uuid,
    /// The campaign that pushed the update.
    pub campaign_id: Uuid,
    /// Fields applied without conflict.
    pub applied_fields: usize,
    /// Conflicts recorded by this update.
    pub conflicts: usize,
    /// Conflicts left unresolved by this update.
    pub unresolved: usize,
    /// When the reply was created.
    pub timestamp: DateTime<Utc>,
}

/// Control-plane status reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The inbound message this answers.
    pub in_reply_to: Uuid,
    /// The character the status concerns.
    pub character_id: Uuid,
    /// The campaign the status concerns, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
    /// `subscribed`, `unsubscribed`, `forwarded`, or `accepted`.
    pub status: String,
    /// When the reply was created.
    pub timestamp: DateTime<Utc>,
}

/// Correlated failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorReply {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The inbound message that failed.
    pub in_reply_to: Uuid,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// When the reply was created.
    pub timestamp: DateTime<Utc>,
}

/// Version query reply. Zero-defaults when no metadata exists, so a
/// reconnecting peer can reconcile from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Globally unique message identifier.
    pub message_id: Uuid,
    /// The inbound query this answers.
    pub in_reply_to: Uuid,
    /// The character side of the pair.
    pub character_id: Uuid,
    /// The campaign side of the pair.
    pub campaign_id: Uuid,
    /// Character-side version, 0 when the pair never synced.
    pub character_version: i64,
    /// Campaign-side version, 0 when the pair never synced.
    pub campaign_version: i64,
    /// Last sync time, absent when the pair never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// When the reply was created.
    pub timestamp: DateTime<Utc>,
}
