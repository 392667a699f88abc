//! Durable synchronization records.
//!
//! These records live in the repository; cached copies expire via TTL
//! independently, and the durable record remains the source of truth.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SyncError;
use crate::state::FieldPath;

/// Version bookkeeping for one (character, campaign) pair.
///
/// One active record per pair; both versions are monotonically
/// non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// The character side of the pair.
    pub character_id: Uuid,
    /// The campaign side of the pair.
    pub campaign_id: Uuid,
    /// Version of the character-side state.
    pub character_version: i64,
    /// Version of the campaign-side state.
    pub campaign_version: i64,
    /// When the pair last synchronized.
    pub last_sync: DateTime<Utc>,
}

impl SyncMetadata {
    /// Fresh metadata for a pair that has never synchronized.
    #[must_use]
    pub fn new(character_id: Uuid, campaign_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            character_id,
            campaign_id,
            character_version: 0,
            campaign_version: 0,
            last_sync: now,
        }
    }
}

/// A recorded divergence between the two sides of a sync pair.
///
/// Created at most once per (character_id, field_path,
/// character_version, campaign_version); immutable once resolved. The
/// recorded versions are the pair's versions at detection time, so the
/// historical base can be reconstructed for a later retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Record identifier.
    pub id: Uuid,
    /// The character side of the pair.
    pub character_id: Uuid,
    /// The campaign side of the pair.
    pub campaign_id: Uuid,
    /// The field both sides changed.
    pub field_path: FieldPath,
    /// The character side's value at detection.
    pub character_value: Value,
    /// The campaign side's value at detection.
    pub campaign_value: Value,
    /// Character-side version at detection.
    pub character_version: i64,
    /// Campaign-side version at detection (the base version).
    pub campaign_version: i64,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
    /// Whether a strategy produced a resolved value.
    pub resolved: bool,
    /// Name of the strategy that resolved the field, if any.
    pub resolution_strategy: Option<String>,
    /// The merged value, if resolved.
    pub resolved_value: Option<Value>,
    /// When the conflict was resolved, if resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncConflict {
    /// Records a conflict no strategy could resolve yet.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn unresolved(
        character_id: Uuid,
        campaign_id: Uuid,
        field_path: FieldPath,
        character_value: Value,
        campaign_value: Value,
        character_version: i64,
        campaign_version: i64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            character_id,
            campaign_id,
            field_path,
            character_value,
            campaign_value,
            character_version,
            campaign_version,
            detected_at,
            resolved: false,
            resolution_strategy: None,
            resolved_value: None,
            resolved_at: None,
        }
    }

    /// Marks this conflict resolved with the given strategy and value.
    #[must_use]
    pub fn into_resolved(
        mut self,
        strategy: &str,
        resolved_value: Value,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        self.resolved = true;
        self.resolution_strategy = Some(strategy.to_owned());
        self.resolved_value = Some(resolved_value);
        self.resolved_at = Some(resolved_at);
        self
    }
}

/// Which way state flows for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Both sides exchange state.
    Bidirectional,
    /// Character changes push out; campaign updates are not applied.
    PushOnly,
    /// Campaign updates apply; character changes are not forwarded.
    PullOnly,
}

impl SyncDirection {
    /// Stable string form used in storage and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::PushOnly => "push_only",
            Self::PullOnly => "pull_only",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bidirectional" => Ok(Self::Bidirectional),
            "push_only" => Ok(Self::PushOnly),
            "pull_only" => Ok(Self::PullOnly),
            other => Err(SyncError::Message(format!(
                "unknown sync direction: {other}"
            ))),
        }
    }
}

/// An active subscription of a character to a campaign's state flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSubscription {
    /// The subscribing character.
    pub character_id: Uuid,
    /// The campaign subscribed to.
    pub campaign_id: Uuid,
    /// Explicit allow-list of fields to synchronize.
    pub fields: Vec<FieldPath>,
    /// Which way state flows.
    pub direction: SyncDirection,
}

impl SyncSubscription {
    /// Whether character-side changes should be pushed toward the
    /// campaign under this subscription.
    #[must_use]
    pub fn pushes(&self) -> bool {
        matches!(
            self.direction,
            SyncDirection::Bidirectional | SyncDirection::PushOnly
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_direction_round_trips_through_str() {
        for direction in [
            SyncDirection::Bidirectional,
            SyncDirection::PushOnly,
            SyncDirection::PullOnly,
        ] {
            assert_eq!(direction.as_str().parse::<SyncDirection>().unwrap(), direction);
        }
    }

    #[test]
    fn test_unknown_sync_direction_is_a_message_error() {
        let err = "sideways".parse::<SyncDirection>().unwrap_err();
        assert!(matches!(err, SyncError::Message(_)));
    }

    #[test]
    fn test_pull_only_subscription_does_not_push() {
        let sub = SyncSubscription {
            character_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            fields: vec![FieldPath::new("combat.hit_points")],
            direction: SyncDirection::PullOnly,
        };
        assert!(!sub.pushes());
    }

    #[test]
    fn test_into_resolved_fills_resolution_fields() {
        let now = Utc::now();
        let conflict = SyncConflict::unresolved(
            Uuid::new_v4(),
            Uuid::new_v4(),
            FieldPath::new("combat.hit_points"),
            serde_json::json!(15),
            serde_json::json!(12),
            3,
            2,
            now,
        )
        .into_resolved("rule_based", serde_json::json!(12), now);

        assert!(conflict.resolved);
        assert_eq!(conflict.resolution_strategy.as_deref(), Some("rule_based"));
        assert_eq!(conflict.resolved_value, Some(serde_json::json!(12)));
        assert_eq!(conflict.resolved_at, Some(now));
    }
}
