//! Transient state-change types flowing through the sync pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Dotted address into a character state document,
/// e.g. `resources.spell_slots`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    /// Creates a field path from a dotted string.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a dotted string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the `.`-separated segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Extends the path with one more segment.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_owned())
        } else {
            Self(format!("{}.{segment}", self.0))
        }
    }

    /// Whether this path starts with the given dotted prefix.
    ///
    /// Prefixes match on segment boundaries: `combat.hit` is not a
    /// prefix of `combat.hit_points`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0 == prefix
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Which side of the sync pair produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// The character service (the authoritative owner).
    Character,
    /// The campaign service.
    Campaign,
}

/// How urgently a change should be propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Propagate as soon as possible.
    Realtime,
    /// Propagate with the next batch.
    Batch,
}

/// A single field mutation moving through the pipeline.
///
/// Produced at mutation time and discarded after the pipeline consumes
/// it; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// The character whose state changed.
    pub character_id: Uuid,
    /// The campaign involved, once known. Resolved downstream via
    /// subscription lookup when the producer does not know it.
    pub campaign_id: Option<Uuid>,
    /// The field that changed.
    pub field_path: FieldPath,
    /// The value before the change, when the producer knows it.
    pub old_value: Option<Value>,
    /// The value after the change.
    pub new_value: Value,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Which side produced the change.
    pub source: ChangeSource,
    /// Propagation urgency.
    pub sync_mode: SyncMode,
}
