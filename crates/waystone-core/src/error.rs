//! Synchronization error taxonomy.

use thiserror::Error;

/// Top-level error type for the synchronization subsystem.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A transport or serialization failure in the caching layer.
    ///
    /// Every cache failure surfaces as this single kind so callers
    /// need no transport-specific handling.
    #[error("cache error: {0}")]
    Cache(String),

    /// A resolution strategy could not produce a resolved value.
    #[error("unresolvable conflict on `{field_path}`: {reason}")]
    Conflict {
        /// The field path the strategy was applied to.
        field_path: String,
        /// Why the strategy could not resolve the field.
        reason: String,
    },

    /// Malformed or semantically invalid protocol input.
    #[error("invalid message: {0}")]
    Message(String),

    /// Catch-all for storage, bus, and other synchronization failures.
    #[error("sync error: {0}")]
    Sync(String),
}

impl SyncError {
    /// Builds a conflict error for a field path.
    #[must_use]
    pub fn conflict(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            field_path: field_path.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Cache and generic sync failures are transient (transport-level);
    /// conflict and message errors are deterministic and fail fast.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::Sync(_))
    }

    /// Machine-readable error code for outbound error messages.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cache(_) => "cache_error",
            Self::Conflict { .. } => "conflict_error",
            Self::Message(_) => "message_error",
            Self::Sync(_) => "sync_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_and_sync_errors_are_retriable() {
        assert!(SyncError::Cache("timeout".into()).is_retriable());
        assert!(SyncError::Sync("bus unavailable".into()).is_retriable());
    }

    #[test]
    fn test_conflict_and_message_errors_fail_fast() {
        assert!(!SyncError::conflict("combat.hit_points", "not a number").is_retriable());
        assert!(!SyncError::Message("missing field".into()).is_retriable());
    }

    #[test]
    fn test_conflict_error_names_the_field() {
        let err = SyncError::conflict("resources.spell_slots", "shape mismatch");
        assert_eq!(
            err.to_string(),
            "unresolvable conflict on `resources.spell_slots`: shape mismatch"
        );
        assert_eq!(err.code(), "conflict_error");
    }
}
