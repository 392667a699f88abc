//! `PostgreSQL` implementation of the `SyncRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use waystone_core::error::SyncError;
use waystone_core::record::{SyncConflict, SyncMetadata, SyncSubscription};
use waystone_core::repository::SyncRepository;
use waystone_core::state::FieldPath;

fn db_err(err: sqlx::Error) -> SyncError {
    SyncError::Sync(format!("database error: {err}"))
}

fn metadata_from_row(row: &PgRow) -> Result<SyncMetadata, SyncError> {
    Ok(SyncMetadata {
        character_id: row.try_get("character_id").map_err(db_err)?,
        campaign_id: row.try_get("campaign_id").map_err(db_err)?,
        character_version: row.try_get("character_version").map_err(db_err)?,
        campaign_version: row.try_get("campaign_version").map_err(db_err)?,
        last_sync: row.try_get("last_sync").map_err(db_err)?,
    })
}

fn conflict_from_row(row: &PgRow) -> Result<SyncConflict, SyncError> {
    let field_path: String = row.try_get("field_path").map_err(db_err)?;
    Ok(SyncConflict {
        id: row.try_get("id").map_err(db_err)?,
        character_id: row.try_get("character_id").map_err(db_err)?,
        campaign_id: row.try_get("campaign_id").map_err(db_err)?,
        field_path: FieldPath::new(field_path),
        character_value: row.try_get("character_value").map_err(db_err)?,
        campaign_value: row.try_get("campaign_value").map_err(db_err)?,
        character_version: row.try_get("character_version").map_err(db_err)?,
        campaign_version: row.try_get("campaign_version").map_err(db_err)?,
        detected_at: row.try_get("detected_at").map_err(db_err)?,
        resolved: row.try_get("resolved").map_err(db_err)?,
        resolution_strategy: row.try_get("resolution_strategy").map_err(db_err)?,
        resolved_value: row.try_get("resolved_value").map_err(db_err)?,
        resolved_at: row.try_get("resolved_at").map_err(db_err)?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<SyncSubscription, SyncError> {
    let fields: Value = row.try_get("fields").map_err(db_err)?;
    let fields: Vec<FieldPath> = serde_json::from_value(fields)
        .map_err(|e| SyncError::Sync(format!("subscription fields decode failed: {e}")))?;
    let direction: String = row.try_get("direction").map_err(db_err)?;
    Ok(SyncSubscription {
        character_id: row.try_get("character_id").map_err(db_err)?,
        campaign_id: row.try_get("campaign_id").map_err(db_err)?,
        fields,
        direction: direction.parse()?,
    })
}

/// PostgreSQL-backed sync repository.
#[derive(Debug, Clone)]
pub struct PgSyncRepository {
    pool: PgPool,
}

impl PgSyncRepository {
    /// Creates a new `PgSyncRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncRepository for PgSyncRepository {
    async fn get_metadata(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncMetadata>, SyncError> {
        let row = sqlx::query(
            "SELECT character_id, campaign_id, character_version, campaign_version, last_sync
             FROM sync_metadata
             WHERE character_id = $1 AND campaign_id = $2",
        )
        .bind(character_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(metadata_from_row).transpose()
    }

    async fn upsert_metadata(&self, metadata: &SyncMetadata) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO sync_metadata
                 (character_id, campaign_id, character_version, campaign_version, last_sync)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (character_id, campaign_id) DO UPDATE SET
                 character_version = EXCLUDED.character_version,
                 campaign_version = EXCLUDED.campaign_version,
                 last_sync = EXCLUDED.last_sync",
        )
        .bind(metadata.character_id)
        .bind(metadata.campaign_id)
        .bind(metadata.character_version)
        .bind(metadata.campaign_version)
        .bind(metadata.last_sync)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_conflict(&self, conflict: &SyncConflict) -> Result<bool, SyncError> {
        let result = sqlx::query(
            "INSERT INTO sync_conflicts
                 (id, character_id, campaign_id, field_path, character_value, campaign_value,
                  character_version, campaign_version, detected_at, resolved,
                  resolution_strategy, resolved_value, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (character_id, field_path, character_version, campaign_version)
                 DO NOTHING",
        )
        .bind(conflict.id)
        .bind(conflict.character_id)
        .bind(conflict.campaign_id)
        .bind(conflict.field_path.as_str())
        .bind(&conflict.character_value)
        .bind(&conflict.campaign_value)
        .bind(conflict.character_version)
        .bind(conflict.campaign_version)
        .bind(conflict.detected_at)
        .bind(conflict.resolved)
        .bind(&conflict.resolution_strategy)
        .bind(&conflict.resolved_value)
        .bind(conflict.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_unresolved_conflicts(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        let rows = sqlx::query(
            "SELECT id, character_id, campaign_id, field_path, character_value, campaign_value,
                    character_version, campaign_version, detected_at, resolved,
                    resolution_strategy, resolved_value, resolved_at
             FROM sync_conflicts
             WHERE character_id = $1 AND campaign_id = $2 AND NOT resolved
             ORDER BY detected_at, field_path",
        )
        .bind(character_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(conflict_from_row).collect()
    }

    async fn mark_conflict_resolved(
        &self,
        conflict_id: Uuid,
        strategy: &str,
        resolved_value: &Value,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "UPDATE sync_conflicts SET
                 resolved = TRUE,
                 resolution_strategy = $2,
                 resolved_value = $3,
                 resolved_at = $4
             WHERE id = $1 AND NOT resolved",
        )
        .bind(conflict_id)
        .bind(strategy)
        .bind(resolved_value)
        .bind(resolved_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<SyncSubscription>, SyncError> {
        let row = sqlx::query(
            "SELECT character_id, campaign_id, fields, direction
             FROM sync_subscriptions
             WHERE character_id = $1 AND campaign_id = $2",
        )
        .bind(character_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn upsert_subscription(
        &self,
        subscription: &SyncSubscription,
    ) -> Result<(), SyncError> {
        let fields = serde_json::to_value(&subscription.fields)
            .map_err(|e| SyncError::Sync(format!("subscription fields encode failed: {e}")))?;
        sqlx::query(
            "INSERT INTO sync_subscriptions (character_id, campaign_id, fields, direction)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (character_id, campaign_id) DO UPDATE SET
                 fields = EXCLUDED.fields,
                 direction = EXCLUDED.direction",
        )
        .bind(subscription.character_id)
        .bind(subscription.campaign_id)
        .bind(fields)
        .bind(subscription.direction.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_subscription(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "DELETE FROM sync_subscriptions WHERE character_id = $1 AND campaign_id = $2",
        )
        .bind(character_id)
        .bind(campaign_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_subscriptions_for_character(
        &self,
        character_id: Uuid,
    ) -> Result<Vec<SyncSubscription>, SyncError> {
        let rows = sqlx::query(
            "SELECT character_id, campaign_id, fields, direction
             FROM sync_subscriptions
             WHERE character_id = $1
             ORDER BY campaign_id",
        )
        .bind(character_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn get_character_state(&self, character_id: Uuid) -> Result<Option<Value>, SyncError> {
        let row = sqlx::query("SELECT state FROM character_states WHERE character_id = $1")
            .bind(character_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row.try_get("state").map_err(db_err)).transpose()
    }

    async fn upsert_character_state(
        &self,
        character_id: Uuid,
        state: &Value,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO character_states (character_id, state, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (character_id) DO UPDATE SET
                 state = EXCLUDED.state,
                 updated_at = NOW()",
        )
        .bind(character_id)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_base_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
    ) -> Result<Option<Value>, SyncError> {
        let row = sqlx::query(
            "SELECT state FROM sync_base_snapshots
             WHERE character_id = $1 AND campaign_id = $2 AND campaign_version = $3",
        )
        .bind(character_id)
        .bind(campaign_id)
        .bind(campaign_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|row| row.try_get("state").map_err(db_err)).transpose()
    }

    async fn upsert_base_snapshot(
        &self,
        character_id: Uuid,
        campaign_id: Uuid,
        campaign_version: i64,
        state: &Value,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO sync_base_snapshots
                 (character_id, campaign_id, campaign_version, state, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (character_id, campaign_id, campaign_version) DO UPDATE SET
                 state = EXCLUDED.state",
        )
        .bind(character_id)
        .bind(campaign_id)
        .bind(campaign_version)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
