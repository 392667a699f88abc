//! Sync store database schema.

/// SQL to create the synchronization tables.
pub const CREATE_SYNC_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS sync_metadata (
    character_id      UUID NOT NULL,
    campaign_id       UUID NOT NULL,
    character_version BIGINT NOT NULL DEFAULT 0,
    campaign_version  BIGINT NOT NULL DEFAULT 0,
    last_sync         TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (character_id, campaign_id)
);

CREATE TABLE IF NOT EXISTS sync_conflicts (
    id                  UUID PRIMARY KEY,
    character_id        UUID NOT NULL,
    campaign_id         UUID NOT NULL,
    field_path          VARCHAR(255) NOT NULL,
    character_value     JSONB NOT NULL,
    campaign_value      JSONB NOT NULL,
    character_version   BIGINT NOT NULL,
    campaign_version    BIGINT NOT NULL,
    detected_at         TIMESTAMPTZ NOT NULL,
    resolved            BOOLEAN NOT NULL DEFAULT FALSE,
    resolution_strategy VARCHAR(64),
    resolved_value      JSONB,
    resolved_at         TIMESTAMPTZ,
    UNIQUE (character_id, field_path, character_version, campaign_version)
);

CREATE INDEX IF NOT EXISTS idx_sync_conflicts_pair_unresolved
    ON sync_conflicts (character_id, campaign_id)
    WHERE NOT resolved;

CREATE TABLE IF NOT EXISTS sync_subscriptions (
    character_id UUID NOT NULL,
    campaign_id  UUID NOT NULL,
    fields       JSONB NOT NULL,
    direction    VARCHAR(16) NOT NULL,
    PRIMARY KEY (character_id, campaign_id)
);

CREATE INDEX IF NOT EXISTS idx_sync_subscriptions_character
    ON sync_subscriptions (character_id);

CREATE TABLE IF NOT EXISTS character_states (
    character_id UUID PRIMARY KEY,
    state        JSONB NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sync_base_snapshots (
    character_id     UUID NOT NULL,
    campaign_id      UUID NOT NULL,
    campaign_version BIGINT NOT NULL,
    state            JSONB NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (character_id, campaign_id, campaign_version)
);
";
