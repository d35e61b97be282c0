//! Row models, insert shapes, and query structs.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

// ─── Generic events table ─────────────────────────────────────────────────────

/// DDL for the generic `events` table. One row per decoded event, written
/// unconditionally. `(tx_hash, log_index)` is globally unique per event
/// kind; a violation means the same range was re-processed.
pub const EVENTS_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS events (
        id               BIGSERIAL PRIMARY KEY,
        block_number     BIGINT       NOT NULL,
        tx_hash          VARCHAR(66)  NOT NULL,
        tx_index         INTEGER      NOT NULL,
        log_index        INTEGER      NOT NULL,
        timestamp        TIMESTAMPTZ  NOT NULL,
        contract_name    VARCHAR(100) NOT NULL,
        contract_address VARCHAR(42)  NOT NULL,
        event_name       VARCHAR(100) NOT NULL,
        event_signature  VARCHAR(66)  NOT NULL,
        data             JSONB        NOT NULL,
        created_at       TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
        UNIQUE (tx_hash, log_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_events_block_number ON events(block_number)",
    "CREATE INDEX IF NOT EXISTS idx_events_tx_hash ON events(tx_hash)",
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_events_contract_event
     ON events(contract_name, event_name, block_number)",
];

/// DDL for the informational `sync_status` table.
pub const SYNC_STATUS_DDL: &[&str] = &["CREATE TABLE IF NOT EXISTS sync_status (
        contract          VARCHAR(100) PRIMARY KEY,
        last_block_number BIGINT       NOT NULL,
        last_block_hash   VARCHAR(66)  NOT NULL DEFAULT '',
        updated_at        TIMESTAMPTZ  NOT NULL DEFAULT NOW()
    )"];

/// DDL for the example typed `transfers` table (ERC-20 Transfer).
/// `value` is NUMERIC(78) — uint256 max is 78 decimal digits.
pub const TRANSFERS_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS transfers (
        id           BIGSERIAL PRIMARY KEY,
        block_number BIGINT      NOT NULL,
        tx_hash      VARCHAR(66) NOT NULL,
        tx_index     INTEGER     NOT NULL,
        log_index    INTEGER     NOT NULL,
        timestamp    TIMESTAMPTZ NOT NULL,
        from_address VARCHAR(42) NOT NULL,
        to_address   VARCHAR(42) NOT NULL,
        value        NUMERIC(78) NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (tx_hash, log_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_transfers_block_number ON transfers(block_number)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers(from_address)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers(to_address)",
];

/// A persisted generic event row.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub block_number: i64,
    pub tx_hash: String,
    pub tx_index: i32,
    pub log_index: i32,
    pub timestamp: DateTime<Utc>,
    pub contract_name: String,
    pub contract_address: String,
    pub event_name: String,
    pub event_signature: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for the generic events table.
#[derive(Debug, Clone)]
pub struct NewEventRow {
    pub block_number: u64,
    pub tx_hash: String,
    pub tx_index: u32,
    pub log_index: u32,
    pub timestamp: DateTime<Utc>,
    pub contract_name: String,
    pub contract_address: String,
    pub event_name: String,
    pub event_signature: String,
    pub data: serde_json::Value,
}

// ─── Typed example: transfers ─────────────────────────────────────────────────

/// A persisted ERC-20 transfer row.
#[derive(Debug, Clone, FromRow)]
pub struct TransferRow {
    pub id: i64,
    pub block_number: i64,
    pub tx_hash: String,
    pub tx_index: i32,
    pub log_index: i32,
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,
    /// uint256 as decimal string.
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for the transfers table.
#[derive(Debug, Clone)]
pub struct NewTransferRow {
    pub block_number: u64,
    pub tx_hash: String,
    pub tx_index: u32,
    pub log_index: u32,
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
}

// ─── Sync status ──────────────────────────────────────────────────────────────

/// Informational per-contract sync position. The engine's real cursor is
/// always recomputed from `MAX(block_number)`; this table exists for
/// operator visibility only.
#[derive(Debug, Clone, FromRow)]
pub struct SyncStatusRow {
    pub contract: String,
    pub last_block_number: i64,
    pub last_block_hash: String,
    pub updated_at: DateTime<Utc>,
}

// ─── Query structs ────────────────────────────────────────────────────────────

/// Filters for the generic events table.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub contract_name: Option<String>,
    pub event_name: Option<String>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    /// `"block_number"` | `"timestamp"` | `"id"`; anything else falls back
    /// to `id`.
    pub order_by: Option<String>,
    pub descending: bool,
    pub limit: Option<u32>,
    /// Keyset pagination: only rows with `id > after_id`.
    pub after_id: Option<i64>,
}

/// Filters for the transfers table.
#[derive(Debug, Clone, Default)]
pub struct TransferQuery {
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub order_by: Option<String>,
    pub descending: bool,
    pub limit: Option<u32>,
    pub after_id: Option<i64>,
}
