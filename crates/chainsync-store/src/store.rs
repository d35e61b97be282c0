//! The Postgres store.
//!
//! Wraps an sqlx connection pool. Insert helpers are associated functions
//! taking a `&mut PgConnection` so they compose inside the engine's
//! per-block transaction; an sqlx transaction that is dropped without
//! commit rolls back, which covers both returned errors and panics.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions, Postgres};
use sqlx::{PgPool, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{
    EventQuery, EventRow, NewEventRow, NewTransferRow, SyncStatusRow, TransferQuery, TransferRow,
    EVENTS_DDL, SYNC_STATUS_DDL,
};

// ─── Config ───────────────────────────────────────────────────────────────────

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub dsn: String,
    /// Maximum open connections (default: 25).
    pub max_open_conns: u32,
    /// Idle connections kept warm (default: 5).
    pub max_idle_conns: u32,
    /// Maximum connection lifetime (default: 5 minutes).
    pub conn_max_lifetime: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            max_open_conns: 25,
            max_idle_conns: 5,
            conn_max_lifetime: Duration::from_secs(300),
        }
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// Postgres-backed event store. Thread-safe and cheaply cloneable — wraps
/// a connection pool.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to PostgreSQL with the configured pool limits.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns)
            .max_lifetime(config.conn_max_lifetime)
            .connect(&config.dsn)
            .await?;
        info!(
            max_open = config.max_open_conns,
            max_idle = config.max_idle_conns,
            "store connected"
        );
        Ok(Self { pool })
    }

    /// Create the built-in tables plus any handler-supplied statements.
    /// Statements run in order; the first failure aborts.
    pub async fn migrate(&self, extra: &[String]) -> Result<(), StoreError> {
        let builtin = EVENTS_DDL.iter().chain(SYNC_STATUS_DDL.iter()).map(|s| s.to_string());
        for stmt in builtin.chain(extra.iter().cloned()) {
            sqlx::query(&stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Migration(format!("{e}\nSQL: {stmt}")))?;
        }
        debug!("store schema migrated");
        Ok(())
    }

    /// Begin a transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    /// The largest `block_number` in `table`, 0 if the table is empty.
    ///
    /// Table names come from the engine's own model registry, never user
    /// input; the identifier check is a guard against misuse.
    pub async fn max_block_number(&self, table: &str) -> Result<u64, StoreError> {
        if table.is_empty()
            || !table.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(StoreError::InvalidTableName(table.to_string()));
        }
        let row =
            sqlx::query(&format!("SELECT COALESCE(MAX(block_number), 0) AS max FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
        let max: i64 = row.get("max");
        Ok(max as u64)
    }

    /// Insert one generic event row. A `(tx_hash, log_index)` duplicate is
    /// an error, not an upsert — re-processing a committed range must fail
    /// loudly.
    pub async fn insert_event(conn: &mut PgConnection, row: &NewEventRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events
                (block_number, tx_hash, tx_index, log_index, timestamp,
                 contract_name, contract_address, event_name, event_signature, data)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(row.block_number as i64)
        .bind(&row.tx_hash)
        .bind(row.tx_index as i32)
        .bind(row.log_index as i32)
        .bind(row.timestamp)
        .bind(&row.contract_name)
        .bind(&row.contract_address)
        .bind(&row.event_name)
        .bind(&row.event_signature)
        .bind(&row.data)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Insert one transfer row (the example typed table).
    pub async fn insert_transfer(
        conn: &mut PgConnection,
        row: &NewTransferRow,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO transfers
                (block_number, tx_hash, tx_index, log_index, timestamp,
                 from_address, to_address, value)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8::numeric)",
        )
        .bind(row.block_number as i64)
        .bind(&row.tx_hash)
        .bind(row.tx_index as i32)
        .bind(row.log_index as i32)
        .bind(row.timestamp)
        .bind(&row.from_address)
        .bind(&row.to_address)
        .bind(&row.value)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Upsert the informational sync position for a contract.
    pub async fn upsert_sync_status(
        conn: &mut PgConnection,
        contract: &str,
        block_number: u64,
        block_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_status (contract, last_block_number, last_block_hash, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (contract)
             DO UPDATE SET
                last_block_number = EXCLUDED.last_block_number,
                last_block_hash   = EXCLUDED.last_block_hash,
                updated_at        = NOW()",
        )
        .bind(contract)
        .bind(block_number as i64)
        .bind(block_hash)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Insert generic event rows in chunks of `batch_size`, all within one
    /// transaction.
    pub async fn create_in_batches(
        &self,
        rows: &[NewEventRow],
        batch_size: usize,
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch_size = batch_size.max(1);
        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(batch_size) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO events
                    (block_number, tx_hash, tx_index, log_index, timestamp,
                     contract_name, contract_address, event_name, event_signature, data) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.block_number as i64)
                    .push_bind(&row.tx_hash)
                    .push_bind(row.tx_index as i32)
                    .push_bind(row.log_index as i32)
                    .push_bind(row.timestamp)
                    .push_bind(&row.contract_name)
                    .push_bind(&row.contract_address)
                    .push_bind(&row.event_name)
                    .push_bind(&row.event_signature)
                    .push_bind(&row.data);
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ─── Query surface (consumed by the external API layer) ───────────────────

    /// Query generic events. Returns matching rows and the unlimited total.
    pub async fn query_events(
        &self,
        query: &EventQuery,
    ) -> Result<(Vec<EventRow>, i64), StoreError> {
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM events");
        push_event_filters(&mut count_qb, query);
        let total: i64 = count_qb.build().fetch_one(&self.pool).await?.get(0);

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM events");
        push_event_filters(&mut qb, query);
        push_order_and_limit(
            &mut qb,
            query.order_by.as_deref(),
            query.descending,
            query.limit,
        );
        let rows = qb.build_query_as::<EventRow>().fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    /// Look up a generic event by primary key.
    pub async fn event_by_id(&self, id: i64) -> Result<Option<EventRow>, StoreError> {
        Ok(sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Query transfers. Returns matching rows and the unlimited total.
    pub async fn query_transfers(
        &self,
        query: &TransferQuery,
    ) -> Result<(Vec<TransferRow>, i64), StoreError> {
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM transfers");
        push_transfer_filters(&mut count_qb, query);
        let total: i64 = count_qb.build().fetch_one(&self.pool).await?.get(0);

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(TRANSFER_COLUMNS);
        push_transfer_filters(&mut qb, query);
        push_order_and_limit(
            &mut qb,
            query.order_by.as_deref(),
            query.descending,
            query.limit,
        );
        let rows = qb.build_query_as::<TransferRow>().fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    /// Look up a transfer by primary key.
    pub async fn transfer_by_id(&self, id: i64) -> Result<Option<TransferRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, TransferRow>(&format!("{TRANSFER_COLUMNS} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// All transfers emitted by a transaction, ordered by log index.
    pub async fn transfers_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Vec<TransferRow>, StoreError> {
        Ok(sqlx::query_as::<_, TransferRow>(&format!(
            "{TRANSFER_COLUMNS} WHERE tx_hash = $1 ORDER BY log_index ASC"
        ))
        .bind(tx_hash)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Current informational sync positions.
    pub async fn sync_status(&self) -> Result<Vec<SyncStatusRow>, StoreError> {
        Ok(sqlx::query_as::<_, SyncStatusRow>(
            "SELECT * FROM sync_status ORDER BY contract ASC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// The underlying pool, for callers with bespoke queries.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// NUMERIC has no direct Rust mapping without a decimal crate; the decimal
// string representation is what handlers wrote, so read it back as text.
const TRANSFER_COLUMNS: &str = "SELECT id, block_number, tx_hash, tx_index, log_index, \
     timestamp, from_address, to_address, value::text AS value, created_at FROM transfers";

fn push_event_filters(qb: &mut QueryBuilder<Postgres>, q: &EventQuery) {
    let mut sep = WhereSep::new();
    if let Some(contract) = &q.contract_name {
        sep.push(qb);
        qb.push("contract_name = ").push_bind(contract.clone());
    }
    if let Some(event) = &q.event_name {
        sep.push(qb);
        qb.push("event_name = ").push_bind(event.clone());
    }
    push_common_filters(qb, &mut sep, q.from_block, q.to_block, q.from_time, q.to_time, q.after_id);
}

fn push_transfer_filters(qb: &mut QueryBuilder<Postgres>, q: &TransferQuery) {
    let mut sep = WhereSep::new();
    if let Some(from) = &q.from_address {
        sep.push(qb);
        qb.push("from_address = ").push_bind(from.clone());
    }
    if let Some(to) = &q.to_address {
        sep.push(qb);
        qb.push("to_address = ").push_bind(to.clone());
    }
    push_common_filters(qb, &mut sep, q.from_block, q.to_block, q.from_time, q.to_time, q.after_id);
}

#[allow(clippy::too_many_arguments)]
fn push_common_filters(
    qb: &mut QueryBuilder<Postgres>,
    sep: &mut WhereSep,
    from_block: Option<u64>,
    to_block: Option<u64>,
    from_time: Option<DateTime<Utc>>,
    to_time: Option<DateTime<Utc>>,
    after_id: Option<i64>,
) {
    if let Some(from) = from_block {
        sep.push(qb);
        qb.push("block_number >= ").push_bind(from as i64);
    }
    if let Some(to) = to_block {
        sep.push(qb);
        qb.push("block_number <= ").push_bind(to as i64);
    }
    if let Some(from) = from_time {
        sep.push(qb);
        qb.push("timestamp >= ").push_bind(from);
    }
    if let Some(to) = to_time {
        sep.push(qb);
        qb.push("timestamp <= ").push_bind(to);
    }
    if let Some(after) = after_id {
        sep.push(qb);
        qb.push("id > ").push_bind(after);
    }
}

fn push_order_and_limit(
    qb: &mut QueryBuilder<Postgres>,
    order_by: Option<&str>,
    descending: bool,
    limit: Option<u32>,
) {
    // Whitelisted columns only; identifiers cannot be bound.
    let column = match order_by {
        Some("block_number") => "block_number",
        Some("timestamp") => "timestamp",
        _ => "id",
    };
    let dir = if descending { "DESC" } else { "ASC" };
    qb.push(format!(" ORDER BY {column} {dir}, log_index {dir}"));
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }
}

struct WhereSep {
    first: bool,
}

impl WhereSep {
    fn new() -> Self {
        Self { first: true }
    }

    fn push(&mut self, qb: &mut QueryBuilder<Postgres>) {
        if self.first {
            qb.push(" WHERE ");
            self.first = false;
        } else {
            qb.push(" AND ");
        }
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running PostgreSQL instance.
    // Example: DATABASE_URL=postgresql://localhost/chainsync_test cargo test -- --ignored

    use super::*;
    use chrono::Utc;

    fn test_config() -> StoreConfig {
        StoreConfig {
            dsn: std::env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set for integration tests"),
            ..Default::default()
        }
    }

    fn event_row(block: u64, tx_hash: &str, log_index: u32) -> NewEventRow {
        NewEventRow {
            block_number: block,
            tx_hash: tx_hash.to_string(),
            tx_index: 0,
            log_index,
            timestamp: Utc::now(),
            contract_name: "usdc".into(),
            contract_address: "0x176211869cA2b568f2A7D4EE941E073a821EE1ff".into(),
            event_name: "Transfer".into(),
            event_signature:
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".into(),
            data: serde_json::json!({"value": {"type": "uint", "value": "100"}}),
        }
    }

    #[test]
    fn default_config_pool_limits() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.max_open_conns, 25);
        assert_eq!(cfg.max_idle_conns, 5);
        assert_eq!(cfg.conn_max_lifetime, Duration::from_secs(300));
        assert!(cfg.dsn.is_empty());
    }

    #[tokio::test]
    async fn max_block_number_rejects_bad_identifiers() {
        // No DB required: validation happens before any query.
        let cfg = StoreConfig { dsn: "postgres://localhost/unused".into(), ..Default::default() };
        // connect_lazy so no server is needed
        let pool = PgPoolOptions::new().connect_lazy(&cfg.dsn).unwrap();
        let store = Store { pool };
        assert!(matches!(
            store.max_block_number("events; DROP TABLE events").await,
            Err(StoreError::InvalidTableName(_))
        ));
        assert!(matches!(
            store.max_block_number("").await,
            Err(StoreError::InvalidTableName(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn migrate_and_max_block_number() {
        let store = Store::connect(&test_config()).await.unwrap();
        store.migrate(&[]).await.unwrap();

        // Empty table returns 0
        sqlx::query("TRUNCATE events").execute(store.pool()).await.unwrap();
        assert_eq!(store.max_block_number("events").await.unwrap(), 0);

        let mut tx = store.begin().await.unwrap();
        Store::insert_event(&mut tx, &event_row(100, "0x1", 0)).await.unwrap();
        Store::insert_event(&mut tx, &event_row(500, "0x2", 0)).await.unwrap();
        Store::insert_event(&mut tx, &event_row(300, "0x3", 0)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.max_block_number("events").await.unwrap(), 500);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn transaction_rollback_discards_writes() {
        let store = Store::connect(&test_config()).await.unwrap();
        store.migrate(&[]).await.unwrap();
        sqlx::query("TRUNCATE events").execute(store.pool()).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            Store::insert_event(&mut tx, &event_row(1000, "0xrollback", 0)).await.unwrap();
            // dropped without commit
        }

        let (_, total) = store.query_events(&EventQuery::default()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn duplicate_tx_hash_log_index_fails() {
        let store = Store::connect(&test_config()).await.unwrap();
        store.migrate(&[]).await.unwrap();
        sqlx::query("TRUNCATE events").execute(store.pool()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        Store::insert_event(&mut tx, &event_row(1000, "0xdup", 3)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = Store::insert_event(&mut tx, &event_row(1000, "0xdup", 3)).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn create_in_batches_inserts_all() {
        let store = Store::connect(&test_config()).await.unwrap();
        store.migrate(&[]).await.unwrap();
        sqlx::query("TRUNCATE events").execute(store.pool()).await.unwrap();

        let rows: Vec<_> = (0..100).map(|i| event_row(1000 + i, &format!("0x{i}"), 0)).collect();
        store.create_in_batches(&rows, 25).await.unwrap();

        let (_, total) = store.query_events(&EventQuery::default()).await.unwrap();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn query_events_filters_and_pagination() {
        let store = Store::connect(&test_config()).await.unwrap();
        store.migrate(&[]).await.unwrap();
        sqlx::query("TRUNCATE events").execute(store.pool()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        for i in 0..10u64 {
            let mut row = event_row(100 + i, &format!("0x{i}"), 0);
            if i >= 5 {
                row.event_name = "Approval".into();
            }
            Store::insert_event(&mut tx, &row).await.unwrap();
        }
        tx.commit().await.unwrap();

        // Filter by event name
        let q = EventQuery { event_name: Some("Transfer".into()), ..Default::default() };
        let (rows, total) = store.query_events(&q).await.unwrap();
        assert_eq!(total, 5);
        assert!(rows.iter().all(|r| r.event_name == "Transfer"));

        // Block range
        let q = EventQuery { from_block: Some(103), to_block: Some(107), ..Default::default() };
        let (rows, total) = store.query_events(&q).await.unwrap();
        assert_eq!(total, 5);
        assert!(rows.iter().all(|r| (103..=107).contains(&(r.block_number as u64))));

        // Limit does not change the total; keyset pagination advances
        let q = EventQuery { limit: Some(3), ..Default::default() };
        let (rows, total) = store.query_events(&q).await.unwrap();
        assert_eq!(total, 10);
        assert_eq!(rows.len(), 3);

        let after = rows.last().unwrap().id;
        let q = EventQuery { limit: Some(3), after_id: Some(after), ..Default::default() };
        let (next, _) = store.query_events(&q).await.unwrap();
        assert!(next.iter().all(|r| r.id > after));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn transfers_roundtrip_ordered_by_log_index() {
        let store = Store::connect(&test_config()).await.unwrap();
        store
            .migrate(&crate::models::TRANSFERS_DDL.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        sqlx::query("TRUNCATE transfers").execute(store.pool()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        for i in 0..3u32 {
            Store::insert_transfer(
                &mut tx,
                &NewTransferRow {
                    block_number: 1000,
                    tx_hash: "0xbatch".into(),
                    tx_index: 0,
                    log_index: 2 - i, // inserted out of order
                    timestamp: Utc::now(),
                    from_address: "0xa".into(),
                    to_address: "0xb".into(),
                    value: "1000000000000000000".into(),
                },
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let rows = store.transfers_by_tx_hash("0xbatch").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].log_index, 0);
        assert_eq!(rows[2].log_index, 2);
        assert_eq!(rows[0].value, "1000000000000000000");
    }
}
