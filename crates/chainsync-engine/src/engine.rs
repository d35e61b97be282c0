//! The sync engine: cursor advancement, adaptive log fetching, per-block
//! transactional dispatch, and live broadcast.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use chainsync_core::config::Config;
use chainsync_core::event::DecodedEvent;
use chainsync_core::types::Log;
use chainsync_decoder::Decoder;
use chainsync_observability::SyncMetrics;
use chainsync_rpc::client::{ChainClient, ClientConfig, EthClient};
use chainsync_rpc::policy::BreakerState;
use chainsync_rpc::RetryConfig;
use chainsync_store::{NewEventRow, Store, StoreConfig, StoreError};

use crate::broadcast::Broadcaster;
use crate::error::EngineError;
use crate::handler::{HandlerContext, HandlerRegistry};

/// Below this adaptive batch size a range-too-large error propagates
/// instead of halving further — the provider is rejecting ranges no
/// reasonable batch would satisfy.
const BATCH_FLOOR: u64 = 10;

/// Successful ticks required before a reduced batch grows back a step.
const GROW_AFTER_TICKS: u32 = 2;

/// The sync engine. Generic over the chain client so tests can script
/// chain behavior.
pub struct Engine<C: ChainClient = EthClient> {
    cfg: Config,
    client: C,
    store: Store,
    decoder: Decoder,
    handlers: Arc<HandlerRegistry>,
    broadcaster: Broadcaster,
    metrics: SyncMetrics,
    /// Highest block committed to the store. Never persisted on its own —
    /// always recoverable from `MAX(block_number)`.
    last_block: u64,
    /// Current adaptive batch size, `1..=cfg.sync.batch_size`.
    batch_size: u64,
    success_streak: u32,
}

impl<C: ChainClient> std::fmt::Debug for Engine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("last_block", &self.last_block)
            .field("batch_size", &self.batch_size)
            .field("success_streak", &self.success_streak)
            .finish_non_exhaustive()
    }
}

impl Engine<EthClient> {
    /// Build an engine from configuration: RPC client, chain-ID check,
    /// store + migrations, decoder registration, cursor resumption.
    pub async fn new(
        cfg: Config,
        handlers: Arc<HandlerRegistry>,
        broadcaster: Broadcaster,
    ) -> Result<Self, EngineError> {
        let client = EthClient::new(ClientConfig {
            url: cfg.rpc_url.clone(),
            retry: RetryConfig {
                max_retries: cfg.sync.max_retries,
                initial_backoff: cfg.sync.retry_delay,
                ..RetryConfig::default()
            },
            ..ClientConfig::default()
        })?;
        let store = Store::connect(&StoreConfig {
            dsn: cfg.database.clone(),
            ..StoreConfig::default()
        })
        .await?;
        Self::from_parts(cfg, client, store, handlers, broadcaster).await
    }
}

impl<C: ChainClient> Engine<C> {
    /// Build an engine from already-constructed collaborators. Fails fast
    /// on chain-ID mismatch, migration failure, or ABI problems.
    pub async fn from_parts(
        cfg: Config,
        client: C,
        store: Store,
        handlers: Arc<HandlerRegistry>,
        broadcaster: Broadcaster,
    ) -> Result<Self, EngineError> {
        let reported = client.chain_id().await?;
        if reported != cfg.chain_id {
            return Err(EngineError::ChainIdMismatch {
                configured: cfg.chain_id,
                reported,
            });
        }

        store.migrate(&handlers.migrations()).await?;

        let decoder = Decoder::new();
        register_contracts(&decoder, &cfg)?;

        let last_block = resolve_last_block(&store, &handlers, &cfg).await?;
        info!(
            name = %cfg.name,
            chain_id = cfg.chain_id,
            last_block,
            contracts = cfg.contracts.len(),
            handlers = handlers.list().len(),
            "engine initialised"
        );

        let batch_size = cfg.sync.batch_size.max(1);
        Ok(Self {
            cfg,
            client,
            store,
            decoder,
            handlers,
            broadcaster,
            metrics: SyncMetrics::new(&opentelemetry::global::meter("chainsync")),
            last_block,
            batch_size,
            success_streak: 0,
        })
    }

    /// Highest committed block.
    pub fn last_block(&self) -> u64 {
        self.last_block
    }

    /// Current adaptive batch size.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run the sync loop until `shutdown` flips to true. Errors within a
    /// tick are logged and the range retried next tick; only shutdown ends
    /// the loop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        info!(poll_interval_ms = self.cfg.poll_interval.as_millis() as u64, "sync loop starting");
        loop {
            if *shutdown.borrow() {
                break;
            }

            // A panicking handler must not take the engine down: the
            // in-flight transaction rolls back when the future unwinds,
            // and the range is retried next tick.
            match std::panic::AssertUnwindSafe(self.sync_once()).catch_unwind().await {
                Ok(Ok(())) => self.grow_batch(),
                Ok(Err(e)) => {
                    self.success_streak = 0;
                    error!(last_block = self.last_block, error = %e, "sync tick failed");
                }
                Err(panic) => {
                    self.success_streak = 0;
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    error!(last_block = self.last_block, panic = %msg, "sync tick panicked");
                }
            }
            self.metrics.set_breaker_state(breaker_gauge(self.client.breaker_state()));

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Shutdown sender dropped; nobody can signal us.
                        break;
                    }
                }
            }
        }
        info!(last_block = self.last_block, "sync loop stopped");
        Ok(())
    }

    /// One tick: poll head, fetch a batch of logs, process block by block.
    pub async fn sync_once(&mut self) -> Result<(), EngineError> {
        let head = self.client.block_number().await?;
        self.metrics.set_sync_lag(sync_lag(head, self.last_block));

        let Some((from, _)) = batch_range(self.last_block, head, self.batch_size) else {
            // Already synced (or the provider's head briefly went
            // backwards) — nothing to do until head advances.
            return Ok(());
        };

        let addresses = self.decoder.addresses();
        let topics = self.decoder.event_signatures();
        let (to, logs) = fetch_logs_adaptive(
            &self.client,
            from,
            head,
            &mut self.batch_size,
            &mut self.success_streak,
            &addresses,
            &topics,
        )
        .await?;

        debug!(from, to, logs = logs.len(), "fetched log batch");

        for (number, block_logs) in group_by_block(logs) {
            self.process_block(number, &block_logs).await?;
        }

        // The whole fetched range is now indexed, including trailing
        // blocks that emitted nothing.
        self.last_block = to;
        self.metrics.set_sync_lag(sync_lag(head, self.last_block));
        Ok(())
    }

    /// Process one block: fetch its header, then decode, dispatch, and
    /// persist every log inside a single transaction. The cursor advances
    /// only after commit; any error rolls the whole block back.
    async fn process_block(&mut self, number: u64, logs: &[Log]) -> Result<(), EngineError> {
        let block = self
            .client
            .block_by_number(number)
            .await?
            .ok_or(EngineError::BlockNotFound(number))?;
        let timestamp = DateTime::<Utc>::from_timestamp(block.timestamp, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let mut tx = self.store.begin().await?;
        let mut staged: Vec<DecodedEvent> = Vec::new();

        for log in logs {
            let event = match self.decoder.decode(log) {
                Ok(event) => event,
                Err(e) if e.is_unknown_signature() => {
                    // The address filter can be broader than the event
                    // set; logs we were never asked to decode pass by.
                    trace!(block = number, log_index = log.log_index, "skipping unknown signature");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            {
                let mut ctx = HandlerContext {
                    tx: &mut tx,
                    block: &block,
                    log,
                    event: &event,
                };
                self.handlers.dispatch(&mut ctx).await?;
            }

            Store::insert_event(&mut tx, &event_row(log, &event, timestamp)?).await?;
            staged.push(event);
        }

        let mut contracts: Vec<&str> = staged.iter().map(|e| e.contract_name.as_str()).collect();
        contracts.sort();
        contracts.dedup();
        for contract in contracts {
            Store::upsert_sync_status(&mut tx, contract, number, &block.hash).await?;
        }

        tx.commit().await?;

        self.last_block = number;
        for event in &staged {
            self.metrics.record_event(&event.contract_name, &event.event_name);
            self.broadcaster.publish(event);
        }
        self.metrics.record_block(number);
        debug!(block = number, events = staged.len(), "block committed");
        Ok(())
    }

    /// After a halving, grow the batch back a doubling at a time once
    /// enough consecutive ticks succeed.
    fn grow_batch(&mut self) {
        let configured = self.cfg.sync.batch_size.max(1);
        if self.batch_size >= configured {
            self.success_streak = 0;
            return;
        }
        self.success_streak += 1;
        if self.success_streak >= GROW_AFTER_TICKS {
            self.batch_size = (self.batch_size * 2).min(configured);
            self.success_streak = 0;
            debug!(batch = self.batch_size, "batch size restored a step");
        }
    }

    /// Re-read ABI files and swap in a freshly registered decoder. The
    /// swap is atomic: a failed reload leaves the old registrations
    /// untouched.
    pub fn reload(&mut self) -> Result<(), EngineError> {
        let fresh = Decoder::new();
        register_contracts(&fresh, &self.cfg)?;
        self.decoder = fresh;
        info!("decoder reloaded from configuration");
        Ok(())
    }

    /// Close the store pool.
    pub async fn close(self) {
        self.store.close().await;
    }
}

fn register_contracts(decoder: &Decoder, cfg: &Config) -> Result<(), EngineError> {
    for (name, contract) in &cfg.contracts {
        let address: Address =
            contract.address.parse().map_err(|_| EngineError::InvalidContractAddress {
                name: name.clone(),
                address: contract.address.clone(),
            })?;
        let abi_json =
            std::fs::read_to_string(&contract.abi).map_err(|source| EngineError::AbiFile {
                name: name.clone(),
                path: contract.abi.clone(),
                source,
            })?;
        decoder.register(name, address, &abi_json, Some(contract.events.as_slice()))?;
    }
    Ok(())
}

/// `MAX(block_number)` across the generic table and every handler-declared
/// typed table; falls back to the configured start block when all are
/// empty.
async fn resolve_last_block(
    store: &Store,
    handlers: &HandlerRegistry,
    cfg: &Config,
) -> Result<u64, EngineError> {
    let mut max_indexed = store.max_block_number("events").await?;
    for table in handlers.tables() {
        max_indexed = max_indexed.max(store.max_block_number(&table).await?);
    }
    Ok(resolve_start_block(max_indexed, cfg.min_start_block()))
}

/// Indexed data wins over configuration; a fresh store starts at the
/// configured block.
pub(crate) fn resolve_start_block(max_indexed: u64, configured_start: u64) -> u64 {
    if max_indexed > 0 {
        max_indexed
    } else {
        configured_start
    }
}

/// The next `[from, to]` range to fetch, or `None` when already synced.
pub(crate) fn batch_range(last_block: u64, head: u64, batch_size: u64) -> Option<(u64, u64)> {
    if last_block >= head {
        return None;
    }
    let from = last_block + 1;
    let to = (from + batch_size.saturating_sub(1)).min(head);
    Some((from, to))
}

/// Head minus cursor, clamped at zero.
pub(crate) fn sync_lag(head: u64, last_block: u64) -> u64 {
    head.saturating_sub(last_block)
}

fn breaker_gauge(state: BreakerState) -> u64 {
    match state {
        BreakerState::Closed => 0,
        BreakerState::Open => 1,
        BreakerState::HalfOpen => 2,
    }
}

/// Group logs by block, preserving `(tx_index, log_index)` order within
/// each block. The map iterates in ascending block order.
pub(crate) fn group_by_block(logs: Vec<Log>) -> BTreeMap<u64, Vec<Log>> {
    let mut blocks: BTreeMap<u64, Vec<Log>> = BTreeMap::new();
    for log in logs {
        blocks.entry(log.block_number).or_default().push(log);
    }
    for block_logs in blocks.values_mut() {
        block_logs.sort_by_key(|l| (l.tx_index, l.log_index));
    }
    blocks
}

/// Fetch `[from, …]` with the current batch size, halving on
/// range-too-large until the provider accepts the span. Halving below
/// [`BATCH_FLOOR`] propagates the error instead.
pub(crate) async fn fetch_logs_adaptive<C: ChainClient>(
    client: &C,
    from: u64,
    head: u64,
    batch_size: &mut u64,
    success_streak: &mut u32,
    addresses: &[Address],
    topics: &[B256],
) -> Result<(u64, Vec<Log>), EngineError> {
    loop {
        let to = (from + batch_size.saturating_sub(1)).min(head);
        match client.filter_logs(from, to, addresses, topics).await {
            Ok(logs) => return Ok((to, logs)),
            Err(e) if e.is_range_too_large() => {
                let halved = (*batch_size / 2).max(1);
                if halved < BATCH_FLOOR {
                    return Err(e.into());
                }
                warn!(from, to, batch = halved, "range too large, halving batch");
                *batch_size = halved;
                *success_streak = 0;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn event_row(
    log: &Log,
    event: &DecodedEvent,
    timestamp: DateTime<Utc>,
) -> Result<NewEventRow, EngineError> {
    Ok(NewEventRow {
        block_number: log.block_number,
        tx_hash: log.tx_hash.to_string(),
        tx_index: log.tx_index,
        log_index: log.log_index,
        timestamp,
        contract_name: event.contract_name.clone(),
        contract_address: log.address.to_checksum(None),
        event_name: event.event_name.clone(),
        event_signature: event.signature.to_string(),
        data: serde_json::to_value(&event.data).map_err(StoreError::Serialization)?,
    })
}
