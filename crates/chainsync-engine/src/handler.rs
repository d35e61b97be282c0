//! Handler trait + registry.
//!
//! Handlers materialize typed tables from decoded events. They run inside
//! the engine's per-block transaction: a handler error rolls back every
//! write for that block, including the generic event rows.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::postgres::PgConnection;

use chainsync_core::event::DecodedEvent;
use chainsync_core::types::{BlockInfo, Log};

use crate::error::EngineError;

/// Context passed to a handler for one decoded event.
pub struct HandlerContext<'a> {
    /// Transaction-scoped connection. Writes commit with the block or not
    /// at all.
    pub tx: &'a mut PgConnection,
    /// The block being processed.
    pub block: &'a BlockInfo,
    /// The raw log.
    pub log: &'a Log,
    /// The decoded event.
    pub event: &'a DecodedEvent,
}

/// A user-supplied event handler.
///
/// The engine guarantees at most one commit per block range, but a handler
/// that fails will see the same events again when its block is retried.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process one decoded event inside the block's transaction.
    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), anyhow::Error>;

    /// The typed table this handler materializes, if any. Consulted at
    /// startup for `MAX(block_number)` resumption.
    fn table(&self) -> Option<&str> {
        None
    }

    /// DDL statements the store should run at startup.
    fn migrations(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Concurrent mapping from `"<contract>:<Event>"` to a handler.
///
/// Registration typically happens once at startup, but the lock makes
/// late registration and hot-reload safe.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event ID. A later registration for the
    /// same ID overwrites the earlier one.
    pub fn register(&self, event_id: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.write().unwrap().insert(event_id.into(), handler);
    }

    /// Look up a handler by event ID.
    pub fn get(&self, event_id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().unwrap().get(event_id).cloned()
    }

    pub fn has(&self, event_id: &str) -> bool {
        self.handlers.read().unwrap().contains_key(event_id)
    }

    /// Registered event IDs, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.handlers.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Typed tables declared by registered handlers, deduplicated.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .handlers
            .read()
            .unwrap()
            .values()
            .filter_map(|h| h.table().map(str::to_string))
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// Migration statements from all registered handlers.
    pub fn migrations(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap()
            .values()
            .flat_map(|h| h.migrations())
            .collect()
    }

    /// Dispatch one event. An unregistered event ID returns Ok — indexing
    /// without a typed handler is intentional and must not block the
    /// pipeline. A handler error is wrapped with the event ID and fails
    /// the enclosing transaction.
    pub async fn dispatch(&self, ctx: &mut HandlerContext<'_>) -> Result<(), EngineError> {
        let handler = match self.get(&ctx.event.event_id) {
            Some(h) => h,
            None => return Ok(()),
        };
        handler.handle(ctx).await.map_err(|source| EngineError::Handler {
            event_id: ctx.event.event_id.clone(),
            source,
        })
    }
}
