//! chainsync-store — Postgres persistence.
//!
//! One generic `events` table receives a row for every decoded event;
//! typed tables (the shipped example is `transfers`) are materialized by
//! user handlers inside the same per-block transaction. The store also
//! answers the `MAX(block_number)` queries the engine uses to resume.

pub mod error;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use models::{
    EventQuery, EventRow, NewEventRow, NewTransferRow, SyncStatusRow, TransferQuery, TransferRow,
};
pub use store::{Store, StoreConfig};
