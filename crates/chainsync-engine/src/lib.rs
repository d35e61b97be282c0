//! chainsync-engine — the orchestrator.
//!
//! ```text
//! Engine::run ── tick every poll_interval ──┐
//!   head = client.block_number()            │
//!   fetch logs (adaptive batch)             │
//!   per block, ascending:                   │
//!     BEGIN                                 │
//!       decode → handler → generic row      │
//!     COMMIT → last_block = n → broadcast   │
//!   sleep ◄──────────────────────────────────┘
//! ```
//!
//! `last_block` is never persisted on its own; it is always recoverable
//! from `MAX(block_number)` across the event tables, which is what makes
//! resumption checkpoint-free.

pub mod broadcast;
pub mod engine;
pub mod error;
pub mod handler;

pub use broadcast::{Broadcaster, Subscription};
pub use engine::Engine;
pub use error::EngineError;
pub use handler::{Handler, HandlerContext, HandlerRegistry};
