//! chainsync-core — shared types and configuration for the chainsync indexer.
//!
//! # Architecture
//!
//! ```text
//! Config (+ network presets)
//!     └── Engine
//!           ├── ChainClient   (chainsync-rpc)
//!           ├── Decoder       (chainsync-decoder)  → DecodedEvent
//!           ├── Store         (chainsync-store)
//!           ├── HandlerRegistry / Broadcaster (chainsync-engine)
//!           └── SyncMetrics   (chainsync-observability)
//! ```

pub mod config;
pub mod event;
pub mod networks;
pub mod types;

pub use config::{Config, ConfigError, ContractConfig, ServerConfig, SyncConfig};
pub use event::{DecodedEvent, EventValue};
pub use networks::NetworkPreset;
pub use types::{BlockInfo, Log};
