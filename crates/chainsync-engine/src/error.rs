//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("chain ID mismatch: configured {configured}, node reports {reported}")]
    ChainIdMismatch { configured: u64, reported: u64 },

    #[error("contract {name}: invalid address {address}")]
    InvalidContractAddress { name: String, address: String },

    #[error("contract {name}: reading ABI {path}: {source}")]
    AbiFile {
        name: String,
        path: String,
        source: std::io::Error,
    },

    #[error("RPC: {0}")]
    Rpc(#[from] chainsync_rpc::RpcError),

    #[error("decode: {0}")]
    Decode(#[from] chainsync_decoder::DecodeError),

    #[error("store: {0}")]
    Store(#[from] chainsync_store::StoreError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("handler {event_id}: {source}")]
    Handler {
        event_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("block {0} not found")]
    BlockNotFound(u64),
}
