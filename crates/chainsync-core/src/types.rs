//! Chain-facing types shared across the indexing pipeline.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

// ─── Log ──────────────────────────────────────────────────────────────────────

/// An emitted event record as returned by `eth_getLogs`, with quantities
/// already parsed out of their hex wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract address that emitted the log.
    pub address: Address,
    /// `topics[0]` is the event signature hash; the rest are indexed params.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed parameters.
    pub data: Vec<u8>,
    /// Block number the log was included in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: B256,
    /// Transaction hash.
    pub tx_hash: B256,
    /// Position of the transaction within the block.
    pub tx_index: u32,
    /// Position of the log within the block.
    pub log_index: u32,
}

impl Log {
    /// `topics[0]`, the event signature hash, if present.
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

// ─── BlockInfo ────────────────────────────────────────────────────────────────

/// Minimal per-block metadata the engine consumes — number, hashes, timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}
