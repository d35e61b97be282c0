//! Event signature hashing.
//!
//! `topics[0]` of a log is the keccak256 of the event's canonical
//! signature, e.g.
//! `keccak256("Transfer(address,address,uint256)")`
//! `→ 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef`.

use alloy_primitives::B256;
use tiny_keccak::{Hasher, Keccak};

/// Compute the keccak256 hash of a canonical event signature string.
pub fn keccak_signature(signature: &str) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    B256::from(output)
}
