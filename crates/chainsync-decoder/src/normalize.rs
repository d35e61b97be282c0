//! Converts alloy-core `DynSolValue`s into storage-oriented [`EventValue`]s.
//!
//! Normalization rules:
//! - `address` → EIP-55 checksummed hex string
//! - `uintN` / `intN` (any width) → decimal string
//! - `bytesN` / `bytes` → lowercase hex, no prefix
//! - `bool` / `string` → passthrough
//! - arrays and tuples → element-wise, as `EventValue::Array`

use alloy_core::dyn_abi::DynSolValue;

use chainsync_core::event::EventValue;

/// Convert a decoded `DynSolValue` into an `EventValue`.
pub fn normalize(val: DynSolValue) -> EventValue {
    match val {
        DynSolValue::Bool(b) => EventValue::Bool(b),
        DynSolValue::Uint(u, _bits) => EventValue::Uint(u.to_string()),
        DynSolValue::Int(i, _bits) => EventValue::Int(i.to_string()),
        DynSolValue::Address(a) => EventValue::Address(a.to_checksum(None)),
        DynSolValue::FixedBytes(word, size) => EventValue::Bytes(hex::encode(&word[..size])),
        DynSolValue::Bytes(b) => EventValue::Bytes(hex::encode(b)),
        DynSolValue::String(s) => EventValue::String(s),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            EventValue::Array(vals.into_iter().map(normalize).collect())
        }
        DynSolValue::Tuple(fields) => {
            EventValue::Array(fields.into_iter().map(normalize).collect())
        }
        DynSolValue::CustomStruct { tuple, .. } => {
            EventValue::Array(tuple.into_iter().map(normalize).collect())
        }
        DynSolValue::Function(f) => EventValue::Bytes(hex::encode(f.as_slice())),
    }
}
