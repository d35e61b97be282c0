//! The decoded-event model.
//!
//! Every on-chain log the decoder understands becomes a [`DecodedEvent`]
//! whose parameters are normalized into [`EventValue`]s. The normalization
//! rules are storage-oriented: addresses are EIP-55 checksummed strings,
//! integers of any width are decimal strings, byte values are lowercase hex
//! without a prefix. Serialized to JSON this is lossless and canonical,
//! which is what the generic events table stores in its JSONB column.

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

// ─── EventValue ───────────────────────────────────────────────────────────────

/// A single decoded parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum EventValue {
    /// 20-byte EVM address, hex with `0x` prefix, EIP-55 checksummed.
    Address(String),
    /// Unsigned integer of any width, decimal string.
    Uint(String),
    /// Signed integer of any width, decimal string.
    Int(String),
    /// Byte value, lowercase hex without prefix.
    Bytes(String),
    Bool(bool),
    String(String),
    /// Array or tuple parameter, element-wise normalized.
    Array(Vec<EventValue>),
}

impl EventValue {
    /// Returns the inner string if this is an `Address` value.
    pub fn as_address(&self) -> Option<&str> {
        match self {
            EventValue::Address(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the decimal string if this is a `Uint` value.
    pub fn as_uint(&self) -> Option<&str> {
        match self {
            EventValue::Uint(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EventValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Address(s) | EventValue::Uint(s) | EventValue::Int(s) => write!(f, "{s}"),
            EventValue::Bytes(s) => write!(f, "0x{s}"),
            EventValue::Bool(b) => write!(f, "{b}"),
            EventValue::String(s) => write!(f, "{s}"),
            EventValue::Array(vals) => {
                let parts: Vec<_> = vals.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// ─── DecodedEvent ─────────────────────────────────────────────────────────────

/// A fully decoded event — the unit that flows through handlers, the generic
/// events table, and the broadcaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Configuration key of the emitting contract (lowercase).
    pub contract_name: String,
    /// ABI event name (case-sensitive).
    pub event_name: String,
    /// `"<contract_name>:<EventName>"` — handler registry key.
    pub event_id: String,
    /// The event signature hash (`topics[0]`).
    pub signature: B256,
    /// Parameter name → normalized value. Every indexed parameter is present;
    /// non-indexed parameters are present iff the log's data field decoded.
    pub data: BTreeMap<String, EventValue>,
}

impl DecodedEvent {
    /// Builds the canonical `"<contract>:<Event>"` identifier.
    pub fn make_id(contract_name: &str, event_name: &str) -> String {
        format!("{contract_name}:{event_name}")
    }

    /// Get a parameter value by name.
    pub fn field(&self, name: &str) -> Option<&EventValue> {
        self.data.get(name)
    }
}
