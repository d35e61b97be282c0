//! Decoder error types.

use alloy_primitives::B256;
use thiserror::Error;

/// Errors from ABI registration and log decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("parsing ABI: {0}")]
    AbiParse(String),

    /// The log has no topics at all — not a valid event log.
    #[error("no topics")]
    NoTopics,

    /// `topics[0]` matches no registered event. The engine skips these
    /// silently; the address filter may be broader than the event set.
    #[error("unknown event signature: {0}")]
    UnknownSignature(B256),

    #[error("missing topic for indexed parameter '{0}'")]
    MissingTopic(String),

    #[error("unsupported parameter type '{ty}' for '{param}'")]
    UnsupportedType { param: String, ty: String },

    #[error("decoding event data: {0}")]
    Data(String),
}

impl DecodeError {
    /// Returns `true` if this is the skippable unknown-signature case.
    pub fn is_unknown_signature(&self) -> bool {
        matches!(self, Self::UnknownSignature(_))
    }
}
