//! Transport-level error types and provider error classification.

use thiserror::Error;

use crate::wire::JsonRpcError;

/// Errors that can occur during an RPC operation.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, DNS, TLS, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Circuit breaker rejected the request without contacting the remote.
    #[error("circuit breaker open for provider: {provider}")]
    CircuitOpen { provider: String },

    /// The node rejected the requested `eth_getLogs` block range. Never
    /// retried at this layer; the engine bisects and re-requests.
    #[error("block range too large: {0}")]
    RangeTooLarge(String),

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RpcError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. } | Self::Rpc(_))
    }

    pub fn is_range_too_large(&self) -> bool {
        matches!(self, Self::RangeTooLarge(_))
    }
}

/// Substrings (lowercase) that identify a provider's "block range too
/// large" rejection. Providers do not agree on an error code, so the
/// message text is the only reliable signal.
const RANGE_TOO_LARGE_TOKENS: [&str; 10] = [
    "query returned more than",
    "block range too large",
    "exceed maximum block range",
    "too many results",
    "range too wide",
    "block range is too wide",
    "query timeout",
    "response too large",
    "max results",
    "limit exceeded",
];

/// Returns `true` if the error message identifies a range-too-large
/// rejection. Case-insensitive substring match.
pub fn is_range_too_large_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RANGE_TOO_LARGE_TOKENS.iter().any(|t| lower.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_classification_positive() {
        let cases = [
            "query returned more than 10000 results",
            "block range too large",
            "exceed maximum block range: 10000",
            "Error: too many results",
            "Error: range too wide for query",
            "block range is too wide",
            "query timeout exceeded",
            "response too large",
            "max results limit reached",
            "rate limit exceeded",
            "BLOCK RANGE TOO LARGE",
            "Error: Query Returned More Than 5000 results",
            "eth_getLogs failed: block range too large",
            r#"{"code":-32005,"message":"query returned more than 10000 results"}"#,
        ];
        for msg in cases {
            assert!(is_range_too_large_message(msg), "should match: {msg}");
        }
    }

    #[test]
    fn range_classification_negative() {
        let cases = [
            "",
            "connection refused",
            "block not found",
            "invalid params",
            "context canceled",
            "range error",
            "too bad",
            "large response",
            // Alchemy's wording does not match the current token set
            "Log response size exceeded. You can make eth_getLogs requests with up to a 2K block range",
        ];
        for msg in cases {
            assert!(!is_range_too_large_message(msg), "should not match: {msg}");
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(RpcError::Http("connection refused".into()).is_retryable());
        assert!(RpcError::Timeout { ms: 30_000 }.is_retryable());
        assert!(RpcError::Rpc(JsonRpcError {
            code: -32000,
            message: "header not found".into(),
            data: None,
        })
        .is_retryable());
        assert!(!RpcError::RangeTooLarge("too many results".into()).is_retryable());
        assert!(!RpcError::CircuitOpen { provider: "x".into() }.is_retryable());
    }
}
