//! chainsync-rpc — the chain-facing transport.
//!
//! Wraps raw JSON-RPC with a per-call timeout, a three-state circuit
//! breaker, exponential-backoff retry, and range-too-large detection for
//! `eth_getLogs`. The sync engine talks to the [`ChainClient`] trait;
//! [`EthClient`] is the HTTP implementation.

pub mod client;
pub mod error;
pub mod policy;
pub mod wire;

pub use client::{ChainClient, ClientConfig, EthClient};
pub use error::RpcError;
pub use policy::{BreakerConfig, BreakerState, CircuitBreaker, RetryConfig, RetryPolicy};
