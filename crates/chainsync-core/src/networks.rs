//! Network presets for the supported Linea networks.

use std::time::Duration;

/// Network-specific default values, applied when the config does not
/// override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPreset {
    /// Network chain ID.
    pub chain_id: u64,
    /// Block polling interval.
    pub poll_interval: Duration,
    /// Default public RPC endpoint.
    pub default_rpc: &'static str,
    /// Expected block time.
    pub block_time: Duration,
    /// Chain ID of the L1 the network settles to.
    pub l1_chain_id: u64,
}

/// Names of all supported networks, in the order they appear in the
/// "unknown network" error message.
pub const SUPPORTED_NETWORKS: [&str; 2] = ["linea-mainnet", "linea-sepolia"];

/// Returns the preset for a network name, or `None` for unknown networks.
pub fn preset(network: &str) -> Option<NetworkPreset> {
    match network {
        "linea-mainnet" => Some(NetworkPreset {
            chain_id: 59144,
            poll_interval: Duration::from_secs(2),
            default_rpc: "https://rpc.linea.build",
            block_time: Duration::from_secs(2),
            l1_chain_id: 1, // Ethereum mainnet
        }),
        "linea-sepolia" => Some(NetworkPreset {
            chain_id: 59141,
            poll_interval: Duration::from_secs(2),
            default_rpc: "https://rpc.sepolia.linea.build",
            block_time: Duration::from_secs(2),
            l1_chain_id: 11155111, // Sepolia
        }),
        _ => None,
    }
}
