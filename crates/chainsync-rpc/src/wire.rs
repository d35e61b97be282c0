//! JSON-RPC 2.0 wire types.

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainsync_core::types::{BlockInfo, Log};

/// A JSON-RPC 2.0 request. The client is the only producer, so ids are
/// plain numbers.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &'static str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Unwrap the result value or return the node's error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── eth_* response shapes ────────────────────────────────────────────────────

/// A raw log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: U64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub transaction_index: U64,
    pub log_index: U64,
    #[serde(default)]
    pub removed: bool,
}

impl From<RawLog> for Log {
    fn from(raw: RawLog) -> Self {
        Log {
            address: raw.address,
            topics: raw.topics,
            data: raw.data.to_vec(),
            block_number: raw.block_number.to::<u64>(),
            block_hash: raw.block_hash,
            tx_hash: raw.transaction_hash,
            tx_index: raw.transaction_index.to::<u64>() as u32,
            log_index: raw.log_index.to::<u64>() as u32,
        }
    }
}

/// A block header as returned by `eth_getBlockByNumber`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub number: U64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: U64,
}

impl From<RawBlock> for BlockInfo {
    fn from(raw: RawBlock) -> Self {
        BlockInfo {
            number: raw.number.to::<u64>(),
            hash: raw.hash.to_string(),
            parent_hash: raw.parent_hash.to_string(),
            timestamp: raw.timestamp.to::<u64>() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(1, "eth_blockNumber", vec![]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"eth_blockNumber\""));
        assert!(json.contains("\"id\":1"));
    }

    #[test]
    fn response_into_result_error() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"query returned more than 10000 results"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32005);
    }

    #[test]
    fn raw_log_deserializes_from_rpc_shape() {
        let raw: RawLog = serde_json::from_str(
            r#"{
                "address": "0x176211869ca2b568f2a7d4ee941e073a821ee1ff",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
                "data": "0x00000000000000000000000000000000000000000000000000000000000f4240",
                "blockNumber": "0x12a05f2",
                "blockHash": "0x000000000000000000000000000000000000000000000000000000000000beef",
                "transactionHash": "0x000000000000000000000000000000000000000000000000000000000000cafe",
                "transactionIndex": "0x3",
                "logIndex": "0x7"
            }"#,
        )
        .unwrap();
        let log: Log = raw.into();
        assert_eq!(log.block_number, 19_531_250);
        assert_eq!(log.tx_index, 3);
        assert_eq!(log.log_index, 7);
        assert_eq!(log.data.len(), 32);
    }

    #[test]
    fn raw_block_deserializes_from_rpc_shape() {
        let raw: RawBlock = serde_json::from_str(
            r#"{
                "number": "0x64",
                "hash": "0x000000000000000000000000000000000000000000000000000000000000aaaa",
                "parentHash": "0x0000000000000000000000000000000000000000000000000000000000009999",
                "timestamp": "0x6553f100"
            }"#,
        )
        .unwrap();
        let block: BlockInfo = raw.into();
        assert_eq!(block.number, 100);
        assert_eq!(block.timestamp, 0x6553f100);
        assert!(block.hash.starts_with("0x"));
    }
}
