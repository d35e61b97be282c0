//! The event decoder: ABI registration and log decoding.
//!
//! Routing is by event signature: `topics[0]` resolves directly to the
//! registered contract+event identity. When two contracts register the
//! same signature (shared ABIs), the last registration wins — the
//! documented limitation for shared ABIs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use alloy_core::dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::{Event, JsonAbi};
use alloy_primitives::{Address, B256, I256, U256};

use chainsync_core::event::{DecodedEvent, EventValue};
use chainsync_core::types::Log;

use crate::error::DecodeError;
use crate::normalize::normalize;

struct EventEntry {
    contract_name: String,
    event_id: String,
    event: Event,
}

#[derive(Default)]
struct DecoderInner {
    abis: HashMap<Address, JsonAbi>,
    /// `topic0` → registered event. Last writer wins on a shared
    /// signature.
    events: HashMap<B256, Arc<EventEntry>>,
}

/// Maps logs to contract+event identities and decodes their payloads.
///
/// Mutated only during registration and reload, which take the write lock
/// and update the maps atomically; decoding takes read locks.
#[derive(Default)]
pub struct Decoder {
    inner: RwLock<DecoderInner>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract's events.
    ///
    /// `event_names == None` registers every event in the ABI. A named
    /// subset silently skips names absent from the ABI — tracking a subset
    /// of a standard ABI is the common case, not an error.
    pub fn register(
        &self,
        contract_name: &str,
        address: Address,
        abi_json: &str,
        event_names: Option<&[String]>,
    ) -> Result<(), DecodeError> {
        let abi: JsonAbi =
            serde_json::from_str(abi_json).map_err(|e| DecodeError::AbiParse(e.to_string()))?;

        let mut inner = self.inner.write().unwrap();
        for event in abi.events() {
            if let Some(names) = event_names {
                if !names.iter().any(|n| n == &event.name) {
                    continue;
                }
            }
            let signature = event.selector();
            let entry = Arc::new(EventEntry {
                contract_name: contract_name.to_string(),
                event_id: DecodedEvent::make_id(contract_name, &event.name),
                event: event.clone(),
            });
            inner.events.insert(signature, entry);
        }
        inner.abis.insert(address, abi);
        Ok(())
    }

    /// Decode a log into a [`DecodedEvent`].
    pub fn decode(&self, log: &Log) -> Result<DecodedEvent, DecodeError> {
        let signature = log.signature().ok_or(DecodeError::NoTopics)?;

        let inner = self.inner.read().unwrap();
        let entry = inner
            .events
            .get(&signature)
            .ok_or(DecodeError::UnknownSignature(signature))?;

        let mut data = BTreeMap::new();

        // Indexed parameters live in topics[1..], positionally.
        let mut topic_idx = 1usize;
        for param in entry.event.inputs.iter().filter(|p| p.indexed) {
            let topic = log
                .topics
                .get(topic_idx)
                .copied()
                .ok_or_else(|| DecodeError::MissingTopic(param_name(param, topic_idx - 1)))?;
            let ty = param.resolve().map_err(|e| DecodeError::UnsupportedType {
                param: param_name(param, topic_idx - 1),
                ty: e.to_string(),
            })?;
            data.insert(param_name(param, topic_idx - 1), decode_topic(topic, &ty));
            topic_idx += 1;
        }

        // Non-indexed parameters are ABI-encoded in the data field. An
        // empty data field leaves them absent — some emitters elide it.
        if !log.data.is_empty() {
            let data_params: Vec<_> =
                entry.event.inputs.iter().filter(|p| !p.indexed).collect();
            if !data_params.is_empty() {
                let types = data_params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        p.resolve().map_err(|e| DecodeError::UnsupportedType {
                            param: param_name(p, i),
                            ty: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let tuple = DynSolType::Tuple(types);
                let decoded = tuple
                    .abi_decode_params(&log.data)
                    .map_err(|e| DecodeError::Data(e.to_string()))?;
                let values = match decoded {
                    alloy_core::dyn_abi::DynSolValue::Tuple(vals) => vals,
                    other => vec![other],
                };
                for ((i, param), value) in data_params.iter().enumerate().zip(values) {
                    data.insert(param_name(param, i), normalize(value));
                }
            }
        }

        Ok(DecodedEvent {
            contract_name: entry.contract_name.clone(),
            event_name: entry.event.name.clone(),
            event_id: entry.event_id.clone(),
            signature,
            data,
        })
    }

    /// Returns `true` if `decode` would resolve this log to a registered
    /// event.
    pub fn can_decode(&self, log: &Log) -> bool {
        self.event_id(log).is_some()
    }

    /// The `"<contract>:<Event>"` identifier a log would decode to.
    pub fn event_id(&self, log: &Log) -> Option<String> {
        let signature = log.signature()?;
        let inner = self.inner.read().unwrap();
        inner.events.get(&signature).map(|e| e.event_id.clone())
    }

    /// All registered contract addresses, for the engine's log filter.
    pub fn addresses(&self) -> Vec<Address> {
        let inner = self.inner.read().unwrap();
        let mut addrs: Vec<_> = inner.abis.keys().copied().collect();
        addrs.sort();
        addrs
    }

    /// All registered event signatures, for the engine's topic filter.
    pub fn event_signatures(&self) -> Vec<B256> {
        let inner = self.inner.read().unwrap();
        let mut sigs: Vec<_> = inner.events.keys().copied().collect();
        sigs.sort();
        sigs
    }

    /// Drop all registrations. Used by config reload before re-registering.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.abis.clear();
        inner.events.clear();
    }
}

fn param_name(param: &alloy_json_abi::EventParam, position: usize) -> String {
    if param.name.is_empty() {
        format!("arg{position}")
    } else {
        param.name.clone()
    }
}

/// Decode a single indexed topic (always 32 bytes).
///
/// Value types are padded into the word and recoverable. Reference types
/// (`string`, `bytes`, arrays, tuples) are stored as the keccak256 of
/// their encoding — the original value is unrecoverable, so the hash
/// itself is surfaced.
fn decode_topic(topic: B256, ty: &DynSolType) -> EventValue {
    match ty {
        DynSolType::Address => {
            EventValue::Address(Address::from_word(topic).to_checksum(None))
        }
        DynSolType::Uint(_) => EventValue::Uint(U256::from_be_bytes(topic.0).to_string()),
        DynSolType::Int(_) => {
            EventValue::Int(I256::from_raw(U256::from_be_bytes(topic.0)).to_string())
        }
        DynSolType::Bool => EventValue::Bool(topic != B256::ZERO),
        DynSolType::FixedBytes(size) => EventValue::Bytes(hex::encode(&topic[..*size])),
        DynSolType::Function => EventValue::Bytes(hex::encode(&topic[..24])),
        // Dynamic types: the topic holds only a hash of the value.
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_)
        | DynSolType::CustomStruct { .. } => EventValue::Bytes(hex::encode(topic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    const ERC20_ABI: &str = r#"[
      {
        "anonymous": false,
        "inputs": [
          {"indexed": true, "name": "from", "type": "address"},
          {"indexed": true, "name": "to", "type": "address"},
          {"indexed": false, "name": "value", "type": "uint256"}
        ],
        "name": "Transfer",
        "type": "event"
      },
      {
        "anonymous": false,
        "inputs": [
          {"indexed": true, "name": "owner", "type": "address"},
          {"indexed": true, "name": "spender", "type": "address"},
          {"indexed": false, "name": "value", "type": "uint256"}
        ],
        "name": "Approval",
        "type": "event"
      }
    ]"#;

    const TRANSFER_SIG: B256 =
        b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
    const CONTRACT: Address = address!("176211869cA2b568f2A7D4EE941E073a821EE1ff");
    const FROM: Address = address!("1111111111111111111111111111111111111111");
    const TO: Address = address!("2222222222222222222222222222222222222222");

    fn transfer_log(data: Vec<u8>) -> Log {
        Log {
            address: CONTRACT,
            topics: vec![TRANSFER_SIG, FROM.into_word(), TO.into_word()],
            data,
            block_number: 1000,
            block_hash: B256::ZERO,
            tx_hash: B256::ZERO,
            tx_index: 0,
            log_index: 0,
        }
    }

    fn value_word(v: u64) -> Vec<u8> {
        U256::from(v).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn register_all_events() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, None).unwrap();
        assert_eq!(d.event_signatures().len(), 2);
        assert_eq!(d.addresses(), vec![CONTRACT]);
    }

    #[test]
    fn register_event_subset() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, Some(&["Transfer".into()])).unwrap();
        assert_eq!(d.event_signatures(), vec![TRANSFER_SIG]);
    }

    #[test]
    fn register_invalid_abi() {
        let d = Decoder::new();
        let err = d.register("bad", CONTRACT, "not valid json", None).unwrap_err();
        assert!(err.to_string().contains("parsing ABI"));
    }

    #[test]
    fn register_empty_abi() {
        let d = Decoder::new();
        d.register("empty", CONTRACT, "[]", None).unwrap();
        assert!(d.event_signatures().is_empty());
        assert_eq!(d.addresses().len(), 1);
    }

    #[test]
    fn register_nonexistent_event_is_silent() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, Some(&["NonExistent".into()])).unwrap();
        assert!(d.event_signatures().is_empty());
        assert_eq!(d.addresses().len(), 1);
    }

    #[test]
    fn decode_transfer() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, Some(&["Transfer".into()])).unwrap();

        let event = d.decode(&transfer_log(value_word(1_000_000))).unwrap();
        assert_eq!(event.contract_name, "usdc");
        assert_eq!(event.event_name, "Transfer");
        assert_eq!(event.event_id, "usdc:Transfer");
        assert_eq!(event.signature, TRANSFER_SIG);
        assert_eq!(
            event.field("from").unwrap().as_address().unwrap(),
            FROM.to_checksum(None)
        );
        assert_eq!(
            event.field("to").unwrap().as_address().unwrap(),
            TO.to_checksum(None)
        );
        assert_eq!(event.field("value").unwrap().as_uint().unwrap(), "1000000");
    }

    #[test]
    fn decode_no_topics() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, None).unwrap();
        let log = Log { topics: vec![], ..transfer_log(vec![]) };
        let err = d.decode(&log).unwrap_err();
        assert!(err.to_string().contains("no topics"));
    }

    #[test]
    fn decode_unknown_signature() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, None).unwrap();
        let unknown = b256!("1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef");
        let log = Log { topics: vec![unknown], ..transfer_log(vec![]) };
        let err = d.decode(&log).unwrap_err();
        assert!(err.is_unknown_signature());
        assert!(err.to_string().contains("unknown event signature"));
    }

    #[test]
    fn decode_empty_data_leaves_params_absent() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, Some(&["Transfer".into()])).unwrap();
        let event = d.decode(&transfer_log(vec![])).unwrap();
        assert!(event.field("from").is_some());
        assert!(event.field("to").is_some());
        assert!(event.field("value").is_none());
    }

    #[test]
    fn can_decode_and_event_id() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, Some(&["Transfer".into()])).unwrap();

        let log = transfer_log(vec![]);
        assert!(d.can_decode(&log));
        assert_eq!(d.event_id(&log).unwrap(), "usdc:Transfer");

        let unknown = b256!("0000000000000000000000000000000000000000000000000000000000001234");
        let log = Log { topics: vec![unknown], ..log };
        assert!(!d.can_decode(&log));
        assert!(d.event_id(&log).is_none());

        let log = Log { topics: vec![], ..log };
        assert!(!d.can_decode(&log));
    }

    #[test]
    fn clear_drops_registrations() {
        let d = Decoder::new();
        d.register("usdc", CONTRACT, ERC20_ABI, None).unwrap();
        assert!(!d.event_signatures().is_empty());
        d.clear();
        assert!(d.event_signatures().is_empty());
        assert!(d.addresses().is_empty());
    }

    #[test]
    fn shared_signature_last_registration_wins() {
        let d = Decoder::new();
        let dai = address!("3333333333333333333333333333333333333333");
        d.register("usdc", CONTRACT, ERC20_ABI, Some(&["Transfer".into()])).unwrap();
        d.register("dai", dai, ERC20_ABI, Some(&["Transfer".into(), "Approval".into()]))
            .unwrap();

        assert_eq!(d.addresses().len(), 2);
        // Transfer + Approval; the shared Transfer signature appears once
        assert_eq!(d.event_signatures().len(), 2);

        // Both contracts emit the same topic0; the later registration owns
        // the signature regardless of emitting address. Documented
        // limitation for shared ABIs.
        let usdc_log = transfer_log(value_word(1));
        assert_eq!(d.decode(&usdc_log).unwrap().event_id, "dai:Transfer");
        assert_eq!(d.event_id(&usdc_log).unwrap(), "dai:Transfer");

        let dai_log = Log { address: dai, ..transfer_log(value_word(1)) };
        assert_eq!(d.decode(&dai_log).unwrap().event_id, "dai:Transfer");
    }

    #[test]
    fn decode_bool_indexed_param() {
        const BOOL_ABI: &str = r#"[{
            "anonymous": false,
            "inputs": [
                {"indexed": true, "name": "success", "type": "bool"},
                {"indexed": false, "name": "data", "type": "bytes"}
            ],
            "name": "Result",
            "type": "event"
        }]"#;

        let d = Decoder::new();
        d.register("test", CONTRACT, BOOL_ABI, None).unwrap();
        let sig = d.event_signatures()[0];

        let mut truthy = B256::ZERO;
        truthy.0[31] = 1;
        let log = Log {
            address: CONTRACT,
            topics: vec![sig, truthy],
            data: vec![],
            block_number: 1,
            block_hash: B256::ZERO,
            tx_hash: B256::ZERO,
            tx_index: 0,
            log_index: 0,
        };
        let event = d.decode(&log).unwrap();
        assert_eq!(event.field("success").unwrap().as_bool(), Some(true));

        let log = Log { topics: vec![sig, B256::ZERO], ..log };
        let event = d.decode(&log).unwrap();
        assert_eq!(event.field("success").unwrap().as_bool(), Some(false));
    }

    #[test]
    fn decode_dynamic_indexed_param_surfaces_hash() {
        const NAMED_ABI: &str = r#"[{
            "anonymous": false,
            "inputs": [
                {"indexed": true, "name": "label", "type": "string"}
            ],
            "name": "Named",
            "type": "event"
        }]"#;

        let d = Decoder::new();
        d.register("registry", CONTRACT, NAMED_ABI, None).unwrap();
        let sig = d.event_signatures()[0];
        let label_hash = keccak_hash(b"alice");

        let log = Log {
            address: CONTRACT,
            topics: vec![sig, label_hash],
            data: vec![],
            block_number: 1,
            block_hash: B256::ZERO,
            tx_hash: B256::ZERO,
            tx_index: 0,
            log_index: 0,
        };
        let event = d.decode(&log).unwrap();
        assert_eq!(
            event.field("label").unwrap(),
            &EventValue::Bytes(hex::encode(label_hash))
        );
    }

    fn keccak_hash(data: &[u8]) -> B256 {
        use tiny_keccak::{Hasher, Keccak};
        let mut hasher = Keccak::v256();
        let mut out = [0u8; 32];
        hasher.update(data);
        hasher.finalize(&mut out);
        B256::from(out)
    }
}
