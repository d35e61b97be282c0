//! chainsync metric definitions.
//!
//! OpenTelemetry conventions; exportable via OTLP to Prometheus, Grafana,
//! or Datadog by the host process.

use opentelemetry::{
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};

/// Central metrics handle for the sync engine.
#[derive(Clone)]
pub struct SyncMetrics {
    pub blocks_indexed: Counter<u64>,
    pub events_processed: Counter<u64>,
    pub sync_lag: Gauge<u64>,
    pub current_block: Gauge<u64>,
    pub breaker_state: Gauge<u64>,
}

impl SyncMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            blocks_indexed: meter
                .u64_counter("chainsync.blocks_indexed")
                .with_description("Blocks committed to the store")
                .build(),
            events_processed: meter
                .u64_counter("chainsync.events_processed")
                .with_description("Decoded events dispatched and persisted")
                .build(),
            sync_lag: meter
                .u64_gauge("chainsync.sync_lag")
                .with_description("Chain head minus last indexed block")
                .build(),
            current_block: meter
                .u64_gauge("chainsync.current_block")
                .with_description("Last committed block number")
                .build(),
            breaker_state: meter
                .u64_gauge("chainsync.breaker_state")
                .with_description("RPC circuit breaker state (0 closed, 1 open, 2 half-open)")
                .build(),
        }
    }

    pub fn record_block(&self, number: u64) {
        self.blocks_indexed.add(1, &[]);
        self.current_block.record(number, &[]);
    }

    pub fn record_event(&self, contract: &str, event: &str) {
        self.events_processed.add(
            1,
            &[
                KeyValue::new("contract", contract.to_string()),
                KeyValue::new("event", event.to_string()),
            ],
        );
    }

    pub fn set_sync_lag(&self, lag: u64) {
        self.sync_lag.record(lag, &[]);
    }

    pub fn set_breaker_state(&self, state: u64) {
        self.breaker_state.record(state, &[]);
    }
}
