//! chainsync-observability — logging setup and metric handles.
//!
//! The engine only *emits* metrics; exporting them (Prometheus endpoint,
//! OTLP pipeline) is wired up by the host process.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::SyncMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
