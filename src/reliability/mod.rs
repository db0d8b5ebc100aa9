//! Delivery resilience and observability: per-worker backoff, pipeline
//! counters, the status reporter and the optional Prometheus exporter.

pub mod backoff;
pub mod metrics;
pub mod status;

pub use backoff::{BackoffConfig, BackoffState};
pub use metrics::{MetricsError, MetricsExporter};
pub use status::{PipelineCounters, StatusReporter, StatusSnapshot};
