//! Prometheus exposition of the pipeline counters.

use super::status::PipelineCounters;
#[cfg(feature = "metrics")]
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use warp::{Filter, Reply};

#[derive(Error, Debug)]
pub enum MetricsError {
    #[cfg(feature = "metrics")]
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics encoding error: {0}")]
    Encoding(String),
}

#[derive(Clone)]
pub struct MetricsExporter {
    counters: Arc<PipelineCounters>,
    #[cfg(feature = "metrics")]
    registry: Registry,
    #[cfg(feature = "metrics")]
    gauges: IntGaugeVec,
}

impl MetricsExporter {
    #[cfg(feature = "metrics")]
    pub fn new(counters: Arc<PipelineCounters>) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let gauges = IntGaugeVec::new(
            Opts::new("clicktail_pipeline_total", "Pipeline counters since start"),
            &["counter"],
        )?;
        registry.register(Box::new(gauges.clone()))?;
        Ok(Self {
            counters,
            registry,
            gauges,
        })
    }

    #[cfg(not(feature = "metrics"))]
    pub fn new(counters: Arc<PipelineCounters>) -> Result<Self, MetricsError> {
        Ok(Self { counters })
    }

    /// Current counters in Prometheus text format.
    #[cfg(feature = "metrics")]
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        for (name, value) in self.counters.snapshot().entries() {
            self.gauges
                .with_label_values(&[name])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    #[cfg(not(feature = "metrics"))]
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        Ok(self
            .counters
            .snapshot()
            .entries()
            .into_iter()
            .map(|(name, value)| format!("{name} {value}\n"))
            .collect())
    }

    /// Serve `/metrics` and `/health` on `port` until `cancel` fires.
    #[cfg(feature = "metrics")]
    pub async fn serve(self, port: u16, cancel: CancellationToken) {
        let exporter = Arc::new(self);

        let metrics = warp::path!("metrics").and(warp::get()).map(move || {
            match exporter.export_metrics() {
                Ok(text) => {
                    warp::reply::with_header(text, "content-type", "text/plain; version=0.0.4")
                        .into_response()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to export metrics");
                    warp::reply::with_status(
                        "Internal Server Error",
                        warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response()
                }
            }
        });
        let health = warp::path!("health").and(warp::get()).map(|| "OK");

        let bound = warp::serve(metrics.or(health))
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
                cancel.cancelled().await;
            });
        match bound {
            Ok((addr, server)) => {
                tracing::info!(%addr, "Serving Prometheus metrics");
                server.await;
            }
            Err(e) => tracing::warn!(port, error = %e, "Could not bind metrics server"),
        }
    }

    #[cfg(not(feature = "metrics"))]
    pub async fn serve(self, port: u16, _cancel: CancellationToken) {
        tracing::warn!(port, "Metrics feature is disabled; not serving /metrics");
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_counters() {
        let counters = PipelineCounters::new();
        PipelineCounters::add(&counters.events_sent, 42);
        let exporter = MetricsExporter::new(counters).unwrap();

        let text = exporter.export_metrics().unwrap();
        assert!(text.contains(r#"clicktail_pipeline_total{counter="events_sent"} 42"#));
        assert!(text.contains(r#"counter="parse_errors""#));
    }
}
