//! Starts a run: verifies the backend, spawns every stage and supervises
//! them until the inputs are drained or the run is cancelled.

use super::config::Config;
use super::context::RunContext;
use super::pipeline::SourceLineage;
use crate::buffer::Batcher;
use crate::collector::{self, tail_source};
use crate::domain::{PipelineError, SourceId};
use crate::reliability::{MetricsExporter, PipelineCounters, StatusReporter, StatusSnapshot};
use crate::sender::{BatchTransmitter, ClickHouseClient, DeliveryPool};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Handle to a running pipeline.
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    counters: Arc<PipelineCounters>,
    supervisor: JoinHandle<Result<StatusSnapshot, PipelineError>>,
}

impl RunHandle {
    /// Ask every stage to stop at its next suspension point. Events already
    /// read still drain to a delivery or a drop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Wait for the run to finish; returns the final counters.
    pub async fn wait(self) -> Result<StatusSnapshot, PipelineError> {
        self.supervisor.await?
    }
}

/// Start the pipeline for a validated configuration.
///
/// Fails before anything is spawned if the configuration cannot be turned
/// into a run, an input is missing, or ClickHouse does not answer its ping.
pub async fn start(config: Config) -> Result<RunHandle, PipelineError> {
    let ctx = RunContext::from_config(&config)?;
    let sources =
        collector::resolve_sources(&config.files).map_err(|e| PipelineError::Input(e.to_string()))?;

    let client = ClickHouseClient::new(config.client_config(ctx.user_agent.clone()))
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    client
        .verify()
        .await
        .map_err(|e| PipelineError::Backend(format!("{}: {e}", config.api_host)))?;

    info!(
        parser = ctx.parser.name(),
        dataset = config.dataset_name(),
        sources = sources.len(),
        sample_lines = ctx.samples_lines(),
        user_agent = %ctx.user_agent,
        "Starting pipeline"
    );

    let cancel = CancellationToken::new();
    let counters = Arc::clone(&ctx.counters);
    let queue_capacity = config.queue_capacity;

    let (event_tx, event_rx) = mpsc::channel(queue_capacity);
    let (batch_tx, batch_rx) = mpsc::channel(config.poolsize);

    let mut producers = Vec::with_capacity(sources.len() * 2);
    for (index, source) in sources.into_iter().enumerate() {
        let lineage = SourceLineage::new(&ctx, source.clone(), index as u64, event_tx.clone())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let (line_tx, line_rx) = mpsc::channel(queue_capacity);

        producers.push(tokio::spawn(run_source(
            source,
            config.tail_config(),
            line_tx,
            Arc::clone(&counters),
            cancel.clone(),
        )));
        producers.push(tokio::spawn(async move {
            lineage.run(line_rx).await;
        }));
    }
    drop(event_tx);

    let batcher = tokio::spawn(Batcher::new(config.batch_config(), event_rx, batch_tx).run());

    let transmitter = Arc::new(BatchTransmitter::new(client));
    let pool = DeliveryPool::new(config.pool_config(), transmitter, Arc::clone(&counters));
    let delivery = tokio::spawn(pool.run(batch_rx, cancel.clone()));

    // Outlives the pipeline so the final snapshot sees every delivery.
    let observers = CancellationToken::new();
    let reporter = tokio::spawn(
        StatusReporter::new(Arc::clone(&counters), config.status_interval()).run(observers.clone()),
    );
    let metrics = match config.metrics_port {
        Some(port) => match MetricsExporter::new(Arc::clone(&counters)) {
            Ok(exporter) => Some(tokio::spawn(exporter.serve(port, observers.clone()))),
            Err(e) => {
                warn!(error = %e, "Metrics exporter unavailable");
                None
            }
        },
        None => None,
    };

    let supervisor = tokio::spawn(async move {
        for result in futures::future::join_all(producers).await {
            if let Err(e) = result {
                error!(error = %e, "Source task failed");
            }
        }
        match batcher.await? {
            Ok(batches) => info!(batches, "All inputs drained"),
            Err(e) => warn!(error = %e, "Batcher stopped early"),
        }
        delivery.await?;

        observers.cancel();
        if let Some(metrics) = metrics {
            metrics.await?;
        }
        Ok(reporter.await?)
    });

    Ok(RunHandle {
        cancel,
        counters,
        supervisor,
    })
}

async fn run_source(
    source: SourceId,
    config: collector::TailConfig,
    lines: mpsc::Sender<crate::domain::RawLine>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
) {
    if let Err(e) = tail_source(source.clone(), config, lines, Arc::clone(&counters), cancel).await {
        warn!(%source, error = %e, "Source could not be read");
        PipelineCounters::incr(&counters.source_errors);
    }
}
