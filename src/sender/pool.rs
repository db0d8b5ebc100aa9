//! Delivery pool.
//!
//! A fixed number of workers pull completed batches from one shared queue.
//! Each worker owns its batch until it is delivered or dropped, and runs
//! its own backoff, so a worker stuck retrying never holds up the others.

use super::transmission::SendOutcome;
use crate::buffer::Batch;
use crate::reliability::{BackoffConfig, BackoffState, PipelineCounters};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Where batches go. Implemented by the ClickHouse transmitter; tests plug
/// in in-memory sinks.
pub trait BatchSink: Send + Sync + 'static {
    fn send(&self, batch: &Batch) -> impl Future<Output = SendOutcome> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Sending,
    Backoff,
    FailedPermanent,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub backoff: BackoffConfig,
}

pub struct DeliveryPool<S> {
    config: PoolConfig,
    sink: Arc<S>,
    counters: Arc<PipelineCounters>,
}

impl<S: BatchSink> DeliveryPool<S> {
    pub fn new(config: PoolConfig, sink: Arc<S>, counters: Arc<PipelineCounters>) -> Self {
        Self {
            config,
            sink,
            counters,
        }
    }

    /// Run every worker until the batch queue is closed and drained.
    pub async fn run(self, batches: mpsc::Receiver<Batch>, cancel: CancellationToken) {
        let queue = Arc::new(Mutex::new(batches));
        let workers = self.config.workers.max(1);

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    state: WorkerState::Idle,
                    backoff: BackoffState::new(self.config.backoff),
                    sink: Arc::clone(&self.sink),
                    counters: Arc::clone(&self.counters),
                };
                tokio::spawn(worker.run(Arc::clone(&queue), cancel.clone()))
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Delivery worker task failed");
            }
        }
        debug!(workers, "Delivery pool finished");
    }
}

struct Worker<S> {
    id: usize,
    state: WorkerState,
    backoff: BackoffState,
    sink: Arc<S>,
    counters: Arc<PipelineCounters>,
}

impl<S: BatchSink> Worker<S> {
    async fn run(mut self, queue: Arc<Mutex<mpsc::Receiver<Batch>>>, cancel: CancellationToken) {
        loop {
            self.transition(WorkerState::Idle);
            let next = queue.lock().await.recv().await;
            let Some(batch) = next else {
                break;
            };
            self.deliver(batch, &cancel).await;
        }
        trace!(worker = self.id, "Delivery worker stopped");
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            trace!(worker = self.id, from = ?self.state, to = ?next, "Worker state");
            self.state = next;
        }
    }

    async fn deliver(&mut self, batch: Batch, cancel: &CancellationToken) {
        loop {
            self.transition(WorkerState::Sending);
            let outcome = self.sink.send(&batch).await;

            match &outcome {
                SendOutcome::Success => {
                    self.backoff.on_success();
                    PipelineCounters::incr(&self.counters.batches_sent);
                    PipelineCounters::add(&self.counters.events_sent, batch.size() as u64);
                    return;
                }
                SendOutcome::Permanent(reason) => {
                    self.transition(WorkerState::FailedPermanent);
                    PipelineCounters::incr(&self.counters.permanent_errors);
                    warn!(worker = self.id, batch_id = %batch.id(), %reason, "Dropping batch after permanent error");
                    self.drop_batch(&batch);
                    return;
                }
                SendOutcome::RateLimited => {
                    PipelineCounters::incr(&self.counters.rate_limited);
                }
                SendOutcome::Transient(reason) => {
                    PipelineCounters::incr(&self.counters.transient_errors);
                    debug!(worker = self.id, batch_id = %batch.id(), %reason, "Transient delivery error");
                }
            }

            let Some(delay) = self.backoff.on_failure() else {
                warn!(worker = self.id, batch_id = %batch.id(), ?outcome, "Backoff disabled, dropping batch");
                self.drop_batch(&batch);
                return;
            };

            self.transition(WorkerState::Backoff);
            debug!(
                worker = self.id,
                batch_id = %batch.id(),
                delay_ms = delay.as_millis() as u64,
                failures = self.backoff.consecutive_failures(),
                "Backing off before retry"
            );
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    PipelineCounters::incr(&self.counters.retries);
                }
                () = cancel.cancelled() => {
                    warn!(worker = self.id, batch_id = %batch.id(), "Shutdown during backoff, dropping batch");
                    self.drop_batch(&batch);
                    return;
                }
            }
        }
    }

    fn drop_batch(&self, batch: &Batch) {
        PipelineCounters::incr(&self.counters.batches_dropped);
        PipelineCounters::add(&self.counters.events_dropped, batch.size() as u64);
    }
}
