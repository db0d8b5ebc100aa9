use super::BufferError;
use crate::domain::SampledEvent;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{Instant as TokioInstant, sleep_until};
use uuid::Uuid;

/// What closed a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchType {
    SizeBased,
    TimeBased,
    /// Remainder flushed when the input ended.
    Final,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_size: usize,
    pub max_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_age: Duration::from_millis(100),
        }
    }
}

/// An ordered group of kept events. Owned by exactly one delivery worker
/// once handed off.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    events: Vec<SampledEvent>,
    batch_type: BatchType,
    created_at: Instant,
}

impl Batch {
    pub fn new(events: Vec<SampledEvent>, batch_type: BatchType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            events,
            batch_type,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[SampledEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SampledEvent> {
        self.events
    }

    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Groups kept events into batches, closing one when it reaches
/// `max_size` or when `max_age` has passed since its first event.
///
/// Runs as a single task so batch membership follows arrival order. The
/// remainder is flushed when every sender of the input channel is gone.
pub struct Batcher {
    config: BatchConfig,
    input: mpsc::Receiver<SampledEvent>,
    output: mpsc::Sender<Batch>,
}

impl Batcher {
    pub fn new(
        config: BatchConfig,
        input: mpsc::Receiver<SampledEvent>,
        output: mpsc::Sender<Batch>,
    ) -> Self {
        Self {
            config: BatchConfig {
                max_size: config.max_size.max(1),
                ..config
            },
            input,
            output,
        }
    }

    /// Returns the number of batches handed to the delivery pool.
    pub async fn run(mut self) -> Result<u64, BufferError> {
        let mut pending: Vec<SampledEvent> = Vec::with_capacity(self.initial_capacity());
        let mut deadline = TokioInstant::now() + self.config.max_age;
        let mut formed = 0_u64;

        loop {
            tokio::select! {
                item = self.input.recv() => match item {
                    Some(event) => {
                        if pending.is_empty() {
                            deadline = TokioInstant::now() + self.config.max_age;
                        }
                        pending.push(event);
                        if pending.len() >= self.config.max_size {
                            self.flush(&mut pending, BatchType::SizeBased).await?;
                            formed += 1;
                        }
                    }
                    None => {
                        if !pending.is_empty() {
                            self.flush(&mut pending, BatchType::Final).await?;
                            formed += 1;
                        }
                        tracing::debug!(batches = formed, "Batcher input closed");
                        return Ok(formed);
                    }
                },
                () = sleep_until(deadline), if !pending.is_empty() => {
                    self.flush(&mut pending, BatchType::TimeBased).await?;
                    formed += 1;
                }
            }
        }
    }

    // Large batch limits grow on demand.
    fn initial_capacity(&self) -> usize {
        self.config.max_size.min(4096)
    }

    async fn flush(
        &self,
        pending: &mut Vec<SampledEvent>,
        batch_type: BatchType,
    ) -> Result<(), BufferError> {
        let events = std::mem::replace(pending, Vec::with_capacity(self.initial_capacity()));
        let batch = Batch::new(events, batch_type);
        tracing::trace!(batch_id = %batch.id(), size = batch.size(), ?batch_type, "Batch formed");
        self.output
            .send(batch)
            .await
            .map_err(|_| BufferError::Closed("delivery queue"))
    }
}
