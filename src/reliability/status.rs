//! Pipeline counters and the periodic status reporter.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

macro_rules! pipeline_counters {
    ($($(#[$doc:meta])* $name:ident),+ $(,)?) => {
        /// Lock-free counters updated by every stage.
        #[derive(Debug, Default)]
        pub struct PipelineCounters {
            $($(#[$doc])* pub $name: AtomicU64,)+
        }

        /// Point-in-time copy of [`PipelineCounters`].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct StatusSnapshot {
            $(pub $name: u64,)+
        }

        impl PipelineCounters {
            pub fn snapshot(&self) -> StatusSnapshot {
                StatusSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)+
                }
            }
        }

        impl StatusSnapshot {
            /// Per-counter difference since `earlier`.
            pub fn delta(&self, earlier: &StatusSnapshot) -> StatusSnapshot {
                StatusSnapshot {
                    $($name: self.$name.saturating_sub(earlier.$name),)+
                }
            }

            /// `(name, value)` for every counter.
            pub fn entries(&self) -> Vec<(&'static str, u64)> {
                vec![$((stringify!($name), self.$name),)+]
            }
        }
    };
}

pipeline_counters! {
    lines_read,
    /// Lines or events discarded by the sampler
    sampled_out,
    events_parsed,
    parse_errors,
    /// Events handed to the batcher
    events_queued,
    events_sent,
    events_dropped,
    batches_sent,
    batches_dropped,
    retries,
    rate_limited,
    transient_errors,
    permanent_errors,
    /// Sources that failed or vanished mid-run
    source_errors,
}

impl PipelineCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Logs a snapshot of the counters, plus the change since the previous
/// report, every `interval`; logs a final snapshot when cancelled.
pub struct StatusReporter {
    counters: Arc<PipelineCounters>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(counters: Arc<PipelineCounters>, interval: Duration) -> Self {
        Self { counters, interval }
    }

    pub async fn run(self, cancel: CancellationToken) -> StatusSnapshot {
        let mut previous = self.counters.snapshot();
        let mut ticker = tokio::time::interval(self.interval);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let current = self.counters.snapshot();
                    log_snapshot("Pipeline status", &current, Some(&current.delta(&previous)));
                    previous = current;
                }
            }
        }

        let last = self.counters.snapshot();
        log_snapshot("Final pipeline status", &last, None);
        last
    }
}

fn log_snapshot(message: &str, s: &StatusSnapshot, delta: Option<&StatusSnapshot>) {
    tracing::info!(
        lines_read = s.lines_read,
        sampled_out = s.sampled_out,
        events_parsed = s.events_parsed,
        parse_errors = s.parse_errors,
        events_queued = s.events_queued,
        events_sent = s.events_sent,
        events_dropped = s.events_dropped,
        batches_sent = s.batches_sent,
        batches_dropped = s.batches_dropped,
        retries = s.retries,
        rate_limited = s.rate_limited,
        transient_errors = s.transient_errors,
        permanent_errors = s.permanent_errors,
        source_errors = s.source_errors,
        "{message}"
    );
    if let Some(d) = delta {
        tracing::info!(
            lines_read = d.lines_read,
            events_sent = d.events_sent,
            events_dropped = d.events_dropped,
            parse_errors = d.parse_errors,
            "Since last report"
        );
    }
}
