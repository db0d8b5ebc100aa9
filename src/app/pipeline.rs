//! Per-source processing: prefix extraction, line sampling, parsing,
//! transforms and event sampling for the lines of one input.

use super::context::RunContext;
use crate::domain::{Event, RawLine, SampledEvent, SourceId};
use crate::parser::LineParser;
use crate::reliability::PipelineCounters;
use crate::sampler::Sampler;
use crate::transform::{PrefixExtractor, PrefixFields, Transformer};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// The parse/transform/sample chain for one source. Runs sequentially, so
/// the lines of a source are handled in file order.
pub struct SourceLineage {
    source: SourceId,
    parser: Box<dyn LineParser>,
    prefix: Option<PrefixExtractor>,
    transformer: Arc<Transformer>,
    sampler: Sampler,
    sample_lines: bool,
    counters: Arc<PipelineCounters>,
    output: mpsc::Sender<SampledEvent>,
    /// Prefix captures of lines the parser has not finalized yet, oldest first.
    held_prefixes: VecDeque<PrefixFields>,
}

/// Why a lineage stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageEnd {
    /// The source ended and the parser was flushed.
    Drained,
    /// The batcher went away.
    OutputClosed,
}

impl SourceLineage {
    pub fn new(
        ctx: &RunContext,
        source: SourceId,
        index: u64,
        output: mpsc::Sender<SampledEvent>,
    ) -> Result<Self, crate::parser::ParserConfigError> {
        Ok(Self {
            source,
            parser: ctx.parser.instantiate()?,
            prefix: ctx.prefix.clone(),
            transformer: Arc::clone(&ctx.transformer),
            sampler: ctx.sampling.sampler(ctx.seed, index),
            sample_lines: ctx.samples_lines(),
            counters: Arc::clone(&ctx.counters),
            output,
            held_prefixes: VecDeque::new(),
        })
    }

    pub async fn run(mut self, mut lines: mpsc::Receiver<RawLine>) -> LineageEnd {
        while let Some(line) = lines.recv().await {
            if !self.process_line(&line).await {
                return LineageEnd::OutputClosed;
            }
        }

        if let Some(event) = self.parser.flush() {
            PipelineCounters::incr(&self.counters.events_parsed);
            let captures: PrefixFields = self.held_prefixes.drain(..).flatten().collect();
            if !self.finish_event(event, captures, None).await {
                return LineageEnd::OutputClosed;
            }
        }
        debug!(source = %self.source, "Lineage drained");
        LineageEnd::Drained
    }

    /// Returns false once the output channel is closed.
    async fn process_line(&mut self, line: &RawLine) -> bool {
        let (captures, text) = match &self.prefix {
            Some(prefix) => prefix.extract(line.text()),
            None => (PrefixFields::new(), line.text()),
        };

        let mut line_rate = None;
        if self.sample_lines {
            let decision = self.sampler.decide_line();
            if !decision.keep {
                PipelineCounters::incr(&self.counters.sampled_out);
                return true;
            }
            line_rate = Some(decision.rate);
        }

        let output = match self.parser.consume(text) {
            Ok(output) => output,
            Err(e) => {
                PipelineCounters::incr(&self.counters.parse_errors);
                debug!(source = %self.source, seq = line.seq(), error = %e, "Skipping unparsable line");
                return true;
            }
        };

        self.held_prefixes.push_back(captures);
        let consumed = output.lines_consumed.min(self.held_prefixes.len());
        let released: PrefixFields = self.held_prefixes.drain(..consumed).flatten().collect();

        match output.event {
            Some(event) => {
                PipelineCounters::incr(&self.counters.events_parsed);
                self.finish_event(event, released, line_rate).await
            }
            None => {
                trace!(source = %self.source, seq = line.seq(), consumed, "No event for line");
                true
            }
        }
    }

    /// Transform, sample and queue one parsed event.
    async fn finish_event(
        &mut self,
        mut event: Event,
        captures: PrefixFields,
        line_rate: Option<u32>,
    ) -> bool {
        event.extend(captures);
        self.transformer.apply(&mut event);

        let rate = match line_rate {
            Some(rate) => rate,
            None => {
                let decision = self.sampler.decide_event(&event);
                if !decision.keep {
                    PipelineCounters::incr(&self.counters.sampled_out);
                    return true;
                }
                decision.rate
            }
        };

        if self.output.send(SampledEvent::new(event, rate)).await.is_err() {
            return false;
        }
        PipelineCounters::incr(&self.counters.events_queued);
        true
    }
}
