use super::config::Config;
use crate::domain::PipelineError;
use crate::parser::{ParserRegistry, ParserSpec};
use crate::reliability::PipelineCounters;
use crate::sampler::SamplingPolicy;
use crate::transform::{PrefixExtractor, Transformer};
use std::sync::Arc;

/// Everything a run shares between its components, built once from the
/// configuration. Nothing in here is process-global, so several runs can
/// coexist in one process.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub user_agent: String,
    pub counters: Arc<PipelineCounters>,
    pub parser: ParserSpec,
    pub prefix: Option<PrefixExtractor>,
    pub transformer: Arc<Transformer>,
    pub sampling: SamplingPolicy,
    pub seed: Option<u64>,
}

impl RunContext {
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let parser = ParserRegistry::with_builtin()
            .resolve(config.parser_name(), config.parser_options())
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let prefix = config
            .log_prefix
            .as_deref()
            .map(PrefixExtractor::new)
            .transpose()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let transformer = Transformer::new(&config.transform_settings())
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(Self {
            user_agent: user_agent(parser.name(), config.backfill),
            counters: PipelineCounters::new(),
            parser,
            prefix,
            transformer: Arc::new(transformer),
            sampling: config.sampling_policy(),
            seed: config.seed,
        })
    }

    /// Whether static sampling runs on raw lines, ahead of the parser.
    pub fn samples_lines(&self) -> bool {
        self.sampling.samples_lines(self.parser.is_multiline())
    }
}

/// `clicktail/<version> (<parser>[ backfill])`
pub fn user_agent(parser: &str, backfill: bool) -> String {
    let mut agent = format!("clicktail/{} ({parser}", crate::VERSION);
    if backfill {
        agent.push_str(" backfill");
    }
    agent.push(')');
    agent
}
