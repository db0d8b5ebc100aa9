use super::config::{LogFormat, LogLevel};
use thiserror::Error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log directive '{directive}': {details}")]
    InvalidDirective { directive: String, details: String },
    #[error("Failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Builds the `EnvFilter` for clicktail's own diagnostics: a default level
/// plus per-target overrides for chatty dependencies.
#[derive(Debug, Default)]
pub struct LoggingSystem {
    directives: Vec<String>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `target=level` directive.
    pub fn add_directive(&mut self, directive: &str) -> Result<(), LoggingError> {
        let parsed = directive
            .parse::<Directive>()
            .map_err(|e| LoggingError::InvalidDirective {
                directive: directive.to_string(),
                details: e.to_string(),
            })?;
        self.directives.push(parsed.to_string());
        Ok(())
    }

    pub fn add_default_directives(&mut self) -> Result<(), LoggingError> {
        for directive in ["hyper=warn", "reqwest=warn", "h2=warn", "warp=warn"] {
            self.add_directive(directive)?;
        }
        Ok(())
    }

    pub fn directive_count(&self) -> usize {
        self.directives.len()
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        std::iter::once(default_level.as_str().to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the global subscriber. Fails if one is already set.
    pub fn initialize(&self, level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
        let filter_string = self.build_filter_string(level);
        let env_filter = EnvFilter::try_new(&filter_string)
            .map_err(|e| LoggingError::InitFailed(format!("filter '{filter_string}': {e}")))?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };
        result.map_err(|e| LoggingError::InitFailed(e.to_string()))
    }
}

/// Set up logging for a run from the configured level and format.
pub fn setup_logging(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    let mut logging = LoggingSystem::new();
    logging.add_default_directives()?;
    logging.initialize(level, format)
}
