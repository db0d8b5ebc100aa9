pub mod config;
pub mod context;
pub mod logging_system;
pub mod pipeline;
pub mod service;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use context::RunContext;
pub use logging_system::{LoggingError, LoggingSystem, setup_logging};
pub use service::{RunHandle, start};

use crate::domain::PipelineError;
use crate::parser::ParserRegistry;
use crate::reliability::StatusSnapshot;
use std::io::Write;
use tracing::info;

/// What the command line asked for.
pub enum Mode {
    Run(Config),
    /// An informational mode already handled; exit successfully.
    Done,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Handle `--list` and the config-writing modes, or hand back a
    /// validated configuration for a run.
    pub fn prepare(mut config: Config, out: &mut impl Write) -> Result<Mode, ConfigError> {
        if config.list {
            writeln!(out, "Available parsers:")?;
            for name in ParserRegistry::with_builtin().parser_types() {
                writeln!(out, "  {name}")?;
            }
            return Ok(Mode::Done);
        }
        if config.write_default_config {
            write!(out, "{}", Config::default().to_toml()?)?;
            return Ok(Mode::Done);
        }

        config.post_process();
        if config.write_current_config {
            write!(out, "{}", config.to_toml()?)?;
            return Ok(Mode::Done);
        }

        config.validate()?;
        Ok(Mode::Run(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until the inputs are drained (`--tail.stop`) or a shutdown signal
    /// arrives.
    pub async fn run(self) -> Result<StatusSnapshot, PipelineError> {
        let handle = start(self.config).await?;
        let signals = shutdown::spawn_signal_listener(handle.cancellation_token());
        let token = handle.cancellation_token();

        let result = handle.wait().await;
        // stop the signal listener
        token.cancel();
        let _ = signals.await;
        result
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Binary entry point.
pub async fn main() -> anyhow::Result<()> {
    let config = Config::load(std::env::args_os())?;
    let config = match App::prepare(config, &mut std::io::stdout().lock())? {
        Mode::Run(config) => config,
        Mode::Done => return Ok(()),
    };

    setup_logging(config.log_level, config.log_format)?;
    info!(version = %get_version(), "Starting clicktail");

    let snapshot = App::new(config).run().await?;
    info!(
        events_sent = snapshot.events_sent,
        events_dropped = snapshot.events_dropped,
        "clicktail finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_mode() {
        let config = Config {
            list: true,
            ..Config::default()
        };
        let mut out = Vec::new();
        assert!(matches!(App::prepare(config, &mut out).unwrap(), Mode::Done));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("keyval"));
        assert!(text.contains("mysql"));
    }

    #[test]
    fn test_write_current_config_reflects_backfill() {
        let config = Config {
            backfill: true,
            write_current_config: true,
            ..Config::default()
        };
        let mut out = Vec::new();
        App::prepare(config, &mut out).unwrap();
        let written: Config = toml::from_str(&String::from_utf8(out).unwrap()).unwrap();
        assert!(written.backoff);
        assert!(written.tail.stop);
    }

    #[test]
    fn test_run_mode_requires_valid_config() {
        assert!(App::prepare(Config::default(), &mut Vec::new()).is_err());
    }
}
