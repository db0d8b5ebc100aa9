use super::{Config, ConfigError};
use crate::collector::{self, CollectorError, ReadFrom};
use crate::parser::ParserRegistry;
use crate::transform::{PrefixExtractor, Transformer};
use url::Url;

impl Config {
    /// Sanity checks run before anything starts. Everything here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parser = self
            .parser
            .as_deref()
            .ok_or(ConfigError::MissingOption("--parser"))?;
        if !ParserRegistry::with_builtin().has_parser(parser) {
            return Err(ConfigError::InvalidConfig(format!(
                "Unknown parser '{parser}' (see --list)"
            )));
        }

        if self.files.is_empty() {
            return Err(ConfigError::MissingOption("--file"));
        }
        if self.dataset.as_deref().is_none_or(|d| d.trim().is_empty()) {
            return Err(ConfigError::MissingOption("--dataset"));
        }

        Url::parse(&self.api_host).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid api_host '{}': {}", self.api_host, e))
        })?;

        if self.samplerate == 0 {
            return Err(ConfigError::InvalidConfig(
                "Sample rate must be at least 1".to_string(),
            ));
        }
        if self.uses_dynamic_sampling() && self.samplerate < 2 {
            return Err(ConfigError::InvalidConfig(
                "Dynamic sampling requires --samplerate of 2 or more".to_string(),
            ));
        }
        if self.dynsample_window == 0 {
            return Err(ConfigError::InvalidConfig(
                "Dynamic sampling window must be greater than 0".to_string(),
            ));
        }

        if self.tail.read_from == ReadFrom::End && self.tail.stop {
            return Err(ConfigError::InvalidConfig(
                "--tail.read_from=end with --tail.stop would read nothing".to_string(),
            ));
        }

        if self.send_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.poolsize == 0 {
            return Err(ConfigError::InvalidConfig(
                "Pool size must be greater than 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "Backoff base delay ({}ms) exceeds the maximum ({}ms)",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }

        if let Some(zone) = &self.timezone
            && zone.parse::<chrono_tz::Tz>().is_err()
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Unknown time zone '{zone}': expected a tz database name such as America/Los_Angeles"
            )));
        }

        if let Some(prefix) = &self.log_prefix {
            PrefixExtractor::new(prefix)
                .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        }
        Transformer::new(&self.transform_settings())
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        collector::resolve_sources(&self.files).map_err(|e| match e {
            CollectorError::MissingInput(spec) => ConfigError::MissingInput(spec),
            other => ConfigError::InvalidConfig(other.to_string()),
        })?;

        Ok(())
    }
}
