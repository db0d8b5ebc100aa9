use super::{ConfigError, LogFormat, LogLevel};
use crate::buffer::BatchConfig;
use crate::collector::{ReadFrom, TailConfig};
use crate::parser::timestamp::TimeContext;
use chrono_tz::Tz;
use crate::parser::{JsonOptions, KeyValOptions, NginxOptions, ParserOptions, RegexOptions};
use crate::reliability::BackoffConfig;
use crate::sampler::{DynSamplerSettings, DynSamplerState, SamplingPolicy, StaticSampler};
use crate::sender::{ClientConfig, PoolConfig};
use crate::transform::{QueryMode, TransformSettings};
use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Nested option groups flattened into the command line as `--<group>.<key>`.
/// Their clap ids are `<group>_<key>`.
const OPTION_GROUPS: &[&str] = &["tail", "json", "keyval", "regex", "nginx"];

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailOptions {
    /// Where to start reading files that already have content
    #[arg(long = "tail.read_from", id = "tail_read_from", default_value = "beginning")]
    pub read_from: ReadFrom,

    /// Stop reading at end of file instead of following it
    #[arg(long = "tail.stop", id = "tail_stop")]
    pub stop: bool,

    /// How often to check a followed file for new data
    #[arg(long = "tail.poll_interval_ms", id = "tail_poll_interval_ms", default_value = "250")]
    pub poll_interval_ms: u64,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            read_from: ReadFrom::Beginning,
            stop: false,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// TOML config file; command-line options override its values
    #[arg(short = 'c', long = "config", env = "CLICKTAIL_CONFIG")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Parser module to use (see --list)
    #[arg(short = 'p', long, env = "CLICKTAIL_PARSER")]
    pub parser: Option<String>,

    /// Log file(s) to parse. Use '-' for STDIN; globs are expanded.
    /// May be given several times
    #[arg(short = 'f', long = "file")]
    pub files: Vec<String>,

    /// Name of the ClickHouse table to insert into
    #[arg(short = 'd', long, env = "CLICKTAIL_DATASET")]
    pub dataset: Option<String>,

    /// Base URL of the ClickHouse HTTP interface
    #[arg(long, env = "CLICKTAIL_API_HOST", default_value = "http://localhost:8123/")]
    pub api_host: String,

    /// Only send 1 / N log lines
    #[arg(short = 'r', long, default_value = "1")]
    pub samplerate: u32,

    /// Number of concurrent connections to ClickHouse
    #[arg(short = 'P', long, default_value = "10")]
    pub poolsize: usize,

    /// How frequently to flush batches
    #[arg(long, default_value = "10000")]
    pub send_frequency_ms: u64,

    /// Maximum number of events in a batch
    #[arg(long, default_value = "1000000")]
    pub send_batch_size: usize,

    /// How frequently, in seconds, to log summary info
    #[arg(long, default_value = "60")]
    pub status_interval: u64,

    /// Ingest old data: implies --backoff, --tail.read_from=beginning and
    /// --tail.stop
    #[arg(long)]
    pub backfill: bool,

    /// Retry rate-limited and failed batches with backoff instead of
    /// dropping them
    #[arg(long)]
    pub backoff: bool,

    /// Replace the field's value with a one-way hash. May be given several times
    #[arg(long = "scrub_field")]
    pub scrub_field: Vec<String>,

    /// Do not send the field. May be given several times
    #[arg(long = "drop_field")]
    pub drop_field: Vec<String>,

    /// Add key=val to every event. May be given several times
    #[arg(long = "add_field")]
    pub add_field: Vec<String>,

    /// Field holding an HTTP request ('METHOD /path HTTP/1.x' or a bare
    /// path) to break into sub-fields. Defaults to 'request' for nginx
    #[arg(long = "request_shape")]
    pub request_shape: Vec<String>,

    /// Prefix for fields generated by request shaping
    #[arg(long)]
    pub shape_prefix: Option<String>,

    /// Path pattern such as /users/:id; first match wins. May be given
    /// several times
    #[arg(long = "request_pattern")]
    pub request_pattern: Vec<String>,

    /// Which query parameters become fields
    #[arg(long, default_value = "whitelist")]
    pub request_parse_query: QueryMode,

    /// Query keys to extract with --request_parse_query=whitelist
    #[arg(long = "request_query_keys")]
    pub request_query_keys: Vec<String>,

    /// Regex matched at the start of each line; named groups become fields
    /// and the match is stripped before parsing
    #[arg(long)]
    pub log_prefix: Option<String>,

    /// Enable dynamic sampling keyed on this field. May be given several
    /// times; values are joined to form the key
    #[arg(long = "dynsampling")]
    pub dynsampling: Vec<String>,

    /// Dynamic sampling measurement window, in seconds
    #[arg(long, default_value = "30")]
    pub dynsample_window: u64,

    /// Events per second below which dynamic sampling keeps everything
    #[arg(long, default_value = "1")]
    pub dynsample_minimum: u32,

    /// Lowest rate dynamic sampling may assign
    #[arg(long, default_value = "1")]
    pub dynsample_min_rate: u32,

    #[command(flatten)]
    pub tail: TailOptions,

    /// Read zone-less timestamps as local time instead of UTC
    #[arg(long)]
    pub localtime: bool,

    /// Read zone-less timestamps in this tz database zone (e.g. America/Los_Angeles)
    #[arg(long)]
    pub timezone: Option<String>,

    /// Print debugging output
    #[arg(long)]
    pub debug: bool,

    #[arg(long, env = "CLICKTAIL_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[arg(long, env = "CLICKTAIL_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Seed for sampling decisions
    #[arg(long)]
    pub seed: Option<u64>,

    /// Gzip request bodies
    #[arg(long)]
    pub compress: bool,

    #[arg(long, default_value = "10")]
    pub request_timeout_secs: u64,

    /// Capacity of each bounded queue between stages
    #[arg(long, default_value = "10000")]
    pub queue_capacity: usize,

    #[arg(long, default_value = "100")]
    pub backoff_base_ms: u64,

    #[arg(long, default_value = "60000")]
    pub backoff_max_ms: u64,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "CLICKTAIL_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(flatten)]
    pub json: JsonOptions,

    #[command(flatten)]
    pub keyval: KeyValOptions,

    #[command(flatten)]
    pub regex: RegexOptions,

    #[command(flatten)]
    pub nginx: NginxOptions,

    /// List available parsers and exit
    #[arg(short = 'l', long)]
    #[serde(skip)]
    pub list: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    #[serde(skip)]
    pub write_default_config: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    #[serde(skip)]
    pub write_current_config: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: None,
            parser: None,
            files: Vec::new(),
            dataset: None,
            api_host: "http://localhost:8123/".to_string(),
            samplerate: 1,
            poolsize: 10,
            send_frequency_ms: 10_000,
            send_batch_size: 1_000_000,
            status_interval: 60,
            backfill: false,
            backoff: false,
            scrub_field: Vec::new(),
            drop_field: Vec::new(),
            add_field: Vec::new(),
            request_shape: Vec::new(),
            shape_prefix: None,
            request_pattern: Vec::new(),
            request_parse_query: QueryMode::Whitelist,
            request_query_keys: Vec::new(),
            log_prefix: None,
            dynsampling: Vec::new(),
            dynsample_window: 30,
            dynsample_minimum: 1,
            dynsample_min_rate: 1,
            tail: TailOptions::default(),
            localtime: false,
            timezone: None,
            debug: false,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            seed: None,
            compress: false,
            request_timeout_secs: 10,
            queue_capacity: 10_000,
            backoff_base_ms: 100,
            backoff_max_ms: 60_000,
            metrics_port: None,
            json: JsonOptions::default(),
            keyval: KeyValOptions::default(),
            regex: RegexOptions::default(),
            nginx: NginxOptions::default(),
            list: false,
            write_default_config: false,
            write_current_config: false,
        }
    }
}

impl Config {
    /// Command line (and environment), layered over the `--config` file
    /// when one is given. Not yet post-processed or validated.
    pub fn load<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Config::command().get_matches_from(args);
        let cli = Config::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

        match &cli.config_file {
            Some(path) => {
                let base = Self::read_file(path)?;
                Self::overlay(base, cli, &matches)
            }
            None => Ok(cli),
        }
    }

    /// Parse, post-process and validate in one step.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Self::load(args)?;
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path.as_ref())?;
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Copy every option given on the command line or through the
    /// environment over the file's values.
    fn overlay(base: Config, cli: Config, matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::try_from(&base)?;
        let given = toml::Value::try_from(&cli)?;

        for id in matches.ids() {
            let id = id.as_str();
            if !matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            ) {
                continue;
            }
            let (group, key) = split_id(id);
            let source = match group {
                Some(group) => given.get(group).and_then(|g| g.get(key)),
                None => given.get(key),
            };
            let Some(value) = source.cloned() else {
                continue;
            };
            let target = match group {
                Some(group) => merged
                    .as_table_mut()
                    .and_then(|t| t.get_mut(group))
                    .and_then(toml::Value::as_table_mut),
                None => merged.as_table_mut(),
            };
            if let Some(table) = target {
                table.insert(key.to_string(), value);
            }
        }

        let mut config: Config = merged.try_into()?;
        config.config_file = cli.config_file;
        config.list = cli.list;
        config.write_default_config = cli.write_default_config;
        config.write_current_config = cli.write_current_config;
        Ok(config)
    }

    /// Apply the option implications:
    /// `--backfill` means backoff plus read-from-beginning-and-stop, the
    /// nginx parser shapes its `request` field, `--debug` raises the log
    /// level, and the line prefix is anchored.
    pub fn post_process(&mut self) {
        if self.backfill {
            self.backoff = true;
            self.tail.read_from = ReadFrom::Beginning;
            self.tail.stop = true;
        }

        if self.parser.as_deref() == Some("nginx")
            && !self.request_shape.iter().any(|f| f == "request")
        {
            self.request_shape.push("request".to_string());
        }

        if self.debug {
            self.log_level = LogLevel::Debug;
        }

        if let Some(prefix) = &self.log_prefix {
            self.log_prefix = Some(crate::transform::prefix::anchor(prefix));
        }
    }

    pub fn parser_name(&self) -> &str {
        self.parser.as_deref().unwrap_or_default()
    }

    pub fn dataset_name(&self) -> &str {
        self.dataset.as_deref().unwrap_or_default()
    }

    /// The `--timezone` zone; `validate` rejects names that do not resolve.
    pub fn time_zone(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|name| name.parse().ok())
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            json: self.json.clone(),
            keyval: self.keyval.clone(),
            regex: self.regex.clone(),
            nginx: self.nginx.clone(),
            time: TimeContext::new(self.localtime).with_zone(self.time_zone()),
        }
    }

    pub fn transform_settings(&self) -> TransformSettings {
        TransformSettings {
            add_fields: self.add_field.clone(),
            drop_fields: self.drop_field.clone(),
            scrub_fields: self.scrub_field.clone(),
            request_shape: self.request_shape.clone(),
            shape_prefix: self.shape_prefix.clone(),
            request_patterns: self.request_pattern.clone(),
            query_mode: self.request_parse_query,
            query_keys: self.request_query_keys.clone(),
        }
    }

    pub fn uses_dynamic_sampling(&self) -> bool {
        !self.dynsampling.is_empty()
    }

    /// Static 1-in-N unless dynamic sampling fields are configured, in which
    /// case `--samplerate` is the goal rate.
    pub fn sampling_policy(&self) -> SamplingPolicy {
        if self.uses_dynamic_sampling() {
            SamplingPolicy::Dynamic {
                fields: self.dynsampling.clone(),
                state: DynSamplerState::new(DynSamplerSettings {
                    goal_rate: self.samplerate,
                    window: Duration::from_secs(self.dynsample_window),
                    min_events_per_sec: self.dynsample_minimum,
                    min_rate: self.dynsample_min_rate,
                }),
            }
        } else {
            SamplingPolicy::Static(StaticSampler::new(self.samplerate))
        }
    }

    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            read_from: self.tail.read_from,
            stop: self.tail.stop,
            poll_interval: Duration::from_millis(self.tail.poll_interval_ms),
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_size: self.send_batch_size,
            max_age: Duration::from_millis(self.send_frequency_ms),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.poolsize,
            backoff: BackoffConfig {
                enabled: self.backoff,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
            },
        }
    }

    pub fn client_config(&self, user_agent: String) -> ClientConfig {
        ClientConfig {
            api_host: self.api_host.clone(),
            dataset: self.dataset_name().to_string(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_connections: self.poolsize,
            user_agent,
            compress: self.compress,
            ..ClientConfig::default()
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval.max(1))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn split_id(id: &str) -> (Option<&str>, &str) {
    for group in OPTION_GROUPS {
        if let Some(key) = id
            .strip_prefix(group)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return (Some(group), key);
        }
    }
    (None, id)
}
