//! Parser Registry
//!
//! Maps a parser name to a factory producing fresh parser instances. The
//! registry is consulted once at startup; the resulting [`ParserSpec`] then
//! builds one instance per input source so multi-line accumulators never
//! mix lines from different files.

use super::json::{JsonOptions, JsonParser};
use super::keyval::{KeyValOptions, KeyValParser};
use super::line_regex::{RegexOptions, RegexParser};
use super::mysql::MysqlSlowLogParser;
use super::nginx::{NginxOptions, NginxParser};
use super::regex_error::ParserConfigError;
use super::timestamp::TimeContext;
use super::LineParser;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Options for every registered parser; each parser reads its own group.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    pub json: JsonOptions,
    pub keyval: KeyValOptions,
    pub regex: RegexOptions,
    pub nginx: NginxOptions,
    pub time: TimeContext,
}

pub type ParserFactory = fn(&ParserOptions) -> Result<Box<dyn LineParser>, ParserConfigError>;

#[derive(Clone, Copy)]
struct Registration {
    factory: ParserFactory,
    multiline: bool,
}

/// Registry of named parser factories.
pub struct ParserRegistry {
    parsers: BTreeMap<&'static str, Registration>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ParserRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Registry holding every parser shipped with clicktail.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("json", false, |opts| {
            Ok(Box::new(JsonParser::new(opts.json.clone(), opts.time)))
        });
        registry.register("keyval", false, |opts| {
            Ok(Box::new(KeyValParser::new(opts.keyval.clone(), opts.time)?))
        });
        registry.register("mysql", true, |opts| {
            Ok(Box::new(MysqlSlowLogParser::new(opts.time)))
        });
        registry.register("nginx", false, |opts| {
            Ok(Box::new(NginxParser::new(&opts.nginx, opts.time)?))
        });
        registry.register("regex", false, |opts| {
            Ok(Box::new(RegexParser::new(&opts.regex, opts.time)?))
        });
        registry
    }

    /// Register a parser under `name`. Registering a name twice replaces
    /// the earlier factory.
    pub fn register(&mut self, name: &'static str, multiline: bool, factory: ParserFactory) {
        self.parsers.insert(name, Registration { factory, multiline });
        tracing::debug!(parser = name, multiline, "Registered parser");
    }

    pub fn has_parser(&self, name: &str) -> bool {
        self.parsers.contains_key(name)
    }

    /// Registered parser names in sorted order.
    pub fn parser_types(&self) -> Vec<&'static str> {
        self.parsers.keys().copied().collect()
    }

    /// Select the parser for this run. Builds one instance up front so that
    /// bad options (an invalid regex, a missing nginx config) fail here
    /// rather than on the first line.
    pub fn resolve(
        &self,
        name: &str,
        options: ParserOptions,
    ) -> Result<ParserSpec, ParserConfigError> {
        let (&name, registration) = self
            .parsers
            .get_key_value(name)
            .ok_or_else(|| ParserConfigError::UnknownParser(name.to_string()))?;

        let options = Arc::new(options);
        (registration.factory)(&options)?;

        Ok(ParserSpec {
            name,
            registration: *registration,
            options,
        })
    }
}

/// The parser selected for a run.
#[derive(Clone)]
pub struct ParserSpec {
    name: &'static str,
    registration: Registration,
    options: Arc<ParserOptions>,
}

impl ParserSpec {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_multiline(&self) -> bool {
        self.registration.multiline
    }

    /// A fresh parser instance with its own accumulator state.
    pub fn instantiate(&self) -> Result<Box<dyn LineParser>, ParserConfigError> {
        (self.registration.factory)(&self.options)
    }
}

impl fmt::Debug for ParserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserSpec")
            .field("name", &self.name)
            .field("multiline", &self.registration.multiline)
            .finish()
    }
}
