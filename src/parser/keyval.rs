//! `key=value` parser.
//!
//! Splits a line into whitespace-separated `key=value` tokens. Values may be
//! double-quoted to contain spaces; `\"` escapes a quote inside them. Tokens
//! without `=` are ignored, a line with no pair at all is a parse error.

use super::regex_error::ParserConfigError;
use super::timestamp::TimeContext;
use super::{LineParser, ParseError, ParseOutput};
use crate::domain::{Event, FieldValue};
use clap::Args;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValOptions {
    /// Name of the field that contains a timestamp
    #[arg(long = "keyval.timefield", id = "keyval_timefield")]
    pub timefield: Option<String>,

    /// strftime format of the time field (auto-detected when omitted)
    #[arg(long = "keyval.time_format", id = "keyval_time_format")]
    pub time_format: Option<String>,

    /// Only lines matching this regex are parsed
    #[arg(long = "keyval.filter_regex", id = "keyval_filter_regex")]
    pub filter_regex: Option<String>,

    /// Invert the filter: skip lines matching filter_regex
    #[arg(long = "keyval.invert_filter", id = "keyval_invert_filter")]
    pub invert_filter: bool,
}

#[derive(Debug)]
pub struct KeyValParser {
    options: KeyValOptions,
    filter: Option<Regex>,
    time: TimeContext,
}

impl KeyValParser {
    pub fn new(options: KeyValOptions, time: TimeContext) -> Result<Self, ParserConfigError> {
        let filter = options
            .filter_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ParserConfigError::compilation(pattern, "keyval.filter_regex", e)
                })
            })
            .transpose()?;

        Ok(Self {
            options,
            filter,
            time,
        })
    }

    fn passes_filter(&self, line: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.is_match(line) != self.options.invert_filter,
            None => true,
        }
    }
}

impl LineParser for KeyValParser {
    fn name(&self) -> &'static str {
        "keyval"
    }

    fn consume(&mut self, line: &str) -> Result<ParseOutput, ParseError> {
        if line.trim().is_empty() || !self.passes_filter(line) {
            return Ok(ParseOutput::skipped());
        }

        let pairs = split_pairs(line);
        if pairs.is_empty() {
            return Err(ParseError::InvalidFormat(
                "no key=value pairs found".to_string(),
            ));
        }

        let mut event = Event::new();
        for (key, value) in pairs {
            event.insert(key, FieldValue::infer(&value));
        }

        if let Some(timefield) = &self.options.timefield
            && let Some(raw) = event.remove(timefield)
        {
            let raw = raw.to_string();
            match self.time.parse(&raw, self.options.time_format.as_deref()) {
                Some(ts) => event.set_timestamp(ts),
                None => {
                    tracing::debug!(field = %timefield, value = %raw, "Unparsable timestamp");
                    event.insert(timefield.clone(), FieldValue::Str(raw));
                }
            }
        }

        Ok(ParseOutput::emit(event))
    }
}

/// Tokenize `line` into `(key, value)` pairs.
pub fn split_pairs(line: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        let mut saw_equals = false;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            if c == '=' {
                saw_equals = true;
                break;
            }
            key.push(c);
        }

        if !saw_equals {
            continue;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' if chars.peek() == Some(&'"') => {
                        chars.next();
                        value.push('"');
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        if !key.is_empty() {
            pairs.push((key, value));
        }
    }

    pairs
}
