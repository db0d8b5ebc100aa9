use super::regex_error::ParserConfigError;
use super::timestamp::TimeContext;
use super::{LineParser, ParseError, ParseOutput};
use crate::domain::{Event, FieldValue};
use clap::Args;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexOptions {
    /// Regular expression with named capture groups. May be given several
    /// times; patterns are tried in order and the first match wins
    #[arg(long = "regex.line_regex", id = "regex_line_regex")]
    pub line_regex: Vec<String>,

    /// Name of the capture group that contains a timestamp
    #[arg(long = "regex.timefield", id = "regex_timefield")]
    pub timefield: Option<String>,

    /// strftime format of the time field (auto-detected when omitted)
    #[arg(long = "regex.time_format", id = "regex_time_format")]
    pub time_format: Option<String>,
}

/// Builds events from the named capture groups of the first matching pattern.
#[derive(Debug)]
pub struct RegexParser {
    patterns: Vec<Regex>,
    timefield: Option<String>,
    time_format: Option<String>,
    time: TimeContext,
}

impl RegexParser {
    pub fn new(options: &RegexOptions, time: TimeContext) -> Result<Self, ParserConfigError> {
        if options.line_regex.is_empty() {
            return Err(ParserConfigError::MissingOption {
                parser: "regex",
                option: "regex.line_regex",
            });
        }

        let mut patterns = Vec::with_capacity(options.line_regex.len());
        for pattern in &options.line_regex {
            let regex = Regex::new(pattern)
                .map_err(|e| ParserConfigError::compilation(pattern, "regex.line_regex", e))?;
            if regex.capture_names().flatten().next().is_none() {
                return Err(ParserConfigError::InvalidOption {
                    parser: "regex",
                    details: format!("pattern '{pattern}' has no named capture groups"),
                });
            }
            patterns.push(regex);
        }

        Ok(Self {
            patterns,
            timefield: options.timefield.clone(),
            time_format: options.time_format.clone(),
            time,
        })
    }
}

/// Copy every participating named group of `captures` into `event`.
pub(crate) fn insert_named_groups(event: &mut Event, regex: &Regex, captures: &regex::Captures<'_>) {
    for name in regex.capture_names().flatten() {
        if let Some(m) = captures.name(name) {
            event.insert(name, FieldValue::infer(m.as_str()));
        }
    }
}

impl LineParser for RegexParser {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn consume(&mut self, line: &str) -> Result<ParseOutput, ParseError> {
        let (regex, captures) = self
            .patterns
            .iter()
            .find_map(|regex| regex.captures(line).map(|caps| (regex, caps)))
            .ok_or(ParseError::NoMatch)?;

        let mut event = Event::new();
        insert_named_groups(&mut event, regex, &captures);

        if let Some(timefield) = &self.timefield
            && let Some(m) = captures.name(timefield)
            && let Some(ts) = self.time.parse(m.as_str(), self.time_format.as_deref())
        {
            event.remove(timefield);
            event.set_timestamp(ts);
        }

        Ok(ParseOutput::emit(event))
    }
}
