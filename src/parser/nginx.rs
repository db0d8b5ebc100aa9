//! nginx access log parser.
//!
//! The line grammar is derived from an nginx `log_format` definition: every
//! `$variable` becomes a named capture group that stops at the literal
//! character following it in the format. The definition is either the
//! built-in `combined` format or is looked up by name in an nginx config file.

use super::line_regex::insert_named_groups;
use super::regex_error::ParserConfigError;
use super::timestamp::{TimeContext, parse_epoch};
use super::{LineParser, ParseError, ParseOutput};
use crate::domain::Event;
use clap::Args;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

pub const COMBINED_FORMAT: &str = r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent""#;

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxOptions {
    /// Path to the nginx config file containing the log_format definition
    #[arg(long = "nginx.conf", id = "nginx_conf")]
    pub conf: Option<PathBuf>,

    /// Name of the log_format to use
    #[arg(long = "nginx.format", id = "nginx_format", default_value = "combined")]
    pub format: String,
}

impl Default for NginxOptions {
    fn default() -> Self {
        Self {
            conf: None,
            format: "combined".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct NginxParser {
    line: Regex,
    time: TimeContext,
}

impl NginxParser {
    pub fn new(options: &NginxOptions, time: TimeContext) -> Result<Self, ParserConfigError> {
        let format = match &options.conf {
            Some(path) => {
                let conf = std::fs::read_to_string(path).map_err(|source| ParserConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                find_log_format(&conf, &options.format).ok_or_else(|| {
                    ParserConfigError::InvalidOption {
                        parser: "nginx",
                        details: format!(
                            "log_format '{}' not found in {}",
                            options.format,
                            path.display()
                        ),
                    }
                })?
            }
            None if options.format == "combined" => COMBINED_FORMAT.to_string(),
            None => {
                return Err(ParserConfigError::MissingOption {
                    parser: "nginx",
                    option: "nginx.conf",
                });
            }
        };

        Ok(Self {
            line: format_to_regex(&format)?,
            time,
        })
    }
}

impl LineParser for NginxParser {
    fn name(&self) -> &'static str {
        "nginx"
    }

    fn consume(&mut self, line: &str) -> Result<ParseOutput, ParseError> {
        let captures = self.line.captures(line).ok_or(ParseError::NoMatch)?;

        let mut event = Event::new();
        insert_named_groups(&mut event, &self.line, &captures);

        // nginx logs "-" for empty variables
        let empty: Vec<String> = event
            .fields()
            .iter()
            .filter(|(_, v)| v.as_str() == Some("-"))
            .map(|(k, _)| k.clone())
            .collect();
        for name in empty {
            event.remove(&name);
        }

        let timestamp = match (
            event.remove("time_local"),
            event.remove("time_iso8601"),
            event.remove("msec"),
        ) {
            (Some(raw), _, _) | (None, Some(raw), _) => self.time.parse(&raw.to_string(), None),
            (None, None, Some(raw)) => parse_epoch(&raw.to_string()),
            (None, None, None) => None,
        };
        if let Some(ts) = timestamp {
            event.set_timestamp(ts);
        }

        Ok(ParseOutput::emit(event))
    }
}

/// Extract the format string of `log_format <name> ...;` from a config file.
pub fn find_log_format(conf: &str, name: &str) -> Option<String> {
    let directive =
        Regex::new(r#"(?s)log_format\s+(\S+)\s+(?:escape=\S+\s+)?((?:'[^']*'|"[^"]*"|\s)+);"#)
            .ok()?;
    let piece = Regex::new(r#"'([^']*)'|"([^"]*)""#).ok()?;

    directive
        .captures_iter(conf)
        .find(|caps| &caps[1] == name)
        .map(|caps| {
            piece
                .captures_iter(&caps[2])
                .filter_map(|p| p.get(1).or_else(|| p.get(2)))
                .map(|m| m.as_str())
                .collect::<String>()
        })
}

/// Translate an nginx `log_format` string into an anchored regex.
pub fn format_to_regex(format: &str) -> Result<Regex, ParserConfigError> {
    let chars: Vec<char> = format.chars().collect();
    let mut pattern = String::from("^");
    let mut seen = HashSet::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            let braced = chars.get(i + 1) == Some(&'{');
            let start = if braced { i + 2 } else { i + 1 };
            let mut end = start;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            if end > start {
                let name: String = chars[start..end].iter().collect();
                let after = if braced && chars.get(end) == Some(&'}') {
                    end + 1
                } else {
                    end
                };
                let body = match chars.get(after) {
                    Some(&next) if next != '$' => {
                        format!("[^{}]*", regex::escape(&next.to_string()))
                    }
                    _ => ".*?".to_string(),
                };
                if seen.insert(name.clone()) {
                    pattern.push_str(&format!("(?P<{name}>{body})"));
                } else {
                    pattern.push_str(&format!("(?:{body})"));
                }
                i = after;
                continue;
            }
        }
        pattern.push_str(&regex::escape(&c.to_string()));
        i += 1;
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| ParserConfigError::compilation(&pattern, "nginx.format", e))
}
