//! Line parsers.
//!
//! Every parser satisfies one contract, [`LineParser`]: it is fed raw lines
//! one at a time and hands back zero or one [`Event`] per call. Single-line
//! formats answer immediately; multi-line formats keep an accumulator and
//! emit when the next record starts, or on [`LineParser::flush`] at end of
//! stream. Parsers are selected by name through the [`ParserRegistry`].

pub mod json;
pub mod keyval;
pub mod line_regex;
pub mod mysql;
pub mod nginx;
pub mod regex_error;
pub mod registry;
pub mod timestamp;

pub use json::{JsonOptions, JsonParser};
pub use keyval::{KeyValOptions, KeyValParser};
pub use line_regex::{RegexOptions, RegexParser};
pub use mysql::MysqlSlowLogParser;
pub use nginx::{NginxOptions, NginxParser};
pub use regex_error::ParserConfigError;
pub use registry::{ParserOptions, ParserRegistry, ParserSpec};

use crate::domain::Event;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Line does not match any configured pattern")]
    NoMatch,
}

/// Result of feeding one line to a parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub event: Option<Event>,
    /// Number of input lines finalized by this call: folded into `event`,
    /// or discarded. Lines still held by a multi-line accumulator are not
    /// counted until a later call (or `flush`) releases them.
    pub lines_consumed: usize,
}

impl ParseOutput {
    pub fn emit(event: Event) -> Self {
        Self {
            event: Some(event),
            lines_consumed: 1,
        }
    }

    pub fn emit_lines(event: Event, lines_consumed: usize) -> Self {
        Self {
            event: Some(event),
            lines_consumed,
        }
    }

    /// The line was read and intentionally ignored.
    pub fn skipped() -> Self {
        Self {
            event: None,
            lines_consumed: 1,
        }
    }

    /// The line was absorbed into a record that is still open.
    pub fn pending() -> Self {
        Self {
            event: None,
            lines_consumed: 0,
        }
    }
}

pub trait LineParser: Send {
    fn name(&self) -> &'static str;

    /// Feed one line. A `ParseError` means the line was dropped and counts
    /// as one finalized line.
    fn consume(&mut self, line: &str) -> Result<ParseOutput, ParseError>;

    /// Emit whatever a multi-line parser has accumulated.
    fn flush(&mut self) -> Option<Event> {
        None
    }

    fn is_multiline(&self) -> bool {
        false
    }
}
