//! MySQL slow query log parser.
//!
//! A slow log record spans several lines:
//!
//! ```text
//! # Time: 2023-10-10T13:55:36.123456Z
//! # User@Host: app[app] @ web-1 [10.0.0.7]  Id:    42
//! # Query_time: 1.250000  Lock_time: 0.000076 Rows_sent: 1  Rows_examined: 10432
//! use shop;
//! SET timestamp=1696946136;
//! SELECT * FROM orders WHERE customer_id = 17;
//! ```
//!
//! Lines are folded into an open record until the next header line shows up,
//! at which point the finished record is emitted. The last record of a
//! stream is released by `flush`.

use super::timestamp::{TimeContext, parse_epoch};
use super::{LineParser, ParseError, ParseOutput};
use crate::domain::{Event, FieldValue};

#[derive(Debug, Default)]
struct SlowQuery {
    event: Event,
    query: Vec<String>,
    lines: usize,
}

impl SlowQuery {
    fn has_query(&self) -> bool {
        !self.query.is_empty()
    }

    fn finish(mut self, database: Option<&str>) -> Event {
        let query = self.query.join(" ");
        if let Some(statement) = query.split_whitespace().next() {
            self.event
                .insert("statement", statement.trim_end_matches(';').to_lowercase());
        }
        self.event.insert("normalized_query", normalize_query(&query));
        self.event.insert("query", query);
        if let Some(db) = database {
            self.event.insert("database", db);
        }
        self.event
    }
}

#[derive(Debug)]
pub struct MysqlSlowLogParser {
    time: TimeContext,
    record: Option<SlowQuery>,
    // `use db;` is only logged when the database changes, so it outlives a record
    database: Option<String>,
}

impl MysqlSlowLogParser {
    pub fn new(time: TimeContext) -> Self {
        Self {
            time,
            record: None,
            database: None,
        }
    }

    /// Close the open record if it already holds a query, returning it.
    fn take_finished(&mut self) -> Option<(Event, usize)> {
        if !self.record.as_ref().is_some_and(SlowQuery::has_query) {
            return None;
        }
        let record = self.record.take()?;
        let lines = record.lines;
        Some((record.finish(self.database.as_deref()), lines))
    }

    fn apply_header(&mut self, line: &str) {
        let record = self.record.get_or_insert_with(SlowQuery::default);
        let body = line.trim_start_matches('#').trim();

        if let Some(raw) = body.strip_prefix("Time:") {
            if let Some(ts) = self.time.parse(raw.trim(), None) {
                record.event.set_timestamp(ts);
            }
        } else if let Some(rest) = body.strip_prefix("User@Host:") {
            apply_user_host(&mut record.event, rest);
        } else {
            for (key, value) in header_pairs(body) {
                record.event.insert(key.to_lowercase(), FieldValue::infer(value));
            }
        }
    }
}

impl LineParser for MysqlSlowLogParser {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn consume(&mut self, line: &str) -> Result<ParseOutput, ParseError> {
        let trimmed = line.trim();

        if trimmed.starts_with('#') {
            let starts_record =
                trimmed.starts_with("# Time:") || trimmed.starts_with("# User@Host:");
            let finished = if starts_record {
                self.take_finished()
            } else {
                None
            };

            self.apply_header(trimmed);
            if let Some(record) = self.record.as_mut() {
                record.lines += 1;
            }
            return Ok(match finished {
                Some((event, lines)) => ParseOutput::emit_lines(event, lines),
                None => ParseOutput::pending(),
            });
        }

        let Some(record) = self.record.as_mut() else {
            // server banner and column headings printed at log rotation
            return Ok(ParseOutput::skipped());
        };
        if trimmed.is_empty() {
            record.lines += 1;
            return Ok(ParseOutput::pending());
        }

        if let Some(db) = strip_prefix_ignore_case(trimmed, "use ") {
            let db = db.trim().trim_end_matches(';').trim().trim_matches('`');
            self.database = Some(db.to_string());
        } else if let Some(raw) = strip_prefix_ignore_case(trimmed, "set timestamp=") {
            if let Some(ts) = parse_epoch(raw.trim_end_matches(';')) {
                record.event.set_timestamp(ts);
            }
        } else {
            record.query.push(trimmed.to_string());
        }
        record.lines += 1;
        Ok(ParseOutput::pending())
    }

    fn flush(&mut self) -> Option<Event> {
        let finished = self.take_finished().map(|(event, _)| event);
        self.record = None;
        finished
    }

    fn is_multiline(&self) -> bool {
        true
    }
}

/// `line` without an ASCII `prefix`, compared case-insensitively.
fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let n = prefix.len();
    (line.len() >= n && line.is_char_boundary(n) && line[..n].eq_ignore_ascii_case(prefix))
        .then(|| &line[n..])
}

/// `Key: value` pairs of a statistics header line.
fn header_pairs(body: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut tokens = body.split_whitespace();
    while let Some(token) = tokens.next() {
        if let Some(key) = token.strip_suffix(':')
            && let Some(value) = tokens.next()
        {
            pairs.push((key, value));
        }
    }
    pairs
}

/// `app[app] @ web-1 [10.0.0.7]  Id:    42`
fn apply_user_host(event: &mut Event, rest: &str) {
    let (user_part, host_part) = rest.split_once('@').unwrap_or((rest, ""));
    if let Some(user) = user_part.split('[').next().map(str::trim)
        && !user.is_empty()
    {
        event.insert("user", user);
    }

    let host_part = host_part.split("Id:").next().unwrap_or_default();
    let mut host = host_part.split('[');
    if let Some(name) = host.next().map(str::trim)
        && !name.is_empty()
    {
        event.insert("client", name);
    }
    if let Some(ip) = host.next().map(|s| s.trim_end_matches(|c| c == ']' || c == ' '))
        && !ip.is_empty()
    {
        event.insert("client_ip", ip);
    }
}

/// Replace literals with `?` and collapse whitespace so that queries
/// differing only in their arguments compare equal.
pub fn normalize_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    let mut prev_word = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                while let Some(inner) = chars.next() {
                    if inner == '\\' {
                        chars.next();
                    } else if inner == c {
                        if chars.peek() == Some(&c) {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                out.push('?');
                prev_word = false;
            }
            d if d.is_ascii_digit() && !prev_word => {
                while chars
                    .peek()
                    .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '.')
                {
                    chars.next();
                }
                out.push('?');
                prev_word = false;
            }
            w if w.is_whitespace() => {
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
                prev_word = false;
            }
            other => {
                out.push(other);
                prev_word = other.is_alphanumeric() || other == '_';
            }
        }
    }

    let mut normalized = out.trim_end().to_string();
    while normalized.contains("?, ?") {
        normalized = normalized.replace("?, ?", "?");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const RECORD: &[&str] = &[
        "# Time: 2023-10-10T13:55:36.123456Z",
        "# User@Host: app[app] @ web-1 [10.0.0.7]  Id:    42",
        "# Query_time: 1.250000  Lock_time: 0.000076 Rows_sent: 1  Rows_examined: 10432",
        "use shop;",
        "SELECT * FROM orders",
        "  WHERE customer_id = 17 AND state = 'open';",
    ];

    fn feed(parser: &mut MysqlSlowLogParser, lines: &[&str]) -> Vec<ParseOutput> {
        lines.iter().map(|l| parser.consume(l).unwrap()).collect()
    }

    #[test]
    fn test_record_emitted_on_next_header() {
        let mut parser = MysqlSlowLogParser::new(TimeContext::default());
        let outputs = feed(&mut parser, RECORD);
        assert!(outputs.iter().all(|o| *o == ParseOutput::pending()));

        let out = parser.consume("# Time: 2023-10-10T13:56:00Z").unwrap();
        assert_eq!(out.lines_consumed, RECORD.len());
        let event = out.event.unwrap();

        assert_eq!(event.get("user"), Some(&FieldValue::Str("app".into())));
        assert_eq!(event.get("client"), Some(&FieldValue::Str("web-1".into())));
        assert_eq!(event.get("client_ip"), Some(&FieldValue::Str("10.0.0.7".into())));
        assert_eq!(event.get("query_time"), Some(&FieldValue::Float(1.25)));
        assert_eq!(event.get("rows_examined"), Some(&FieldValue::Int(10432)));
        assert_eq!(event.get("database"), Some(&FieldValue::Str("shop".into())));
        assert_eq!(event.get("statement"), Some(&FieldValue::Str("select".into())));
        assert_eq!(
            event.get("normalized_query"),
            Some(&FieldValue::Str(
                "SELECT * FROM orders WHERE customer_id = ? AND state = ?;".into()
            ))
        );
        assert_eq!(event.timestamp().minute(), 55);
    }

    #[test]
    fn test_flush_releases_last_record() {
        let mut parser = MysqlSlowLogParser::new(TimeContext::default());
        feed(&mut parser, RECORD);
        let event = parser.flush().unwrap();
        assert!(event.contains("query"));
        assert!(parser.flush().is_none());
    }

    #[test]
    fn test_set_timestamp_overrides_header_time() {
        let mut parser = MysqlSlowLogParser::new(TimeContext::default());
        feed(
            &mut parser,
            &[
                "# Time: 2023-10-10T13:55:36Z",
                "SET timestamp=1459470669;",
                "DELETE FROM sessions;",
            ],
        );
        let event = parser.flush().unwrap();
        assert_eq!(event.timestamp().timestamp(), 1_459_470_669);
        assert_eq!(event.get("statement"), Some(&FieldValue::Str("delete".into())));
    }

    #[test]
    fn test_preamble_is_skipped() {
        let mut parser = MysqlSlowLogParser::new(TimeContext::default());
        let out = parser
            .consume("/usr/sbin/mysqld, Version: 8.0.34 (MySQL Community Server - GPL). started with:")
            .unwrap();
        assert_eq!(out, ParseOutput::skipped());
        assert!(parser.flush().is_none());
    }

    #[test]
    fn test_headers_without_query_do_not_emit() {
        let mut parser = MysqlSlowLogParser::new(TimeContext::default());
        let out = parser.consume("# Time: 2023-10-10T13:55:36Z").unwrap();
        assert_eq!(out, ParseOutput::pending());
        let out = parser.consume("# User@Host: root[root] @ localhost []").unwrap();
        assert_eq!(out, ParseOutput::pending());
        assert!(parser.flush().is_none());
    }

    #[test]
    fn test_use_statement_with_padding_and_non_ascii_name() {
        for (line, expected) in [("use  shop;", "shop"), ("USE `billing` ;", "billing"), ("use  é;", "é")] {
            let mut parser = MysqlSlowLogParser::new(TimeContext::default());
            feed(&mut parser, &["# Time: 2023-10-10T13:55:36Z", line, "SELECT 1;"]);
            let event = parser.flush().unwrap();
            assert_eq!(event.get("database"), Some(&FieldValue::Str(expected.into())), "{line}");
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(
            normalize_query("SELECT a FROM t1 WHERE id IN (1, 2, 3) AND name = 'o''brien'"),
            "SELECT a FROM t1 WHERE id IN (?) AND name = ?"
        );
    }
}
