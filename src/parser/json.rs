use super::timestamp::TimeContext;
use super::{LineParser, ParseError, ParseOutput};
use crate::domain::{Event, FieldValue};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Name of the field that contains a timestamp
    #[arg(long = "json.timefield", id = "json_timefield")]
    pub timefield: Option<String>,

    /// strftime format of the time field (auto-detected when omitted)
    #[arg(long = "json.time_format", id = "json_time_format")]
    pub time_format: Option<String>,
}

/// One JSON object per line. Top-level scalars become typed fields; nested
/// objects and arrays are kept as their JSON text.
#[derive(Debug)]
pub struct JsonParser {
    options: JsonOptions,
    time: TimeContext,
}

impl JsonParser {
    pub fn new(options: JsonOptions, time: TimeContext) -> Self {
        Self { options, time }
    }

    fn convert(value: Value) -> Option<FieldValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Bool(b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(FieldValue::Str(s)),
            nested @ (Value::Array(_) | Value::Object(_)) => {
                Some(FieldValue::Str(nested.to_string()))
            }
        }
    }
}

impl LineParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn consume(&mut self, line: &str) -> Result<ParseOutput, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ParseOutput::skipped());
        }
        let value: Value = serde_json::from_str(line)?;
        let Value::Object(map) = value else {
            return Err(ParseError::InvalidFormat(
                "expected a JSON object".to_string(),
            ));
        };

        let mut event = Event::new();
        for (key, value) in map {
            if let Some(field) = Self::convert(value) {
                event.insert(key, field);
            }
        }

        if let Some(timefield) = &self.options.timefield
            && let Some(raw) = event.get(timefield)
        {
            let raw = raw.to_string();
            if let Some(ts) = self.time.parse(&raw, self.options.time_format.as_deref()) {
                event.remove(timefield);
                event.set_timestamp(ts);
            }
        }

        Ok(ParseOutput::emit(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_scalars_and_nested() {
        let mut parser = JsonParser::new(JsonOptions::default(), TimeContext::default());
        let event = parser
            .consume(r#"{"status":200,"latency":0.25,"ok":true,"user":"ann","tags":["a"],"none":null}"#)
            .unwrap()
            .event
            .unwrap();

        assert_eq!(event.get("status"), Some(&FieldValue::Int(200)));
        assert_eq!(event.get("latency"), Some(&FieldValue::Float(0.25)));
        assert_eq!(event.get("ok"), Some(&FieldValue::Bool(true)));
        assert_eq!(event.get("user"), Some(&FieldValue::Str("ann".into())));
        assert_eq!(event.get("tags"), Some(&FieldValue::Str("[\"a\"]".into())));
        assert!(!event.contains("none"));
    }

    #[test]
    fn test_timefield() {
        let mut parser = JsonParser::new(
            JsonOptions {
                timefield: Some("time".into()),
                time_format: None,
            },
            TimeContext::default(),
        );
        let event = parser
            .consume(r#"{"time":"2022-02-02T08:09:10Z","a":1}"#)
            .unwrap()
            .event
            .unwrap();
        assert_eq!(event.timestamp().hour(), 8);
        assert!(!event.contains("time"));
    }

    #[test]
    fn test_blank_line_is_skipped() {
        let mut parser = JsonParser::new(JsonOptions::default(), TimeContext::default());
        assert_eq!(parser.consume("  ").unwrap(), ParseOutput::skipped());
    }

    #[test]
    fn test_malformed_json() {
        let mut parser = JsonParser::new(JsonOptions::default(), TimeContext::default());
        assert!(matches!(parser.consume("{not json"), Err(ParseError::Json(_))));
        assert!(matches!(
            parser.consume("[1,2,3]"),
            Err(ParseError::InvalidFormat(_))
        ));
    }
}
