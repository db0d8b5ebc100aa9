use super::TransformError;
use crate::domain::FieldValue;
use regex::Regex;

/// Splits a fixed-format prefix (syslog header, container tag, ...) off a
/// raw line before it reaches the parser.
#[derive(Debug, Clone)]
pub struct PrefixExtractor {
    pattern: Regex,
}

/// Fields captured from a line prefix.
pub type PrefixFields = Vec<(String, FieldValue)>;

impl PrefixExtractor {
    /// Compile `pattern`, anchoring it to the start of the line if needed.
    pub fn new(pattern: &str) -> Result<Self, TransformError> {
        let anchored = anchor(pattern);
        let pattern = Regex::new(&anchored).map_err(|source| TransformError::InvalidPrefix {
            pattern: anchored.clone(),
            source,
        })?;
        Ok(Self { pattern })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns the named captures and the rest of the line. A line the
    /// prefix does not match is passed through untouched.
    pub fn extract<'a>(&self, line: &'a str) -> (PrefixFields, &'a str) {
        let Some(captures) = self.pattern.captures(line) else {
            return (Vec::new(), line);
        };

        let fields = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), FieldValue::infer(m.as_str())))
            })
            .collect();
        let end = captures.get(0).map_or(0, |m| m.end());
        (fields, &line[end..])
    }
}

pub fn anchor(pattern: &str) -> String {
    if pattern.starts_with('^') {
        pattern.to_string()
    } else {
        format!("^{pattern}")
    }
}
