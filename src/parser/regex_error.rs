// Errors raised while building a parser from its options. All of them are
// configuration errors and surface before tailing starts.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserConfigError {
    #[error("Unknown parser '{0}'")]
    UnknownParser(String),

    #[error("Regex compilation failed for pattern '{pattern}' (name: {name}): {source}")]
    CompilationFailed {
        pattern: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Missing option for parser {parser}: {option}")]
    MissingOption {
        parser: &'static str,
        option: &'static str,
    },

    #[error("Invalid option for parser {parser}: {details}")]
    InvalidOption {
        parser: &'static str,
        details: String,
    },

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ParserConfigError {
    pub fn compilation(pattern: &str, name: &str, source: regex::Error) -> Self {
        ParserConfigError::CompilationFailed {
            pattern: pattern.to_string(),
            name: name.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_compilation_failed_message() {
        let invalid_pattern = r#"[invalid regex pattern"#;
        let Err(source) = Regex::new(invalid_pattern) else {
            panic!("pattern should not compile");
        };
        let err = ParserConfigError::compilation(invalid_pattern, "regex.line_regex", source);
        let message = err.to_string();
        assert!(message.contains("regex.line_regex"));
        assert!(message.contains(invalid_pattern));
    }

    #[test]
    fn test_unknown_parser_message() {
        let err = ParserConfigError::UnknownParser("syslog".into());
        assert_eq!(err.to_string(), "Unknown parser 'syslog'");
    }
}
