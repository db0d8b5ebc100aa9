use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a line came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    Stdin,
    File(Arc<PathBuf>),
}

impl SourceId {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SourceId::File(Arc::new(path.into()))
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, SourceId::Stdin)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Stdin => f.write_str("-"),
            SourceId::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One unit of input text. Never mutated after the tail reader produces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    source: SourceId,
    seq: u64,
    text: String,
}

impl RawLine {
    pub fn new(source: SourceId, seq: u64, text: impl Into<String>) -> Self {
        Self {
            source,
            seq,
            text: text.into(),
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Ordinal of this line within its source, starting at 1.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_display() {
        assert_eq!(SourceId::Stdin.to_string(), "-");
        assert_eq!(
            SourceId::file("/var/log/nginx/access.log").to_string(),
            "/var/log/nginx/access.log"
        );
    }

    #[test]
    fn test_raw_line_accessors() {
        let line = RawLine::new(SourceId::Stdin, 3, "a=1");
        assert_eq!(line.seq(), 3);
        assert_eq!(line.text(), "a=1");
        assert!(line.source().is_stdin());
    }
}
