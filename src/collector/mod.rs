//! Tail reader: turns source specifiers into per-source streams of
//! [`RawLine`](crate::domain::RawLine)s.

pub mod tail;

pub use tail::{TailConfig, tail_source};

use crate::domain::SourceId;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker for standard input in the source list.
pub const STDIN_MARKER: &str = "-";

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("No input matches '{0}'")]
    MissingInput(String),
    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where reading starts in a file that already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReadFrom {
    #[default]
    Beginning,
    End,
}

/// Expand file specifiers into concrete sources. `-` is standard input;
/// anything else is a path or glob that must match at least one file.
/// Duplicates are removed, keeping the first occurrence.
pub fn resolve_sources(specs: &[String]) -> Result<Vec<SourceId>, CollectorError> {
    let mut sources: Vec<SourceId> = Vec::new();

    for spec in specs {
        if spec == STDIN_MARKER {
            push_unique(&mut sources, SourceId::Stdin);
            continue;
        }

        let paths = glob::glob(spec).map_err(|source| CollectorError::Pattern {
            pattern: spec.clone(),
            source,
        })?;
        let mut matched = false;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    matched = true;
                    push_unique(&mut sources, SourceId::file(path));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(pattern = %spec, error = %e, "Unreadable glob match");
                }
            }
        }
        if !matched {
            return Err(CollectorError::MissingInput(spec.clone()));
        }
    }

    Ok(sources)
}

fn push_unique(sources: &mut Vec<SourceId>, source: SourceId) {
    if !sources.contains(&source) {
        sources.push(source);
    }
}
