//! Event transform stage.
//!
//! Prefix extraction runs on the raw line before parsing (see
//! [`PrefixExtractor`]); everything else runs on the parsed event in a fixed
//! order: add fields, drop fields, request shaping, scrub fields.

pub mod fields;
pub mod prefix;
pub mod request_shape;
pub mod scrub;

pub use prefix::{PrefixExtractor, PrefixFields};
pub use request_shape::{QueryMode, QueryPolicy, RequestShaper};

use crate::domain::Event;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Invalid log prefix pattern '{pattern}': {source}")]
    InvalidPrefix {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid request pattern '{pattern}': {source}")]
    InvalidRequestPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid add_field '{0}': expected key=val")]
    InvalidAddField(String),
}

/// Settings for the post-parse steps.
#[derive(Debug, Clone, Default)]
pub struct TransformSettings {
    pub add_fields: Vec<String>,
    pub drop_fields: Vec<String>,
    pub scrub_fields: Vec<String>,
    pub request_shape: Vec<String>,
    pub shape_prefix: Option<String>,
    pub request_patterns: Vec<String>,
    pub query_mode: QueryMode,
    pub query_keys: Vec<String>,
}

/// Post-parse transforms, shared read-only by every source lineage.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    add: Vec<(String, String)>,
    drop: Vec<String>,
    scrub: Vec<String>,
    shaper: Option<RequestShaper>,
}

impl Transformer {
    pub fn new(settings: &TransformSettings) -> Result<Self, TransformError> {
        let shaper = if settings.request_shape.is_empty() {
            None
        } else {
            Some(RequestShaper::new(
                settings.request_shape.clone(),
                settings.shape_prefix.clone(),
                &settings.request_patterns,
                settings.query_mode.policy(&settings.query_keys),
            )?)
        };

        Ok(Self {
            add: fields::parse_add_fields(&settings.add_fields)?,
            drop: settings.drop_fields.clone(),
            scrub: settings.scrub_fields.clone(),
            shaper,
        })
    }

    /// Whether any step would touch an event.
    pub fn is_noop(&self) -> bool {
        self.add.is_empty() && self.drop.is_empty() && self.scrub.is_empty() && self.shaper.is_none()
    }

    pub fn apply(&self, event: &mut Event) {
        fields::add_fields(event, &self.add);
        fields::drop_fields(event, &self.drop);
        if let Some(shaper) = &self.shaper {
            shaper.apply(event);
        }
        scrub::scrub_fields(event, &self.scrub);
    }
}
