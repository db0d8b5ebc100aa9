//! Domain layer for clicktail.
//!
//! Contains the canonical types shared across all modules:
//! - `RawLine`: one line of input text tagged with its source and ordinal
//! - `Event`: the pipeline's core data type, a typed field map plus a timestamp
//! - `SampleDecision` / `SampledEvent`: the sampler's verdict travelling with an event
//! - `PipelineError`: top-level error type

pub mod error;
pub mod event;
pub mod raw_line;
pub mod sample;

pub use error::PipelineError;
pub use event::{Event, FieldValue};
pub use raw_line::{RawLine, SourceId};
pub use sample::{SampleDecision, SampledEvent};
