// Specific pedantic lints checked (not blanket allow):
#![warn(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod app;
pub mod buffer;
pub mod collector;
pub mod domain;
pub mod parser;
pub mod reliability;
pub mod sampler;
pub mod sender;
pub mod transform;

pub use app::{App, Config, RunHandle, start};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
