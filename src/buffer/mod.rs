pub mod batch;
pub mod error;

pub use batch::{Batch, BatchConfig, BatchType, Batcher};
pub use error::BufferError;
