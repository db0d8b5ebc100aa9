use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Downstream channel closed: {0}")]
    Closed(&'static str),
}
