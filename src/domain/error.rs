use thiserror::Error;

/// Top-level error type for the event pipeline.
///
/// Only `Config` and `Backend` ever terminate the process; everything else is
/// absorbed by the stage that hit it and surfaced through the status counters.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Backend unreachable: {0}")]
    Backend(String),

    #[error("Pipeline task failed: {0}")]
    Task(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl PipelineError {
    /// Whether this error should stop the process with a nonzero exit code.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_) | PipelineError::Input(_) | PipelineError::Backend(_)
        )
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::Config("bad".into()).is_fatal());
        assert!(PipelineError::Backend("down".into()).is_fatal());
        assert!(!PipelineError::Task("panicked".into()).is_fatal());
        assert!(!PipelineError::Shutdown("late".into()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::Backend("connection refused".into());
        assert_eq!(err.to_string(), "Backend unreachable: connection refused");
    }
}
