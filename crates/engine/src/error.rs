use thiserror::Error;

/// Errors that abort a whole analytics pass.
///
/// Per-line problems (bad UTF-8, malformed numbers, unknown shapes) never
/// surface here; they are skipped and counted in [`crate::summary::model::ParseStats`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input carries a foreign vendor or archive signature.
    #[error("Unsupported log format at line {line}: {reason}")]
    UnsupportedFormat { line: usize, reason: String },

    #[error("I/O error while reading log: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, EngineError::UnsupportedFormat { .. })
    }
}
