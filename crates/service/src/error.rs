use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    #[error("Log too small: {size} bytes (minimum {min})")]
    InputTooSmall { size: u64, min: u64 },

    #[error("Log too large: {size} bytes (maximum {max})")]
    InputTooLarge { size: u64, max: u64 },

    #[error("No stored log with digest {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Input the engine refused to analyze
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ServiceError::Engine(e) if e.is_unsupported())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_passthrough() {
        let err: ServiceError = engine::EngineError::UnsupportedFormat {
            line: 3,
            reason: "tar archive".into(),
        }
        .into();
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "Unsupported log format at line 3: tar archive");
    }

    #[test]
    fn test_size_messages() {
        let err = ServiceError::InputTooSmall { size: 10, min: 100 };
        assert_eq!(err.to_string(), "Log too small: 10 bytes (minimum 100)");
        assert!(!err.is_unsupported());
    }
}
