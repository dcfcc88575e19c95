//! Load: config loading from file and environment variables.

use std::path::Path;

use super::model::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};

const DEFAULT_CONFIG_FILE: &str = "/etc/klog/service.toml";

impl ServiceConfig {
    /// Load configuration.
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> ServiceResult<Self> {
        let config_path = std::env::var("KLOG_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using defaults", config_path);
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Environment variables override file values for the operational settings
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("KLOG_CACHE_DIR") {
            self.cache_dir = dir;
        }
        if let Some(days) = env_parse("KLOG_RETENTION_DAYS") {
            self.retention_days = days;
        }
        if let Some(max) = env_parse("KLOG_MAX_INPUT_BYTES") {
            self.max_input_bytes = max;
        }
        if let Ok(level) = std::env::var("KLOG_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }
        if self.min_input_bytes > self.max_input_bytes {
            return Err(format!(
                "min_input_bytes ({}) must not exceed max_input_bytes ({})",
                self.min_input_bytes, self.max_input_bytes
            ));
        }
        if self.retention_days == 0 {
            return Err("retention_days must be > 0".to_string());
        }
        self.capacity.validate()?;
        Ok(())
    }

    /// `validate()` as a service error
    pub fn validated(self) -> ServiceResult<Self> {
        self.validate().map_err(ServiceError::Config)?;
        Ok(self)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_dir = \"/srv/klog\"\nretention_days = 30").unwrap();
        let cfg = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.cache_dir, "/srv/klog");
        assert_eq!(cfg.retention_days, 30);
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retention_days = \"soon\"").unwrap();
        let err = ServiceConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn test_validate_default_passes() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let cfg = ServiceConfig {
            min_input_bytes: 10,
            max_input_bytes: 5,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("min_input_bytes"), "Error should mention min_input_bytes: {}", err);
    }

    #[test]
    fn test_validate_checks_capacity() {
        let mut cfg = ServiceConfig::default();
        cfg.capacity.max_bandwidth = 0.0;
        assert!(cfg.validated().is_err());
    }
}
