//! Boot: logging init, config load, state creation.
//!
//! Logs go to stderr; stdout carries command output.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::conf::{LogFormat, LoggingConfig, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;

const DEFAULT_FILTER: &str = "service=info,engine=info";

/// Phase 1: thread-local subscriber so config loading can log.
pub fn init_logging_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

/// Phase 2: global subscriber honouring the configured level and format.
/// `RUST_LOG` still wins over the config level.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

/// Load and validate configuration. An explicit path replaces the
/// `KLOG_CONFIG_FILE` lookup; env overrides apply either way.
pub fn load_config(path: Option<&Path>) -> ServiceResult<ServiceConfig> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            let mut config = ServiceConfig::from_file(path)?;
            config.apply_env();
            config
        }
        None => ServiceConfig::load()?,
    };
    config.validated()
}

pub fn boot(config: ServiceConfig) -> ServiceResult<Arc<AppState>> {
    info!(
        cache_dir = %config.cache_dir,
        retention_days = config.retention_days,
        "Starting klog v{}",
        env!("CARGO_PKG_VERSION")
    );
    let state = AppState::new(config).map_err(|err| match err {
        ServiceError::Io(io) => ServiceError::Config(format!("cache directory unusable: {io}")),
        other => other,
    })?;
    info!("Initialized shared application state");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "retention_days = 3\n[capacity]\nmax_buffer = 2.5").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.capacity.max_buffer, 2.5);
    }

    #[test]
    fn test_boot_creates_cache_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = dir.path().join("nested/cache");
        let state = boot(ServiceConfig {
            cache_dir: cache.display().to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(cache.is_dir());
        assert_eq!(state.store.root(), cache.as_path());
    }
}
