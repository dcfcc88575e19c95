//! Model: ServiceConfig and related structs.

use engine::CapacityModel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding raw logs, companions and derived output
    pub cache_dir: String,
    pub min_input_bytes: u64,
    pub max_input_bytes: u64,
    /// Stored logs are reported as expiring this many days after upload
    pub retention_days: u32,
    pub logging: LoggingConfig,
    pub capacity: CapacityModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_dir: "/var/lib/klog".to_string(),
            min_input_bytes: 100,
            max_input_bytes: 100 * 1024 * 1024,
            retention_days: 7,
            logging: LoggingConfig::default(),
            capacity: CapacityModel::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "service=info,engine=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ─────────────────────────────────────────────────

    #[test]
    fn test_service_config_defaults() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.cache_dir, "/var/lib/klog");
        assert_eq!(cfg.min_input_bytes, 100);
        assert_eq!(cfg.max_input_bytes, 104_857_600);
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_capacity_defaults_match_engine() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.capacity, CapacityModel::default());
    }

    // ── Deserialization ──────────────────────────────────────────

    #[test]
    fn test_deserialize_partial_toml() {
        let toml_str = r#"
            cache_dir = "/tmp/klog"

            [logging]
            format = "json"

            [capacity]
            max_bandwidth = 50000.0
        "#;
        let cfg: ServiceConfig = toml::from_str(toml_str).expect("Should accept partial TOML");
        assert_eq!(cfg.cache_dir, "/tmp/klog");
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, "service=info,engine=info");
        assert_eq!(cfg.capacity.max_bandwidth, 50000.0);
        assert_eq!(cfg.capacity.max_buffer, 2.0);
        assert_eq!(cfg.retention_days, 7);
    }

    #[test]
    fn test_toml_round_trip() {
        let cfg = ServiceConfig::default();
        let toml_str = toml::to_string(&cfg).expect("Should serialize to TOML");
        let back: ServiceConfig = toml::from_str(&toml_str).expect("Should deserialize from TOML");
        assert_eq!(back.max_input_bytes, cfg.max_input_bytes);
        assert_eq!(back.capacity, cfg.capacity);
    }
}
