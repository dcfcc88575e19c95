//! Capacity model used to turn raw controller counters into utilization.

use serde::{Deserialize, Serialize};

/// Fixed capacity model of a Klipper MCU link.
///
/// The defaults are the reference constants; the service may override them
/// from its `[capacity]` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityModel {
    /// Serial link capacity in bytes per second.
    pub max_bandwidth: f64,
    /// Host look-ahead buffer considered full, in seconds.
    pub max_buffer: f64,
    /// Per-tick MCU task time budget, in seconds.
    pub task_max: f64,
    /// Nominal interval between two `Stats` lines, in seconds.
    pub stats_interval: f64,
    /// Load values are zeroed for this many seconds after the epoch starts.
    pub cold_start_secs: f64,
    /// `buffer_time` below this value opens a runoff window.
    pub runoff_threshold: f64,
    /// Maximum gap between two samples merged into one runoff window.
    pub runoff_max_gap: f64,
}

impl Default for CapacityModel {
    fn default() -> Self {
        Self {
            max_bandwidth: 25_000.0,
            max_buffer: 2.0,
            task_max: 0.0025,
            stats_interval: 5.0,
            cold_start_secs: 15.0,
            runoff_threshold: 1.0,
            runoff_max_gap: 5.0,
        }
    }
}

impl CapacityModel {
    /// Validate capacity values (all divisors must be positive)
    pub fn validate(&self) -> Result<(), String> {
        if self.max_bandwidth <= 0.0 {
            return Err("capacity.max_bandwidth must be > 0".to_string());
        }
        if self.max_buffer <= 0.0 {
            return Err("capacity.max_buffer must be > 0".to_string());
        }
        if self.task_max <= 0.0 {
            return Err("capacity.task_max must be > 0".to_string());
        }
        if self.stats_interval <= 0.0 {
            return Err("capacity.stats_interval must be > 0".to_string());
        }
        if self.cold_start_secs < 0.0 || self.runoff_max_gap < 0.0 {
            return Err("capacity time windows must not be negative".to_string());
        }
        Ok(())
    }
}
