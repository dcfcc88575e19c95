//! Telemetry: `Stats` line parsing and per-epoch analytics.
//!
//! # Architecture
//!
//! - `model.rs`: samples and the epoch buffer
//! - `clock.rs`: absolute/monotonic time reconciliation
//! - `sample.rs`: the `Stats` line grammar and unit normalization
//! - `runoff.rs`: buffer-starvation windows (reverse + forward pass)
//! - `bandwidth.rs`: bandwidth/load/host-buffer utilization
//! - `frequency.rs`: MCU clock deviation series

pub mod model;
pub mod clock;
pub mod sample;
pub mod runoff;
pub mod bandwidth;
pub mod frequency;

use serde::Serialize;

use crate::config::CapacityModel;
use bandwidth::UtilizationRow;
use frequency::FrequencyRow;
use runoff::RunoffReport;

pub use model::{Epoch, TelemetrySample};

/// Metric suffixes that survive into emitted samples.
pub const METRIC_ALLOW_LIST: &[&str] = &[
    "date", "sampletime",
    "temp", "target", "pwm", "fan_speed",
    "freq", "adj",
    "cputime", "cpudelta", "sysload", "memavail",
    "buffer_time", "print_stall", "bytes_write", "bytes_retransmit",
    "mcu_task_avg", "mcu_task_stddev", "print_time",
];

/// Read for the normalizer but kept out of emitted samples.
pub const AWAKE_METRIC: &str = "mcu_awake";

pub const BUFFER_TIME_KEY: &str = "sysinfo:buffer_time";
pub const PRINT_STALL_KEY: &str = "sysinfo:print_stall";
pub const PRINT_TIME_KEY: &str = "sysinfo:print_time";
pub const CPUTIME_KEY: &str = "sysinfo:cputime";
pub const CPUDELTA_KEY: &str = "sysinfo:cpudelta";

/// Everything derived from one flushed epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    /// 0-based flush counter within the run
    pub index: usize,
    pub sample_count: usize,
    pub start_offset: f64,
    pub end_offset: f64,
    pub runoff: RunoffReport,
    pub utilization: Vec<UtilizationRow>,
    pub frequency: Vec<FrequencyRow>,
}

/// Run the analyzer, then the normalizer, over one epoch's samples.
pub fn analyze_epoch(index: usize, samples: &[TelemetrySample], model: &CapacityModel) -> EpochReport {
    let runoff = runoff::find_runoffs(samples, model);
    let utilization = bandwidth::normalize(samples, &runoff, model);
    let frequency = frequency::deviation_series(samples);

    tracing::debug!(
        epoch = index,
        samples = samples.len(),
        windows = runoff.windows.len(),
        stall_windows = runoff.stall_window_count(),
        rows = utilization.len(),
        "telemetry: epoch analyzed"
    );

    EpochReport {
        index,
        sample_count: samples.len(),
        start_offset: samples.first().map(|s| s.offset).unwrap_or_default(),
        end_offset: samples.last().map(|s| s.offset).unwrap_or_default(),
        runoff,
        utilization,
        frequency,
    }
}

/// Round to one decimal, ties to even.
pub(crate) fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Round to two decimals, ties to even.
pub(crate) fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_tenths_ties_to_even() {
        assert_eq!(round_tenths(0.25), 0.2);
        assert_eq!(round_tenths(0.75), 0.8);
        assert_eq!(round_tenths(12.36), 12.4);
        assert_eq!(round_tenths(10.04), 10.0);
    }

    #[test]
    fn test_analyze_empty_epoch() {
        let report = analyze_epoch(0, &[], &CapacityModel::default());
        assert_eq!(report.sample_count, 0);
        assert!(report.utilization.is_empty());
        assert!(report.runoff.windows.is_empty());
    }
}
