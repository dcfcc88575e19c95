//! Bandwidth and load normalization.
//!
//! Turns the cumulative per-controller counters of an epoch into
//! percentage-of-capacity series. Counters restart when a controller
//! resets, so a decrease re-baselines that controller instead of
//! producing a negative delta.

use std::collections::BTreeMap;
use serde::Serialize;

use crate::config::CapacityModel;
use super::model::TelemetrySample;
use super::runoff::RunoffReport;
use super::BUFFER_TIME_KEY;

const RETRANSMIT: &str = "bytes_retransmit";
const WRITE: &str = "bytes_write";
const TASK_AVG: &str = "mcu_task_avg";
const TASK_STDDEV: &str = "mcu_task_stddev";

/// Utilization of one controller on one tick, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerLoad {
    pub bandwidth: f64,
    pub load: f64,
    pub host_buffer: f64,
    pub awake: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilizationRow {
    #[serde(rename = "date")]
    pub date_ms: i64,
    #[serde(rename = "sampletime")]
    pub offset: f64,
    pub controllers: BTreeMap<String, ControllerLoad>,
}

/// Last accepted reading of a controller.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    bytes: f64,
    offset: f64,
}

/// Counters of one controller on one tick; `None` unless all four are present.
struct Reading {
    bytes: f64,
    task_avg: f64,
    task_stddev: f64,
}

impl Reading {
    fn from_sample(sample: &TelemetrySample, controller: &str) -> Option<Self> {
        let key = |metric: &str| sample.get(&format!("{controller}:{metric}"));
        Some(Self {
            bytes: key(WRITE)? + key(RETRANSMIT)?,
            task_avg: key(TASK_AVG)?,
            task_stddev: key(TASK_STDDEV)?,
        })
    }
}

pub fn normalize(
    samples: &[TelemetrySample],
    runoff: &RunoffReport,
    model: &CapacityModel,
) -> Vec<UtilizationRow> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let epoch_start = first.offset;
    let controllers = controllers_of(samples);
    let mut baselines: BTreeMap<&str, Baseline> = BTreeMap::new();
    let mut rows = Vec::new();

    for (index, sample) in samples.iter().enumerate() {
        let mut loads = BTreeMap::new();

        for controller in &controllers {
            let Some(reading) = Reading::from_sample(sample, controller) else {
                continue;
            };

            let Some(baseline) = baselines.get(controller.as_str()).copied() else {
                baselines.insert(controller, Baseline { bytes: reading.bytes, offset: sample.offset });
                continue;
            };

            let elapsed = sample.offset - baseline.offset;
            if reading.bytes < baseline.bytes {
                tracing::debug!(controller = %controller, offset = sample.offset, "telemetry: counter reset, re-baselining");
                baselines.insert(controller, Baseline { bytes: reading.bytes, offset: sample.offset });
                continue;
            }
            if elapsed <= 0.0 {
                continue;
            }

            let load = if sample.offset - epoch_start < model.cold_start_secs {
                0.0
            } else {
                100.0 * (reading.task_avg + 3.0 * reading.task_stddev) / model.task_max
            };

            loads.insert(
                controller.clone(),
                ControllerLoad {
                    bandwidth: 100.0 * (reading.bytes - baseline.bytes) / (model.max_bandwidth * elapsed),
                    load,
                    host_buffer: host_buffer(sample, runoff.is_clean_reset(index), model),
                    awake: 100.0 * sample.awake(controller).unwrap_or(0.0) / model.stats_interval,
                },
            );
            baselines.insert(controller, Baseline { bytes: reading.bytes, offset: sample.offset });
        }

        if !loads.is_empty() {
            rows.push(UtilizationRow {
                date_ms: sample.date_ms,
                offset: sample.offset,
                controllers: loads,
            });
        }
    }

    rows
}

/// Every controller that ever reports `bytes_retransmit` in the epoch.
fn controllers_of(samples: &[TelemetrySample]) -> Vec<String> {
    let mut names: Vec<String> = samples
        .iter()
        .flat_map(|s| s.components_with(RETRANSMIT).map(str::to_string).collect::<Vec<_>>())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn host_buffer(sample: &TelemetrySample, clean_reset: bool, model: &CapacityModel) -> f64 {
    match sample.get(BUFFER_TIME_KEY) {
        Some(buffer) if buffer < model.max_buffer && !clean_reset => {
            100.0 * (model.max_buffer - buffer) / model.max_buffer
        }
        _ => 0.0,
    }
}
