use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// One parsed `Stats` tick.
///
/// Serializes flat, the way chart consumers expect it:
/// `{"sampletime": 12.5, "date": 1705176218600, "mcu:bytes_write": 1234.0, ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Seconds since the current clock origin, rounded to 0.1
    #[serde(rename = "sampletime")]
    pub offset: f64,

    /// Absolute wall-clock time in milliseconds
    #[serde(rename = "date")]
    pub date_ms: i64,

    /// `"<component>:<metric>"` → normalized value
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,

    /// Per-controller `mcu_awake` seconds; feeds the normalizer only
    #[serde(skip)]
    pub awake: BTreeMap<String, f64>,
}

impl TelemetrySample {
    pub fn new(offset: f64, date_ms: i64) -> Self {
        Self {
            offset,
            date_ms,
            values: BTreeMap::new(),
            awake: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn awake(&self, controller: &str) -> Option<f64> {
        self.awake.get(controller).copied()
    }

    pub fn set_awake(&mut self, controller: impl Into<String>, seconds: f64) {
        self.awake.insert(controller.into(), seconds);
    }

    /// Component names that report the given metric (e.g. every `<x>:bytes_retransmit`).
    pub fn components_with(&self, metric: &str) -> impl Iterator<Item = &str> + '_ {
        let metric = metric.to_string();
        self.values.keys().filter_map(move |key| {
            key.rsplit_once(':')
                .filter(|(_, suffix)| *suffix == metric)
                .map(|(component, _)| component)
        })
    }
}

/// Samples buffered between two flush points.
#[derive(Debug, Default)]
pub struct Epoch {
    samples: Vec<TelemetrySample>,
    flushed: usize,
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        self.samples.push(sample);
    }

    pub fn last(&self) -> Option<&TelemetrySample> {
        self.samples.last()
    }

    /// Hand the buffered samples out and start a new epoch.
    ///
    /// Returns the epoch's index (number of previous non-empty flushes)
    /// together with the samples, or `None` when nothing was buffered.
    pub fn take(&mut self) -> Option<(usize, Vec<TelemetrySample>)> {
        if self.samples.is_empty() {
            return None;
        }
        let index = self.flushed;
        self.flushed += 1;
        Some((index, std::mem::take(&mut self.samples)))
    }
}
