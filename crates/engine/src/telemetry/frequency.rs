//! MCU clock frequency deviation.

use std::collections::BTreeMap;
use serde::Serialize;

use super::model::TelemetrySample;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    #[serde(rename = "date")]
    pub date_ms: i64,
    /// `"<component>:freq"` / `"<component>:adj"` → deviation in microseconds per second
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

fn is_frequency_key(key: &str) -> bool {
    key.ends_with(":freq") || key.ends_with(":adj")
}

/// Deviation of every `freq`/`adj` series from its estimated nominal MHz.
///
/// The nominal value is the series mean rounded to whole MHz; series that
/// round to 0 MHz carry no usable reference and are left out.
pub fn deviation_series(samples: &[TelemetrySample]) -> Vec<FrequencyRow> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        for (key, value) in sample.values.iter().filter(|(k, _)| is_frequency_key(k)) {
            let entry = sums.entry(key.as_str()).or_default();
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let nominal: BTreeMap<&str, f64> = sums
        .into_iter()
        .map(|(key, (sum, count))| (key, (sum / count as f64 / 1_000_000.0).round()))
        .filter(|(_, mhz)| *mhz > 0.0)
        .collect();

    if nominal.is_empty() {
        return Vec::new();
    }

    samples
        .iter()
        .filter_map(|sample| {
            let values: BTreeMap<String, f64> = nominal
                .iter()
                .filter_map(|(key, mhz)| {
                    sample
                        .get(key)
                        .map(|hz| (key.to_string(), (hz - mhz * 1_000_000.0) / mhz))
                })
                .collect();
            (!values.is_empty()).then(|| FrequencyRow {
                date_ms: sample.date_ms,
                values,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(date_ms: i64, freq: f64) -> TelemetrySample {
        let mut s = TelemetrySample::new(0.0, date_ms);
        s.insert("mcu:freq", freq);
        s.insert("mcu:bytes_write", 1.0);
        s
    }

    #[test]
    fn test_deviation_against_rounded_mean() {
        let rows = deviation_series(&[sample(1, 72_000_144.0), sample(2, 71_999_856.0)]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values["mcu:freq"], 2.0);
        assert_eq!(rows[1].values["mcu:freq"], -2.0);
        assert!(!rows[0].values.contains_key("mcu:bytes_write"));
    }

    #[test]
    fn test_no_frequency_keys() {
        let mut s = TelemetrySample::new(0.0, 0);
        s.insert("mcu:bytes_write", 1.0);
        assert!(deviation_series(&[s]).is_empty());
    }

    #[test]
    fn test_sub_mhz_series_skipped() {
        let mut s = TelemetrySample::new(0.0, 0);
        s.insert("host:adj", 12.0);
        assert!(deviation_series(&[s]).is_empty());
    }
}
