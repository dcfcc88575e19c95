//! Buffer runoff detection.
//!
//! A runoff window is a stretch where the host's look-ahead buffer ran
//! (nearly) dry. Windows are built walking the epoch backwards; a second,
//! forward pass marks the ones where the MCU `print_stall` counter went
//! down, which is the signal of a real firmware stall. The remaining
//! windows are "clean resets": benign idle gaps whose ticks the
//! normalizer must not report as host-buffer starvation.

use std::collections::BTreeSet;
use serde::Serialize;

use crate::config::CapacityModel;
use super::model::TelemetrySample;
use super::{BUFFER_TIME_KEY, PRINT_STALL_KEY};

#[derive(Debug, Clone, Serialize)]
pub struct RunoffWindow {
    /// Sample indices in the window, ascending
    pub indices: Vec<usize>,
    /// Sample offsets in the window, ascending
    pub offsets: Vec<f64>,
    pub stall: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunoffReport {
    pub windows: Vec<RunoffWindow>,
    /// Offsets of every sample inside a non-stall window, ascending
    pub clean_resets: Vec<f64>,
    #[serde(skip)]
    clean_indices: BTreeSet<usize>,
}

impl RunoffReport {
    pub fn is_clean_reset(&self, index: usize) -> bool {
        self.clean_indices.contains(&index)
    }

    pub fn stall_window_count(&self) -> usize {
        self.windows.iter().filter(|w| w.stall).count()
    }
}

pub fn find_runoffs(samples: &[TelemetrySample], model: &CapacityModel) -> RunoffReport {
    let mut windows = collect_windows(samples, model);
    let drops = stall_drops(samples);

    for window in &mut windows {
        window.stall = window.indices.iter().any(|&i| drops[i]);
    }

    let clean_indices: BTreeSet<usize> = windows
        .iter()
        .filter(|w| !w.stall)
        .flat_map(|w| w.indices.iter().copied())
        .collect();
    let clean_resets = clean_indices.iter().map(|&i| samples[i].offset).collect();

    RunoffReport {
        windows,
        clean_resets,
        clean_indices,
    }
}

/// Reverse pass: group starving samples into windows.
///
/// Walking backwards, a sample below the threshold opens a window; earlier
/// samples keep joining it while they are closer than the gap limit and
/// hold more buffer than the sample after them (the buffer was draining
/// into the window).
fn collect_windows(samples: &[TelemetrySample], model: &CapacityModel) -> Vec<RunoffWindow> {
    let mut windows: Vec<RunoffWindow> = Vec::new();
    let mut open: Option<usize> = None;
    let mut later: Option<(f64, f64)> = None;

    for (index, sample) in samples.iter().enumerate().rev() {
        let Some(buffer) = sample.get(BUFFER_TIME_KEY) else {
            open = None;
            later = None;
            continue;
        };

        let extends = match (open, later) {
            (Some(_), Some((later_offset, later_buffer))) => {
                later_offset - sample.offset < model.runoff_max_gap && buffer > later_buffer
            }
            _ => false,
        };

        if let (true, Some(w)) = (extends, open) {
            windows[w].indices.push(index);
        } else if buffer < model.runoff_threshold {
            windows.push(RunoffWindow {
                indices: vec![index],
                offsets: Vec::new(),
                stall: false,
            });
            open = Some(windows.len() - 1);
        } else {
            open = None;
        }

        later = Some((sample.offset, buffer));
    }

    windows.reverse();
    for window in &mut windows {
        window.indices.reverse();
        window.offsets = window.indices.iter().map(|&i| samples[i].offset).collect();
    }
    windows
}

/// Forward pass: `drops[i]` is true when sample `i` reports a lower
/// `print_stall` than the last sample before it that reported one.
fn stall_drops(samples: &[TelemetrySample]) -> Vec<bool> {
    let mut last: Option<f64> = None;
    samples
        .iter()
        .map(|sample| match sample.get(PRINT_STALL_KEY) {
            Some(stall) => {
                let stall = stall.trunc();
                let dropped = last.is_some_and(|prev| stall < prev);
                last = Some(stall);
                dropped
            }
            None => false,
        })
        .collect()
}

#[cfg(test)]
impl RunoffReport {
    fn contains_offset(&self, offset: f64) -> bool {
        self.clean_resets.iter().any(|t| *t == offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(offset: f64, buffer: f64, stall: f64) -> TelemetrySample {
        let mut s = TelemetrySample::new(offset, (offset * 1000.0) as i64);
        s.insert(BUFFER_TIME_KEY, buffer);
        s.insert(PRINT_STALL_KEY, stall);
        s
    }

    fn run(samples: &[TelemetrySample]) -> RunoffReport {
        find_runoffs(samples, &CapacityModel::default())
    }

    #[test]
    fn test_healthy_epoch_has_no_windows() {
        let samples: Vec<_> = (0..5).map(|i| tick(i as f64, 1.8, 0.0)).collect();
        let report = run(&samples);
        assert!(report.windows.is_empty());
        assert!(report.clean_resets.is_empty());
    }

    #[test]
    fn test_idle_dip_without_stall_is_clean_reset() {
        let samples = vec![
            tick(0.0, 1.9, 3.0),
            tick(1.0, 1.8, 3.0),
            tick(2.0, 0.6, 3.0),
            tick(3.0, 0.4, 3.0),
            tick(4.0, 0.2, 3.0),
            tick(5.0, 1.9, 3.0),
        ];
        let report = run(&samples);

        assert_eq!(report.stall_window_count(), 0);
        for offset in [2.0, 3.0, 4.0] {
            assert!(report.contains_offset(offset), "offset {offset} should be a clean reset");
        }
        assert!(!report.contains_offset(5.0));
        assert!(report.is_clean_reset(4));
    }

    #[test]
    fn test_stall_counter_drop_marks_window() {
        let samples = vec![
            tick(0.0, 1.9, 5.0),
            tick(1.0, 0.8, 5.0),
            tick(2.0, 0.5, 4.0),
            tick(3.0, 0.3, 4.0),
            tick(4.0, 1.9, 4.0),
        ];
        let report = run(&samples);

        assert_eq!(report.stall_window_count(), 1);
        assert!(!report.contains_offset(2.0));
        assert!(!report.contains_offset(3.0));
        assert!(report.clean_resets.is_empty());
    }

    #[test]
    fn test_large_gap_splits_windows() {
        let samples = vec![
            tick(0.0, 0.9, 0.0),
            tick(10.0, 0.5, 0.0),
        ];
        let report = run(&samples);
        assert_eq!(report.windows.len(), 2);
        assert_eq!(report.windows[0].offsets, vec![0.0]);
        assert_eq!(report.windows[1].offsets, vec![10.0]);
    }

    #[test]
    fn test_missing_buffer_time_is_healthy() {
        let mut plain = TelemetrySample::new(1.0, 1000);
        plain.insert("mcu:bytes_write", 10.0);
        let samples = vec![tick(0.0, 0.2, 0.0), plain];
        let report = run(&samples);
        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].indices, vec![0]);
    }

    #[test]
    fn test_windows_are_chronological() {
        let samples = vec![
            tick(0.0, 0.5, 0.0),
            tick(1.0, 1.5, 0.0),
            tick(2.0, 1.5, 0.0),
            tick(3.0, 0.5, 0.0),
        ];
        let report = run(&samples);
        let firsts: Vec<f64> = report.windows.iter().map(|w| w.offsets[0]).collect();
        assert_eq!(firsts, vec![0.0, 2.0]);
    }
}
