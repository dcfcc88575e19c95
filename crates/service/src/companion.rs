//! Companion files uploaded next to a klippy.log.
//!
//! Only a filtered view of each companion reaches the report: dmesg is cut
//! down to USB/serial/storage lines, moonraker to its unsafe-shutdown
//! counter, debug files pass through as-is.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanionKind {
    Dmesg,
    Moonraker,
    Debug,
}

impl CompanionKind {
    pub const ALL: [CompanionKind; 3] = [CompanionKind::Dmesg, CompanionKind::Moonraker, CompanionKind::Debug];

    /// File name suffix: `<digest>_<suffix>.log`
    pub fn suffix(self) -> &'static str {
        match self {
            CompanionKind::Dmesg => "dmesg",
            CompanionKind::Moonraker => "moonraker",
            CompanionKind::Debug => "debug",
        }
    }
}

/// dmesg lines worth showing at all.
const DMESG_KEYWORDS: &[&str] = &[
    "Kernel command line",
    "ttyS",
    "spi",
    "btltty",
    "cannot reset",
    "annot enable",
    "cannot disable",
    "disabled by hub",
    "status failed",
    "I/O error",
    "device disconnected",
    "now attached to",
    "device descriptor",
    "New USB device",
    ": Product:",
    ": Manufacturer:",
    ": SerialNumber:",
];

/// dmesg lines promoted into the run summary.
const DMESG_CRITICAL: &[&str] = &["disabled by hub", "I/O error"];

const UNSAFE_SHUTDOWN: &str = "Unsafe Shutdown Count";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanionReport {
    pub dmesg: Vec<String>,
    pub moonraker: Vec<String>,
    pub debug: Vec<String>,
}

impl CompanionReport {
    /// Kernel lines that go into the engine summary
    pub fn critical_dmesg(&self) -> Vec<String> {
        self.dmesg
            .iter()
            .filter(|line| DMESG_CRITICAL.iter().any(|k| line.contains(k)))
            .cloned()
            .collect()
    }
}

pub fn filter_dmesg(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| DMESG_KEYWORDS.iter().any(|k| line.contains(k)))
        .map(str::to_string)
        .collect()
}

/// Last reported `Unsafe Shutdown Count`, as a single report line.
pub fn filter_moonraker(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| line.contains(UNSAFE_SHUTDOWN))
        .filter_map(|line| line.split_whitespace().last())
        .last()
        .map(|count| vec![format!("{UNSAFE_SHUTDOWN}: {count}")])
        .unwrap_or_default()
}

pub fn filter_debug(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

pub fn filter(kind: CompanionKind, text: &str) -> Vec<String> {
    match kind {
        CompanionKind::Dmesg => filter_dmesg(text),
        CompanionKind::Moonraker => filter_moonraker(text),
        CompanionKind::Debug => filter_debug(text),
    }
}
