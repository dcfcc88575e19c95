use serde::Serialize;

use crate::context::BlockId;
use crate::summary::model::{ErrorRecord, JobBoundary, RestartEvent, VersionRecord};
use crate::telemetry::{EpochReport, TelemetrySample};
use super::block::BlockKind;

/// Rendering hint for a line outside of any structural meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    Plain,
    /// Host facts (`Python:`, `CPU:`)
    Info,
    /// Connection attempts, MCU loads, SD card exits
    Notice,
    /// Successful starts and finished prints
    Success,
    Danger,
}

/// One step of the classifier's output stream, in input order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    BlockOpened {
        kind: BlockKind,
        id: BlockId,
        line: usize,
    },
    LineAppended {
        /// Innermost open block the line belongs to
        block: Option<BlockId>,
        kind: Option<BlockKind>,
        line: usize,
        text: String,
        class: LineClass,
    },
    BlockClosed {
        kind: BlockKind,
        id: BlockId,
        line: usize,
        /// Cut off by a restart marker
        anomalous: bool,
    },
    SampleReady {
        line: usize,
        sample: TelemetrySample,
    },
    EpochFlushed(EpochReport),
    Restart(RestartEvent),
    JobBoundary(JobBoundary),
    Error(ErrorRecord),
    Version(VersionRecord),
    BuildConfig {
        raw: String,
        formatted: Vec<String>,
    },
    ShutdownTime {
        line: usize,
        time: String,
    },
    /// One unexpected restart
    Anomaly {
        line: usize,
    },
}

impl Event {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::BlockOpened { .. } => "block_opened",
            Event::LineAppended { .. } => "line_appended",
            Event::BlockClosed { .. } => "block_closed",
            Event::SampleReady { .. } => "sample_ready",
            Event::EpochFlushed(_) => "epoch_flushed",
            Event::Restart(_) => "restart",
            Event::JobBoundary(_) => "job_boundary",
            Event::Error(_) => "error",
            Event::Version(_) => "version",
            Event::BuildConfig { .. } => "build_config",
            Event::ShutdownTime { .. } => "shutdown_time",
            Event::Anomaly { .. } => "anomaly",
        }
    }
}
