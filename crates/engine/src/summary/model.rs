use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::classify::block::BlockKind;
use crate::context::{AnchorId, BlockId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartKind {
    KlippyStart,
    LogRollover,
    SdCardStart,
    SdCardEnd,
}

impl RestartKind {
    /// Kinds that end up in the summary's restart list
    pub fn is_restart(self) -> bool {
        matches!(self, RestartKind::KlippyStart | RestartKind::LogRollover)
    }

    /// Kinds that begin a new session: errors and captured config are dropped
    pub fn starts_session(self) -> bool {
        self.is_restart()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartEvent {
    pub kind: RestartKind,
    pub label: String,
    /// Monotonic per kind, 0-based
    pub index: usize,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEdge {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobBoundary {
    pub edge: JobEdge,
    pub label: String,
    /// Job this boundary belongs to; `None` for an end with no job started
    pub index: Option<usize>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub anchor: AnchorId,
    pub text: String,
    /// Block the error was found in, `None` for standalone danger lines
    pub origin: Option<BlockKind>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub component: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLintFinding {
    /// The Config block the finding points into
    pub anchor: BlockId,
    pub text: String,
}

/// Line-level counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub lines: usize,
    pub empty_lines: usize,
    /// Lines skipped because they were not valid UTF-8
    pub skipped_lines: usize,
    pub samples: usize,
    /// `Stats` lines without a usable time token
    pub rejected_samples: usize,
    /// Individual `key=value` pairs dropped from otherwise valid samples
    pub malformed_values: usize,
    pub blocks: usize,
    pub epochs: usize,
}

/// End-of-run summary record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unexpected restarts (blocks cut off by a restart marker)
    pub anomalies: usize,
    pub restarts: Vec<RestartEvent>,
    pub jobs: Vec<JobBoundary>,
    /// Errors of the latest session only
    pub errors: Vec<ErrorRecord>,
    /// Lint findings over the latest session's config
    pub config_findings: Vec<ConfigLintFinding>,
    /// Config block the findings point into
    pub config_block: Option<BlockId>,
    pub versions: BTreeMap<String, String>,
    pub versions_consistent: bool,
    pub dmesg: Vec<String>,
    pub stats: ParseStats,
}
