//! Folds the event stream into a [`RunSummary`].

use std::collections::BTreeMap;

use crate::classify::block::BlockKind;
use crate::classify::event::Event;
use crate::context::BlockId;
use super::lint::lint_config;
use super::model::{ErrorRecord, JobBoundary, JobEdge, ParseStats, RestartEvent, RunSummary};
use super::version::is_consistent;

/// Config dump captured from one `Config file` block.
#[derive(Debug, Default)]
struct CapturedConfig {
    block: Option<BlockId>,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SummaryAggregator {
    anomalies: usize,
    restarts: Vec<RestartEvent>,
    jobs: Vec<JobBoundary>,
    errors: Vec<ErrorRecord>,
    versions: BTreeMap<String, String>,
    /// Config block being read
    pending: Option<CapturedConfig>,
    /// Most recent closed config block of the current session
    config: CapturedConfig,
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::Anomaly { .. } => self.anomalies += 1,
            Event::Restart(restart) => {
                if restart.kind.starts_session() {
                    self.start_session();
                }
                if restart.kind.is_restart() {
                    self.restarts.push(restart.clone());
                }
            }
            Event::JobBoundary(job) if job.edge == JobEdge::Start => self.jobs.push(job.clone()),
            Event::Error(error) => self.errors.push(error.clone()),
            Event::Version(version) => {
                self.versions.insert(version.component.clone(), version.version.clone());
            }
            Event::BlockOpened { kind: BlockKind::Config, id, .. } => {
                self.pending = Some(CapturedConfig {
                    block: Some(*id),
                    lines: Vec::new(),
                });
            }
            Event::LineAppended { kind: Some(BlockKind::Config), text, .. } => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.lines.push(text.clone());
                }
            }
            Event::BlockClosed { kind: BlockKind::Config, .. } => {
                if let Some(done) = self.pending.take() {
                    self.config = done;
                }
            }
            _ => {}
        }
    }

    /// `Start printer` / `Log rollover`: errors and config describe the new
    /// session only. Restarts, jobs and versions carry over.
    fn start_session(&mut self) {
        self.errors.clear();
        self.config = CapturedConfig::default();
        self.pending = None;
    }

    pub fn finalize(self, stats: ParseStats, dmesg: Vec<String>) -> RunSummary {
        let config_findings = match self.config.block {
            Some(block) => lint_config(block, &self.config.lines),
            None => Vec::new(),
        };

        RunSummary {
            anomalies: self.anomalies,
            restarts: self.restarts,
            jobs: self.jobs,
            errors: self.errors,
            config_findings,
            config_block: self.config.block,
            versions_consistent: is_consistent(&self.versions),
            versions: self.versions,
            dmesg,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::event::LineClass;
    use crate::context::AnchorId;
    use crate::summary::model::{RestartKind, VersionRecord};

    fn restart(kind: RestartKind) -> Event {
        Event::Restart(RestartEvent {
            kind,
            label: String::new(),
            index: 0,
            line: 0,
        })
    }

    fn error(n: u32) -> Event {
        Event::Error(ErrorRecord {
            anchor: AnchorId(n),
            text: format!("error {n}"),
            origin: None,
            line: n as usize,
        })
    }

    fn config_block(agg: &mut SummaryAggregator, id: u32, lines: &[&str]) {
        agg.observe(&Event::BlockOpened { kind: BlockKind::Config, id: BlockId(id), line: 0 });
        for text in lines {
            agg.observe(&Event::LineAppended {
                block: Some(BlockId(id)),
                kind: Some(BlockKind::Config),
                line: 0,
                text: text.to_string(),
                class: LineClass::Plain,
            });
        }
        agg.observe(&Event::BlockClosed { kind: BlockKind::Config, id: BlockId(id), line: 0, anomalous: false });
    }

    #[test]
    fn test_session_start_clears_errors_only() {
        let mut agg = SummaryAggregator::new();
        agg.observe(&error(1));
        agg.observe(&Event::Version(VersionRecord { component: "mcu".into(), version: "v1".into() }));
        agg.observe(&restart(RestartKind::KlippyStart));
        agg.observe(&error(2));

        let summary = agg.finalize(ParseStats::default(), Vec::new());
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].anchor, AnchorId(2));
        assert_eq!(summary.versions["mcu"], "v1");
        assert_eq!(summary.restarts.len(), 1);
    }

    #[test]
    fn test_sd_card_events_are_not_restarts() {
        let mut agg = SummaryAggregator::new();
        agg.observe(&error(1));
        agg.observe(&restart(RestartKind::SdCardStart));
        agg.observe(&restart(RestartKind::SdCardEnd));
        let summary = agg.finalize(ParseStats::default(), Vec::new());
        assert!(summary.restarts.is_empty());
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn test_lint_uses_latest_closed_config() {
        let mut agg = SummaryAggregator::new();
        config_block(&mut agg, 1, &["[mcu]", "serial = /dev/ttyUSB0"]);
        config_block(&mut agg, 2, &["[mcu]", "serial = /dev/serial/by-id/x"]);
        let summary = agg.finalize(ParseStats::default(), Vec::new());
        assert!(summary.config_findings.is_empty());
        assert_eq!(summary.config_block, Some(BlockId(2)));
    }

    #[test]
    fn test_rollover_drops_captured_config() {
        let mut agg = SummaryAggregator::new();
        config_block(&mut agg, 1, &["[mcu]", "serial = /dev/ttyUSB0"]);
        agg.observe(&restart(RestartKind::LogRollover));
        let summary = agg.finalize(ParseStats::default(), Vec::new());
        assert!(summary.config_findings.is_empty());
        assert_eq!(summary.config_block, None);
    }

    #[test]
    fn test_anomalies_and_jobs_counted() {
        let mut agg = SummaryAggregator::new();
        agg.observe(&Event::Anomaly { line: 3 });
        agg.observe(&Event::Anomaly { line: 9 });
        agg.observe(&Event::JobBoundary(JobBoundary {
            edge: JobEdge::Start,
            label: "x".into(),
            index: Some(0),
            line: 4,
        }));
        agg.observe(&Event::JobBoundary(JobBoundary {
            edge: JobEdge::End,
            label: "x".into(),
            index: Some(0),
            line: 5,
        }));
        let summary = agg.finalize(ParseStats::default(), vec!["usb 1-1: disabled by hub".into()]);
        assert_eq!(summary.anomalies, 2);
        assert_eq!(summary.jobs.len(), 1);
        assert_eq!(summary.dmesg.len(), 1);
    }
}
