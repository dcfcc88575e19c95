//! One blocking analysis pass over a stored log.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use chrono::{DateTime, Utc};
use engine::{CapacityModel, PassthroughFormatter, RunSummary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::companion::{self, CompanionKind, CompanionReport};
use crate::error::ServiceResult;
use crate::sink::JsonLinesSink;
use crate::store::LogStore;

/// Everything persisted as `<digest>.summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub digest: String,
    pub summary: RunSummary,
    pub companions: CompanionReport,
    /// Number of lines in `<digest>.events.jsonl`
    pub events: usize,
    pub analyzed_at: DateTime<Utc>,
}

pub fn load_companions(store: &LogStore, digest: &str) -> ServiceResult<CompanionReport> {
    let mut report = CompanionReport::default();
    for kind in CompanionKind::ALL {
        let Some(text) = store.read_companion(digest, kind)? else {
            continue;
        };
        let lines = companion::filter(kind, &text);
        match kind {
            CompanionKind::Dmesg => report.dmesg = lines,
            CompanionKind::Moonraker => report.moonraker = lines,
            CompanionKind::Debug => report.debug = lines,
        }
    }
    Ok(report)
}

/// Classify `<digest>.log` and commit the event stream plus report.
///
/// Nothing is committed when the pass fails; the staged event file is removed.
pub fn run_analysis(store: &LogStore, digest: &str, model: CapacityModel) -> ServiceResult<AnalysisReport> {
    match pass(store, digest, model) {
        Ok(report) => {
            store.write_summary(digest, &report)?;
            info!(
                %digest,
                lines = report.summary.stats.lines,
                events = report.events,
                anomalies = report.summary.anomalies,
                "analysis: pass complete"
            );
            Ok(report)
        }
        Err(err) => {
            store.discard_events(digest);
            warn!(%digest, error = %err, "analysis: pass failed");
            Err(err)
        }
    }
}

fn pass(store: &LogStore, digest: &str, model: CapacityModel) -> ServiceResult<AnalysisReport> {
    let log = store.open_log(digest)?;
    let companions = load_companions(store, digest)?;

    let staging = File::create(store.events_staging(digest))?;
    let sink = JsonLinesSink::new(BufWriter::new(staging));

    let outcome = engine::analyze(
        BufReader::new(log),
        sink,
        &PassthroughFormatter,
        model,
        companions.critical_dmesg(),
    )?;
    let (_, events) = outcome.sink.finish()?;
    store.commit_events(digest)?;

    Ok(AnalysisReport {
        digest: digest.to_string(),
        summary: outcome.summary,
        companions,
        events,
        analyzed_at: Utc::now(),
    })
}
