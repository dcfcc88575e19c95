//! The line classifier.
//!
//! Consumes a `klippy.log` one line at a time and drives everything else:
//! block lifecycle, the sample parser, epoch flushing, clock anchoring and
//! the summary aggregator. Every observable step leaves as an [`Event`] on
//! the caller's [`EventSink`], in input order.

use std::io::BufRead;

use crate::config::CapacityModel;
use crate::context::{AnchorId, RunContext};
use crate::error::{EngineError, EngineResult};
use crate::summary::model::{
    ErrorRecord, JobBoundary, JobEdge, ParseStats, RestartEvent, RestartKind, RunSummary, VersionRecord,
};
use crate::summary::SummaryAggregator;
use crate::telemetry::clock::{format_asctime, parse_asctime, SampleClock};
use crate::telemetry::sample::{parse_stats_line, STATS_PREFIX};
use crate::telemetry::{analyze_epoch, Epoch};
use crate::traits::{BuildConfigFormatter, EventSink};
use super::block::{BlockKind, BlockState, OpenBlock};
use super::event::{Event, LineClass};
use super::pattern::{self, KLIPPY_MARKER};

/// Result of a complete pass.
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub summary: RunSummary,
    pub sink: S,
}

pub struct Classifier<'f, S, F: ?Sized> {
    sink: S,
    formatter: &'f F,
    model: CapacityModel,
    ctx: RunContext,
    blocks: BlockState,
    clock: SampleClock,
    epoch: Epoch,
    aggregator: SummaryAggregator,
    stats: ParseStats,
    build_config: String,
    line: usize,
}

impl<'f, S, F> Classifier<'f, S, F>
where
    S: EventSink,
    F: BuildConfigFormatter + ?Sized,
{
    pub fn new(sink: S, formatter: &'f F, model: CapacityModel) -> Self {
        Self {
            sink,
            formatter,
            model,
            ctx: RunContext::new(),
            blocks: BlockState::new(),
            clock: SampleClock::new(),
            epoch: Epoch::new(),
            aggregator: SummaryAggregator::new(),
            stats: ParseStats::default(),
            build_config: String::new(),
            line: 0,
        }
    }

    /// Classify one raw line (without or with its trailing line break).
    ///
    /// Only unsupported input is an error; everything else is absorbed and
    /// counted.
    pub fn process_line(&mut self, raw: &[u8]) -> EngineResult<()> {
        let index = self.line;
        self.line += 1;
        self.stats.lines += 1;

        let raw = trim_line_break(raw);
        if let Some(reason) = unsupported_marker(raw) {
            tracing::warn!(line = index, reason, "classify: unsupported input");
            return Err(EngineError::UnsupportedFormat {
                line: index,
                reason: reason.to_string(),
            });
        }

        let Ok(text) = std::str::from_utf8(raw) else {
            tracing::warn!(line = index, bytes = raw.len(), "classify: skipping non UTF-8 line");
            self.stats.skipped_lines += 1;
            return Ok(());
        };

        if text.is_empty() {
            self.stats.empty_lines += 1;
            return Ok(());
        }

        let text = self.restart_marker(index, text);
        self.continuation_failures(index, text);

        if text.starts_with(STATS_PREFIX) {
            self.sample(index, text);
        } else if !self.structural(index, text) && !self.tagged(index, text) {
            self.close_tagged(index);
            self.flush_points_and_default(index, text);
        }
        Ok(())
    }

    /// Close everything still open, flush the last epoch and build the summary.
    pub fn finish(mut self, dmesg: Vec<String>) -> RunOutcome<S> {
        let end = self.line;
        for block in self.blocks.close_all() {
            self.emit_close(block, end, false);
        }
        self.flush_epoch();

        tracing::info!(
            lines = self.stats.lines,
            samples = self.stats.samples,
            epochs = self.stats.epochs,
            skipped = self.stats.skipped_lines,
            "classify: run finished"
        );

        let summary = self.aggregator.finalize(self.stats, dmesg);
        RunOutcome {
            summary,
            sink: self.sink,
        }
    }

    // -----------------------------------------------------------------
    // Priority 1: restart markers
    // -----------------------------------------------------------------

    /// Force-close open blocks on a restart marker and count anomalies.
    ///
    /// Returns the text to classify further: the line itself, or the bare
    /// `Starting Klippy...` marker when the line was anomalous.
    fn restart_marker<'a>(&mut self, index: usize, text: &'a str) -> &'a str {
        if !pattern::is_restart_marker(text) {
            return text;
        }

        let closed = self.blocks.close_all();
        let forced = closed.len();
        for block in closed {
            self.emit_close(block, index, true);
        }

        let is_stats = text.starts_with(STATS_PREFIX);
        let anomalies = if forced > 0 {
            forced
        } else if is_stats || pattern::has_nul_before_marker(text) {
            1
        } else {
            0
        };

        if anomalies == 0 {
            return text;
        }

        tracing::warn!(line = index, anomalies, "classify: unexpected restart");
        for _ in 0..anomalies {
            self.emit(Event::Anomaly { line: index });
        }

        if !is_stats {
            let prefix = pattern::marker_prefix(text);
            if !prefix.is_empty() {
                self.append(index, prefix, LineClass::Plain);
            }
        }
        KLIPPY_MARKER
    }

    // -----------------------------------------------------------------
    // Priority 2: continuation failures
    // -----------------------------------------------------------------

    fn continuation_failures(&mut self, index: usize, text: &str) {
        if let Some(open) = self.blocks.tagged().copied() {
            if has_continuation(open.kind) && !pattern::continues(open.kind, text) {
                self.close_tagged(index);
            }
        }
        if let Some(open) = self.blocks.free_form().copied() {
            let spans = matches!(open.kind, BlockKind::FileNotFoundSpan | BlockKind::SerialPortSpan);
            if spans && !pattern::continues(open.kind, text) {
                if let Some(block) = self.blocks.close_free_form() {
                    self.emit_close(block, index, false);
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Priority 3: telemetry
    // -----------------------------------------------------------------

    fn sample(&mut self, index: usize, text: &str) {
        let Some(stats) = parse_stats_line(text) else {
            self.stats.rejected_samples += 1;
            tracing::debug!(line = index, "classify: Stats line without time");
            self.append(index, text, LineClass::Plain);
            return;
        };

        self.stats.malformed_values += stats.malformed;
        let sample = stats.into_sample(&mut self.clock, self.epoch.last());
        self.stats.samples += 1;
        self.epoch.push(sample.clone());
        self.emit(Event::SampleReady { line: index, sample });
    }

    // -----------------------------------------------------------------
    // Priority 4: structural blocks
    // -----------------------------------------------------------------

    fn structural(&mut self, index: usize, text: &str) -> bool {
        let exclusive = self.blocks.exclusive().map(|b| b.kind);
        let free_form = self.blocks.free_form().map(|b| b.kind);
        let tagged = self.blocks.tagged().map(|b| b.kind);

        if text == pattern::MESH_HEADER {
            self.open(BlockKind::MeshPoints, index, None);
        } else if tagged == Some(BlockKind::MeshPoints) && pattern::is_mesh_point(text) {
            self.append(index, text, LineClass::Plain);
        } else if text == pattern::BUILD_CONFIG_HEADER {
            self.build_config.clear();
            self.open(BlockKind::BuildConfig, index, None);
        } else if text == pattern::SECTION_FOOTER && exclusive == Some(BlockKind::BuildConfig) {
            self.close_exclusive(index);
            let raw = std::mem::take(&mut self.build_config);
            let formatted = self.formatter.format(&raw);
            self.emit(Event::BuildConfig { raw, formatted });
        } else if exclusive == Some(BlockKind::BuildConfig) {
            self.build_config.push_str(text);
            self.build_config.push('\n');
            self.append(index, text, LineClass::Plain);
        } else if text == pattern::CONFIG_HEADER {
            self.open(BlockKind::Config, index, None);
        } else if text == pattern::SECTION_FOOTER && exclusive == Some(BlockKind::Config) {
            self.close_exclusive(index);
        } else if exclusive == Some(BlockKind::Config) {
            self.append(index, text, LineClass::Plain);
        } else if let Some(kind) = self.error_span_entry(text, free_form) {
            let anchor = self.ctx.next_anchor();
            self.open(kind, index, Some(anchor));
            self.append(index, text, LineClass::Danger);
            self.error(anchor, text, Some(kind), index);
        } else if matches!(free_form, Some(BlockKind::FileNotFoundSpan | BlockKind::SerialPortSpan)) {
            self.append(index, text, LineClass::Danger);
        } else if text.starts_with("Traceback ") && free_form != Some(BlockKind::Traceback) {
            let anchor = self.ctx.next_anchor();
            self.open(BlockKind::Traceback, index, Some(anchor));
            self.append(index, text, LineClass::Danger);
        } else if free_form == Some(BlockKind::Traceback) && pattern::ends_traceback(text) {
            self.append(index, text, LineClass::Danger);
            if let Some(block) = self.blocks.close_free_form() {
                let anchor = block.anchor.or(self.ctx.current_anchor()).unwrap_or(AnchorId(0));
                self.emit_close(block, index, false);
                self.error(anchor, text, Some(BlockKind::Traceback), index);
            }
        } else if free_form == Some(BlockKind::Traceback) {
            self.append(index, text, LineClass::Danger);
        } else {
            return false;
        }
        true
    }

    fn error_span_entry(&self, text: &str, free_form: Option<BlockKind>) -> Option<BlockKind> {
        let busy = |kind: BlockKind| free_form == Some(kind) || free_form == Some(BlockKind::Traceback);
        if text.contains(pattern::FILE_NOT_FOUND) && !busy(BlockKind::FileNotFoundSpan) {
            Some(BlockKind::FileNotFoundSpan)
        } else if text.contains(pattern::SERIAL_PORT) && !busy(BlockKind::SerialPortSpan) {
            Some(BlockKind::SerialPortSpan)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------
    // Priority 5: tagged lines
    // -----------------------------------------------------------------

    fn tagged(&mut self, index: usize, text: &str) -> bool {
        let Some(kind) = pattern::tagged_kind(text) else {
            return false;
        };
        if self.blocks.tagged().map(|b| b.kind) != Some(kind) {
            self.open(kind, index, None);
        }
        self.append(index, text, LineClass::Plain);
        true
    }

    // -----------------------------------------------------------------
    // Priority 6 and 7: flush points, then plain classification
    // -----------------------------------------------------------------

    fn flush_points_and_default(&mut self, index: usize, text: &str) {
        if text.starts_with("Start printer") {
            self.start_printer(index, text);
        } else if text.contains("Log rollover at") {
            self.log_rollover(index, text);
        } else if text.starts_with("Loaded MCU") {
            self.flush_epoch();
            self.append(index, text, LineClass::Notice);
            match pattern::loaded_mcu(text) {
                Some((component, version)) => self.emit(Event::Version(VersionRecord { component, version })),
                None => tracing::debug!(line = index, "classify: unreadable Loaded MCU line"),
            }
        } else if text.starts_with("Virtual sdcard (") {
            let payload = pattern::sdcard_payload(text);
            self.inline(BlockKind::VirtualSdcardBuffer, index, payload.as_deref().unwrap_or(text));
        } else if text.starts_with("Upcoming (") {
            let payload = pattern::sdcard_payload(text);
            self.inline(BlockKind::VirtualSdcardUpcoming, index, payload.as_deref().unwrap_or(text));
        } else if text.contains("at shutdown time") {
            self.append(index, text.trim_end(), LineClass::Plain);
            let time = pattern::shutdown_print_time(text)
                .and_then(|pt| self.clock.wall_time_at_print_time(pt));
            if let Some(time) = time {
                self.emit(Event::ShutdownTime {
                    line: index,
                    time: format_asctime(&time),
                });
            }
        } else if text.starts_with("Exiting SD card") {
            self.flush_epoch();
            self.append(index, text, LineClass::Notice);
            self.restart(RestartKind::SdCardEnd, text.to_string(), index);
            let job = self.ctx.current_job();
            self.emit(Event::JobBoundary(JobBoundary {
                edge: JobEdge::End,
                label: text.to_string(),
                index: job,
                line: index,
            }));
        } else if text.starts_with("Starting SD card") {
            let label = self
                .epoch
                .last()
                .and_then(|s| chrono::DateTime::from_timestamp_millis(s.date_ms))
                .map(|t| format_asctime(&t))
                .unwrap_or_default();
            self.flush_epoch();
            self.append(index, text, LineClass::Notice);
            self.restart(RestartKind::SdCardStart, label.clone(), index);
            self.job_start(label, index);
        } else if text.starts_with("Finished SD card print") {
            self.append(index, text, LineClass::Success);
        } else if text.starts_with(pattern::RESTART_MARKER) {
            self.flush_epoch();
            self.append(index, text, LineClass::Notice);
        } else if text.starts_with("Attempting MCU") || text.ends_with("Starting serial connect") {
            self.append(index, text, LineClass::Notice);
        } else if text.starts_with("Git version") {
            self.append(index, text, LineClass::Notice);
            if let Some(version) = pattern::git_version(text) {
                self.emit(Event::Version(VersionRecord {
                    component: crate::summary::version::REFERENCE_COMPONENT.to_string(),
                    version,
                }));
            }
            self.open(BlockKind::GitInfo, index, None);
        } else if text.starts_with("Tracked URL: ") {
            self.append(index, text.trim_end(), LineClass::Plain);
            if self.blocks.free_form().map(|b| b.kind) == Some(BlockKind::GitInfo) {
                if let Some(block) = self.blocks.close_free_form() {
                    self.emit_close(block, index, false);
                }
            }
        } else if text.starts_with("Python:") || text.starts_with("CPU:") {
            self.append(index, text, LineClass::Info);
        } else if text.starts_with("Timeout with MCU") {
            let time = pattern::event_time(text)
                .and_then(|t| self.clock.wall_time_at(t))
                .map(|t| format_asctime(&t))
                .unwrap_or_default();
            let message = format!("{} ({time})", text.trim());
            self.danger(index, &message);
        } else if pattern::is_danger(text) {
            self.danger(index, text);
        } else if text.starts_with("Starting Klippy") {
            self.flush_epoch();
            self.append(index, text, LineClass::Success);
        } else if text.ends_with(KLIPPY_MARKER) {
            self.flush_epoch();
            self.append(index, KLIPPY_MARKER, LineClass::Success);
        } else if text.starts_with("Args: [") {
            match pattern::parse_args(text) {
                Some(args) => self.inline(BlockKind::ArgsSpan, index, &args.join(" ")),
                None => self.append(index, text, LineClass::Plain),
            }
        } else if !text.trim().is_empty() {
            self.append(index, text.trim_end(), LineClass::Plain);
        }
    }

    /// `Start printer at Sat Jan 13 20:03:26 2024 (1705176206.1 30.4)`
    fn start_printer(&mut self, index: usize, text: &str) {
        self.flush_epoch();

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let epoch_secs = tokens
            .get(8)
            .and_then(|t| t.strip_prefix('('))
            .and_then(|t| t.parse::<f64>().ok());
        let monotonic = tokens
            .last()
            .and_then(|t| t.strip_suffix(')'))
            .and_then(|t| t.parse::<f64>().ok());
        let wall = tokens.get(3..8).and_then(parse_asctime);

        match (epoch_secs, monotonic) {
            (Some(epoch_secs), Some(monotonic)) => self.clock.anchor_start(epoch_secs, monotonic, wall),
            _ => tracing::warn!(line = index, "classify: Start printer line without clock values"),
        }

        let label = tokens
            .get(3..tokens.len().saturating_sub(2))
            .map(|t| t.join(" "))
            .unwrap_or_default();
        tracing::info!(line = index, label = %label, "classify: printer start");
        self.append(index, text, LineClass::Success);
        self.restart(RestartKind::KlippyStart, label, index);
    }

    /// `=== Log rollover at Sat Jan 13 20:03:26 2024 ===`
    fn log_rollover(&mut self, index: usize, text: &str) {
        self.flush_epoch();

        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.get(4..9).and_then(parse_asctime) {
            Some(wall) => self.clock.anchor_rollover(wall),
            None => tracing::warn!(line = index, "classify: Log rollover line without date"),
        }

        let label = tokens
            .get(4..tokens.len().saturating_sub(1))
            .map(|t| t.join(" "))
            .unwrap_or_default();
        tracing::info!(line = index, label = %label, "classify: log rollover");
        let shown = tokens.get(1..tokens.len().saturating_sub(1)).map(|t| t.join(" ")).unwrap_or_default();
        self.append(index, &shown, LineClass::Success);
        self.restart(RestartKind::LogRollover, label.clone(), index);
        self.job_start(label, index);
    }

    // -----------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------

    fn emit(&mut self, event: Event) {
        self.aggregator.observe(&event);
        self.sink.emit(event);
    }

    /// Block a new line belongs to. Error spans capture their lines even
    /// while a tagged block is open next to them; git info only gets what
    /// no tagged block claims.
    fn current_block(&self) -> Option<OpenBlock> {
        let capturing = self.blocks.free_form().filter(|b| b.kind != BlockKind::GitInfo);
        self.blocks
            .exclusive()
            .or(capturing)
            .or(self.blocks.tagged())
            .or(self.blocks.free_form())
            .copied()
    }

    fn append(&mut self, index: usize, text: &str, class: LineClass) {
        let block = self.current_block();
        self.emit(Event::LineAppended {
            block: block.map(|b| b.id),
            kind: block.map(|b| b.kind),
            line: index,
            text: text.to_string(),
            class,
        });
    }

    fn open(&mut self, kind: BlockKind, index: usize, anchor: Option<AnchorId>) {
        let block = OpenBlock {
            kind,
            id: self.ctx.next_block(),
            opened_at: index,
            anchor,
        };
        for displaced in self.blocks.open(block) {
            self.emit_close(displaced, index, false);
        }
        self.stats.blocks += 1;
        tracing::debug!(line = index, kind = ?kind, id = %block.id, "classify: block opened");
        self.emit(Event::BlockOpened {
            kind,
            id: block.id,
            line: index,
        });
    }

    fn emit_close(&mut self, block: OpenBlock, index: usize, anomalous: bool) {
        tracing::debug!(
            line = index,
            kind = ?block.kind,
            id = %block.id,
            opened_at = block.opened_at,
            anomalous,
            "classify: block closed"
        );
        self.emit(Event::BlockClosed {
            kind: block.kind,
            id: block.id,
            line: index,
            anomalous,
        });
    }

    fn close_tagged(&mut self, index: usize) {
        if let Some(block) = self.blocks.close_tagged() {
            self.emit_close(block, index, false);
        }
    }

    fn close_exclusive(&mut self, index: usize) {
        if let Some(block) = self.blocks.close_exclusive() {
            self.emit_close(block, index, false);
        }
    }

    /// Single-line block: open, one line, close.
    fn inline(&mut self, kind: BlockKind, index: usize, text: &str) {
        let id = self.ctx.next_block();
        self.stats.blocks += 1;
        self.emit(Event::BlockOpened { kind, id, line: index });
        self.emit(Event::LineAppended {
            block: Some(id),
            kind: Some(kind),
            line: index,
            text: text.to_string(),
            class: LineClass::Plain,
        });
        self.emit(Event::BlockClosed {
            kind,
            id,
            line: index,
            anomalous: false,
        });
    }

    fn error(&mut self, anchor: AnchorId, text: &str, origin: Option<BlockKind>, index: usize) {
        self.emit(Event::Error(ErrorRecord {
            anchor,
            text: text.trim().to_string(),
            origin,
            line: index,
        }));
    }

    fn danger(&mut self, index: usize, text: &str) {
        let anchor = self.ctx.next_anchor();
        self.append(index, text, LineClass::Danger);
        self.error(anchor, text, None, index);
    }

    fn restart(&mut self, kind: RestartKind, label: String, index: usize) {
        let restart = RestartEvent {
            kind,
            label,
            index: self.ctx.next_restart(kind),
            line: index,
        };
        self.emit(Event::Restart(restart));
    }

    fn job_start(&mut self, label: String, index: usize) {
        let job = self.ctx.next_job();
        self.emit(Event::JobBoundary(JobBoundary {
            edge: JobEdge::Start,
            label,
            index: Some(job),
            line: index,
        }));
    }

    fn flush_epoch(&mut self) {
        if let Some((epoch, samples)) = self.epoch.take() {
            let report = analyze_epoch(epoch, &samples, &self.model);
            self.stats.epochs += 1;
            self.emit(Event::EpochFlushed(report));
        }
    }
}

fn has_continuation(kind: BlockKind) -> bool {
    matches!(
        kind,
        BlockKind::Receive
            | BlockKind::McuReceive
            | BlockKind::AutotuneTrace
            | BlockKind::Webhooks
            | BlockKind::PrintCommentStats
    )
}

fn trim_line_break(mut raw: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = raw {
        raw = rest;
    }
    raw
}

/// Inputs that are not a klippy.log at all.
fn unsupported_marker(raw: &[u8]) -> Option<&'static str> {
    let contains = |needle: &[u8]| raw.windows(needle.len()).any(|w| w == needle);
    if contains(b".crealityprint") {
        Some("Creality Sonic Pad archive")
    } else if contains(b"ustar\0") || contains(b"ustar  \0") {
        Some("tar archive")
    } else {
        None
    }
}

/// Classify a whole log.
///
/// `dmesg` carries the critical kernel lines already picked out by the
/// caller; they are copied into the summary unchanged.
pub fn analyze<R, S, F>(
    reader: R,
    sink: S,
    formatter: &F,
    model: CapacityModel,
    dmesg: Vec<String>,
) -> EngineResult<RunOutcome<S>>
where
    R: BufRead,
    S: EventSink,
    F: BuildConfigFormatter + ?Sized,
{
    let mut classifier = Classifier::new(sink, formatter, model);
    for line in reader.split(b'\n') {
        classifier.process_line(&line?)?;
    }
    Ok(classifier.finish(dmesg))
}
