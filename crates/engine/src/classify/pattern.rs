//! Line predicates used by the classifier.
//!
//! Pure string helpers: entry/continuation tests for tagged blocks, restart
//! markers, danger lines and the few field extractors that pull values out of
//! well-known Klipper messages.

use super::block::BlockKind;

pub(crate) const KLIPPY_MARKER: &str = "Starting Klippy...";
pub(crate) const RESTART_MARKER: &str = "Restarting printer";

pub(crate) const MESH_HEADER: &str = "bed_mesh: generated points";
pub(crate) const BUILD_CONFIG_HEADER: &str = "========= Last MCU build config =========";
pub(crate) const CONFIG_HEADER: &str = "===== Config file =====";
pub(crate) const SECTION_FOOTER: &str = "=======================";

pub(crate) const FILE_NOT_FOUND: &str = "No such file or directory";
pub(crate) const SERIAL_PORT: &str = "Unable to open serial port";

const PRINT_COMMENT_KEYS: &[&str] = &[
    ";",
    "extruder:",
    "pressure_advance_smooth_time:",
    "toolhead:",
    "max_accel:",
    "max_accel_to_decel:",
    "square_corner_velocity:",
    "new minimum rtt",
    "Ignoring clock sample",
];

/// Danger lines recognised by prefix.
const DANGER_PREFIXES: &[&str] = &[
    "Move out of range",
    "Must home",
    "BLTouch failed",
    "Unable to parse",
    "Transition to shutdown state",
];

const DANGER_FRAGMENTS: &[&str] = &[
    "' shutdown: ",
    "Got EOF ",
    "Got error ",
    "Warning!)",
    "Error!)",
    "Shutdown!)",
];

pub(crate) fn starts_with_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.starts_with(n))
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

pub(crate) fn is_restart_marker(line: &str) -> bool {
    line.starts_with(KLIPPY_MARKER) || line.ends_with(KLIPPY_MARKER) || line.starts_with(RESTART_MARKER)
}

/// Text in front of the marker, for lines where a crash cut the previous
/// message short.
pub(crate) fn marker_prefix(line: &str) -> &str {
    let head = line.split(KLIPPY_MARKER).next().unwrap_or_default();
    head.split(RESTART_MARKER).next().unwrap_or_default()
}

/// A NUL byte directly in front of the marker: the file was padded after a
/// power loss.
pub(crate) fn has_nul_before_marker(line: &str) -> bool {
    line.find("Starting Klippy")
        .map(|pos| line[..pos].ends_with('\0'))
        .unwrap_or(false)
}

pub(crate) fn is_print_comment(line: &str) -> bool {
    starts_with_any(line, PRINT_COMMENT_KEYS)
}

/// Tagged-line entry predicates in priority order.
pub(crate) fn tagged_kind(line: &str) -> Option<BlockKind> {
    if line.starts_with("Sent ") {
        Some(BlockKind::Sent)
    } else if is_print_comment(line) {
        Some(BlockKind::PrintCommentStats)
    } else if line.starts_with("Receive: ") {
        Some(BlockKind::Receive)
    } else if line.contains(": got {") {
        Some(BlockKind::McuReceive)
    } else if line.starts_with("Received ") {
        Some(BlockKind::Received)
    } else if starts_with_any(line, &["queue_step ", "move "]) {
        Some(BlockKind::QueuedMoves)
    } else if line.contains("got {'oid': ") {
        Some(BlockKind::McuClockTrace)
    } else if line.starts_with("autotune_tmc") {
        Some(BlockKind::AutotuneTrace)
    } else if line.starts_with("Resetting prediction variance") {
        Some(BlockKind::PredictionReset)
    } else if line.starts_with("webhooks: ") {
        Some(BlockKind::Webhooks)
    } else {
        None
    }
}

/// Whether `line` still belongs to an open block of `kind`.
///
/// Only kinds with a continuation rule are listed; every other kind
/// returns `true` and is closed by its own terminator or a foreign line.
pub(crate) fn continues(kind: BlockKind, line: &str) -> bool {
    match kind {
        BlockKind::Receive => line.starts_with("Receive: "),
        BlockKind::McuReceive => line.contains(": got {"),
        BlockKind::AutotuneTrace => line.starts_with("autotune_tmc"),
        BlockKind::Webhooks => line.starts_with("webhooks: "),
        BlockKind::PrintCommentStats => is_print_comment(line) || line.starts_with("Stats "),
        BlockKind::FileNotFoundSpan => line.contains(FILE_NOT_FOUND),
        BlockKind::SerialPortSpan => line.contains(SERIAL_PORT),
        _ => true,
    }
}

pub(crate) fn is_mesh_point(line: &str) -> bool {
    contains_any(line, &[" Tool Adjusted ", " | ("])
}

/// A traceback ends on the exception line, e.g. `ValueError: bad value`.
pub(crate) fn ends_traceback(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .map(|word| word.to_lowercase().ends_with("error:"))
        .unwrap_or(false)
}

pub(crate) fn is_danger(line: &str) -> bool {
    starts_with_any(line, DANGER_PREFIXES) || contains_any(line, DANGER_FRAGMENTS)
}

/// `Loaded MCU 'mcu' 110 commands (v0.12.0-85-gd785b396 / gcc: ...)`
pub(crate) fn loaded_mcu(line: &str) -> Option<(String, String)> {
    let name = line.split('\'').nth(1)?;
    let version = line.split('(').nth(1)?.split('/').next()?.trim();
    Some((name.to_string(), version.to_string()))
}

/// `Git version: 'v0.12.0-85-gd785b396'`
pub(crate) fn git_version(line: &str) -> Option<String> {
    let token = line.split_whitespace().last()?;
    let mut chars = token.chars();
    chars.next()?;
    chars.next_back()?;
    Some(chars.as_str().to_string())
}

/// `Timeout with MCU 'mcu' (eventtime=12345.678)`
pub(crate) fn event_time(line: &str) -> Option<f64> {
    line.split("eventtime=").nth(1)?.split(')').next()?.trim().parse().ok()
}

/// `... at shutdown time 1234.567 (...)`: the fourth token from the end,
/// without its trailing separator.
pub(crate) fn shutdown_print_time(line: &str) -> Option<f64> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let token = tokens.len().checked_sub(4).map(|i| tokens[i])?;
    let mut chars = token.chars();
    chars.next_back()?;
    chars.as_str().parse().ok()
}

/// Payload of `Virtual sdcard (...): '...'` / `Upcoming (...): '...'` lines.
///
/// The quoted text is a Python repr: `\r` escapes are dropped and `\n`
/// escapes become real line breaks.
pub(crate) fn sdcard_payload(line: &str) -> Option<String> {
    let quoted = line.split('\'').nth(1)?;
    let mut chars = quoted.chars();
    chars.next_back();
    Some(chars.as_str().replace("\\r", "").replace("\\n", "\n"))
}

/// `Args: ['/home/pi/klipper/klippy/klippy.py', '-l', ...]`
pub(crate) fn parse_args(line: &str) -> Option<Vec<String>> {
    let list = line.get(6..)?;
    serde_json::from_str(&list.replace('\'', "\"")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Markers
    // ---------------------------------------------------------------

    #[test]
    fn test_restart_markers() {
        assert!(is_restart_marker("Starting Klippy..."));
        assert!(is_restart_marker("garbage\0Starting Klippy..."));
        assert!(is_restart_marker("Restarting printer"));
        assert!(!is_restart_marker("Finished SD card print"));
    }

    #[test]
    fn test_marker_prefix_and_nul() {
        assert_eq!(marker_prefix("Receive: 12 \0\0Starting Klippy..."), "Receive: 12 \0\0");
        assert!(has_nul_before_marker("x\0Starting Klippy..."));
        assert!(!has_nul_before_marker("Starting Klippy..."));
        assert!(!has_nul_before_marker("x Starting Klippy..."));
    }

    // ---------------------------------------------------------------
    // Tagged lines
    // ---------------------------------------------------------------

    #[test]
    fn test_tagged_kinds_in_priority_order() {
        assert_eq!(tagged_kind("Sent 12 1.0 1.0 8: seq: 1d"), Some(BlockKind::Sent));
        assert_eq!(tagged_kind("; layer 3"), Some(BlockKind::PrintCommentStats));
        assert_eq!(tagged_kind("Receive: 12 1.0"), Some(BlockKind::Receive));
        assert_eq!(tagged_kind("mcu 'mcu': got {'oid': 3}"), Some(BlockKind::McuReceive));
        assert_eq!(tagged_kind("got {'oid': 3, 'clock': 1}"), Some(BlockKind::McuClockTrace));
        assert_eq!(tagged_kind("queue_step 0: t=1"), Some(BlockKind::QueuedMoves));
        assert_eq!(tagged_kind("move 0: pt=1"), Some(BlockKind::QueuedMoves));
        assert_eq!(tagged_kind("webhooks: id=1"), Some(BlockKind::Webhooks));
        assert_eq!(tagged_kind("Stats 1.0: mcu: x=1"), None);
    }

    #[test]
    fn test_continuation_rules() {
        assert!(continues(BlockKind::Receive, "Receive: 1"));
        assert!(!continues(BlockKind::Receive, "Sent 1"));
        assert!(continues(BlockKind::PrintCommentStats, "Stats 10.0: mcu: x=1"));
        assert!(!continues(BlockKind::PrintCommentStats, "Sent 1"));
        assert!(continues(BlockKind::Sent, "anything"));
    }

    // ---------------------------------------------------------------
    // Extractors
    // ---------------------------------------------------------------

    #[test]
    fn test_traceback_terminator() {
        assert!(ends_traceback("ValueError: bad"));
        assert!(ends_traceback("  OSError: [Errno 5] Input/output error"));
        assert!(ends_traceback("configparser.Error: Option 'x'"));
        assert!(!ends_traceback("  File \"klippy.py\", line 3"));
    }

    #[test]
    fn test_loaded_mcu() {
        let line = "Loaded MCU 'mcu' 110 commands (v0.12.0-85-gd785b396 / gcc: (15:8-2019-q3) 8.3.1)";
        assert_eq!(
            loaded_mcu(line),
            Some(("mcu".to_string(), "v0.12.0-85-gd785b396".to_string()))
        );
        assert_eq!(loaded_mcu("Loaded MCU without quotes"), None);
    }

    #[test]
    fn test_git_version() {
        assert_eq!(git_version("Git version: 'v0.12.0-85-gd785b396'").as_deref(), Some("v0.12.0-85-gd785b396"));
        assert_eq!(git_version("Git version: x"), None);
    }

    #[test]
    fn test_event_time_and_shutdown_time() {
        assert_eq!(event_time("Timeout with MCU 'mcu' (eventtime=1234.5)"), Some(1234.5));
        assert_eq!(shutdown_print_time("Reported at shutdown time 100.25, a b c"), Some(100.25));
        assert_eq!(shutdown_print_time("at shutdown time"), None);
    }

    #[test]
    fn test_sdcard_payload() {
        let line = r"Virtual sdcard (1234): 'G1 X1\r\nG1 X2;'";
        assert_eq!(sdcard_payload(line).as_deref(), Some("G1 X1\nG1 X2"));
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args("Args: ['/klippy.py', '-l', '/tmp/klippy.log']").unwrap();
        assert_eq!(args, vec!["/klippy.py", "-l", "/tmp/klippy.log"]);
        assert!(parse_args("Args: [broken").is_none());
    }

    #[test]
    fn test_danger_lines() {
        assert!(is_danger("Move out of range: 1 2 3"));
        assert!(is_danger("MCU 'mcu' shutdown: Timer too close"));
        assert!(is_danger("TMC 'stepper_x' reports DRV_STATUS: 00000000 (Error!)"));
        assert!(!is_danger("Stats 1.0: mcu: x=1"));
    }
}
