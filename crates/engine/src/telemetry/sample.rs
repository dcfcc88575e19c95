//! `Stats` line grammar.
//!
//! ```text
//! Stats 1234.5: gcodein=0  mcu: mcu_awake=0.005 bytes_write=1234 ... sysload=0.18 cputime=4.3 ...
//! ```
//!
//! Whitespace-delimited tokens; a token ending in `:` opens a namespace, any
//! other token is `key=value`. `sysload=` implicitly opens the `sysinfo`
//! namespace because the host stats carry no prefix of their own.

use super::clock::SampleClock;
use super::model::TelemetrySample;
use super::{AWAKE_METRIC, CPUDELTA_KEY, CPUTIME_KEY, METRIC_ALLOW_LIST, PRINT_TIME_KEY};

pub const STATS_PREFIX: &str = "Stats ";

const HOST_NAMESPACE: &str = "sysinfo";

/// Upper bound of the cpu-time ratio (one full core).
const CPU_DELTA_MAX_RATIO: f64 = 1.0;

/// Tokens of one `Stats` line before clock placement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsLine {
    /// Host monotonic time as printed (unrounded)
    pub raw_time: f64,
    /// Normalized `"<namespace>:<key>"` values in line order, allow-list applied
    pub fields: Vec<(String, f64)>,
    /// `(namespace, mcu_awake)` readings
    pub awake: Vec<(String, f64)>,
    /// `key=value` tokens whose value did not parse
    pub malformed: usize,
}

/// Parse a `Stats` line. Returns `None` when the line is not a `Stats` line
/// or its time token is unreadable.
pub fn parse_stats_line(line: &str) -> Option<StatsLine> {
    let rest = line.strip_prefix(STATS_PREFIX)?;
    let mut tokens = rest.split_whitespace();

    let time_token = tokens.next()?;
    let time_text = time_token.strip_suffix(':').unwrap_or(time_token);
    let time_text = time_text.strip_suffix('s').unwrap_or(time_text);
    let raw_time: f64 = time_text.parse().ok().filter(|t: &f64| t.is_finite())?;

    let mut namespace: Option<&str> = None;
    let mut fields = Vec::new();
    let mut awake = Vec::new();
    let mut malformed = 0;

    for token in tokens {
        if let Some(name) = token.strip_suffix(':') {
            namespace = Some(name);
            continue;
        }

        let mut parts = token.split('=');
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => (key, value),
            _ => continue,
        };

        if key == "sysload" {
            namespace = Some(HOST_NAMESPACE);
        }

        let Some(ns) = namespace else {
            continue;
        };

        let is_awake = key == AWAKE_METRIC;
        if !is_awake && !METRIC_ALLOW_LIST.contains(&key) {
            continue;
        }

        match normalize_value(key, value) {
            Some(v) if is_awake => awake.push((ns.to_string(), v)),
            Some(v) => fields.push((format!("{ns}:{key}"), v)),
            None => {
                tracing::trace!(key, value, "stats: malformed value skipped");
                malformed += 1;
            }
        }
    }

    Some(StatsLine {
        raw_time,
        fields,
        awake,
        malformed,
    })
}

/// Round to 6 decimals, then apply the per-metric unit transform.
pub fn normalize_value(key: &str, raw: &str) -> Option<f64> {
    let parsed: f64 = raw.parse().ok().filter(|v: &f64| v.is_finite())?;
    let value = round_micro(parsed);

    Some(match key {
        "pwm" | "fan_speed" => (value * 100.0).trunc(),
        "memavail" => value / 1024.0,
        "sysload" => value * 100.0,
        _ => value,
    })
}

/// Decimal rounding to 6 places, identical to formatting with `{:.6}`.
fn round_micro(value: f64) -> f64 {
    format!("{value:.6}").parse().unwrap_or(value)
}

impl StatsLine {
    /// Place the line on the clock and derive per-tick fields against the
    /// previous sample of the same epoch.
    pub fn into_sample(self, clock: &mut SampleClock, previous: Option<&TelemetrySample>) -> TelemetrySample {
        let (offset, date_ms) = clock.place(self.raw_time);
        let mut sample = TelemetrySample::new(offset, date_ms);
        for (key, value) in self.fields {
            sample.insert(key, value);
        }
        for (controller, seconds) in self.awake {
            sample.set_awake(controller, seconds);
        }

        if let Some(print_time) = sample.get(PRINT_TIME_KEY) {
            clock.note_print_time(self.raw_time, print_time);
        }

        if let Some(cputime) = sample.get(CPUTIME_KEY) {
            let delta = previous
                .map(|prev| cpu_delta(prev, offset, cputime))
                .unwrap_or(0.0);
            sample.insert(CPUDELTA_KEY, delta);
        }

        sample
    }
}

/// Percentage of one core used since `previous`, always within `[0, 100]`.
fn cpu_delta(previous: &TelemetrySample, offset: f64, cputime: f64) -> f64 {
    let elapsed = offset - previous.offset;
    let Some(last_cputime) = previous.get(CPUTIME_KEY) else {
        return 0.0;
    };
    if elapsed <= 0.0 {
        return 0.0;
    }
    let ratio = (cputime - last_cputime) / elapsed;
    if !ratio.is_finite() {
        return 0.0;
    }
    ratio.clamp(0.0, CPU_DELTA_MAX_RATIO) * 100.0
}
