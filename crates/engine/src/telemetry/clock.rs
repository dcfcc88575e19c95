//! Clock reconciliation between Klipper's monotonic `Stats` times and wall time.
//!
//! `Start printer at <asctime> (<epoch> <monotonic>)` pins both clocks at once.
//! `Log rollover at <asctime>` only pins the wall clock; the monotonic origin is
//! then taken from the next sample.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use super::{round_hundredths, round_tenths};

const ASCTIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

#[derive(Debug, Default, Clone)]
pub struct SampleClock {
    origin: Option<f64>,
    date_secs: f64,
    wall: Option<DateTime<Utc>>,
    print_offset: f64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor from a `Start printer` line.
    pub fn anchor_start(&mut self, epoch_secs: f64, monotonic: f64, wall: Option<DateTime<Utc>>) {
        self.date_secs = epoch_secs.trunc();
        self.origin = Some(round_tenths(monotonic));
        if wall.is_some() {
            self.wall = wall;
        }
    }

    /// Anchor from a `Log rollover` line.
    pub fn anchor_rollover(&mut self, wall: DateTime<Utc>) {
        self.date_secs = wall.timestamp() as f64;
        self.wall = Some(wall);
        self.origin = None;
    }

    /// Place a raw `Stats` time on the epoch timeline.
    ///
    /// Returns `(offset, date_ms)`; the first placement after a rollover
    /// becomes the new origin.
    pub fn place(&mut self, raw_time: f64) -> (f64, i64) {
        let st = round_tenths(raw_time);
        let origin = *self.origin.get_or_insert(st);
        let offset = round_tenths(st - origin);
        let date_ms = ((offset + self.date_secs) * 1000.0) as i64;
        (offset, date_ms)
    }

    /// Remember how far the MCU print clock lags the host monotonic clock.
    pub fn note_print_time(&mut self, raw_time: f64, print_time: f64) {
        self.print_offset = round_tenths(raw_time) - round_hundredths(print_time);
    }

    /// Wall-clock time of a host monotonic timestamp (e.g. `eventtime=`).
    pub fn wall_time_at(&self, monotonic: f64) -> Option<DateTime<Utc>> {
        let seconds = round_tenths(monotonic) - self.origin.unwrap_or_default();
        self.shift(seconds)
    }

    /// Wall-clock time of an MCU print time (e.g. `at shutdown time`).
    pub fn wall_time_at_print_time(&self, print_time: f64) -> Option<DateTime<Utc>> {
        let seconds = round_hundredths(print_time) + self.print_offset - self.origin.unwrap_or_default();
        self.shift(seconds)
    }

    fn shift(&self, seconds: f64) -> Option<DateTime<Utc>> {
        if !seconds.is_finite() {
            return None;
        }
        let wall = self.wall?;
        let millis = (seconds * 1000.0).round() as i64;
        wall.checked_add_signed(Duration::try_milliseconds(millis)?)
    }
}

/// Parse whitespace-separated `asctime` tokens (`Sat Jan 13 20:03:26 2024`).
pub fn parse_asctime(tokens: &[&str]) -> Option<DateTime<Utc>> {
    let text = tokens.join(" ");
    NaiveDateTime::parse_from_str(&text, ASCTIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_asctime(time: &DateTime<Utc>) -> String {
    time.format(ASCTIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asctime_with_padded_day() {
        let tokens: Vec<&str> = "Sat Jan  6 20:03:26 2024".split_whitespace().collect();
        let parsed = parse_asctime(&tokens).unwrap();
        assert_eq!(format_asctime(&parsed), "Sat Jan 06 20:03:26 2024");
    }

    #[test]
    fn test_parse_asctime_rejects_garbage() {
        assert!(parse_asctime(&["not", "a", "date"]).is_none());
    }

    #[test]
    fn test_first_sample_becomes_origin_after_rollover() {
        let mut clock = SampleClock::new();
        let wall = parse_asctime(&["Sat", "Jan", "13", "20:00:00", "2024"]).unwrap();
        clock.anchor_rollover(wall);

        let (offset, date_ms) = clock.place(500.04);
        assert_eq!(offset, 0.0);
        assert_eq!(date_ms, wall.timestamp() * 1000);

        let (offset, date_ms) = clock.place(505.0);
        assert_eq!(offset, 5.0);
        assert_eq!(date_ms, wall.timestamp() * 1000 + 5000);
    }

    #[test]
    fn test_start_anchor_uses_monotonic_origin() {
        let mut clock = SampleClock::new();
        clock.anchor_start(1_705_176_206.9, 30.4, None);
        let (offset, date_ms) = clock.place(40.4);
        assert_eq!(offset, 10.0);
        assert_eq!(date_ms, 1_705_176_216_000);
    }

    #[test]
    fn test_wall_time_reconstruction() {
        let mut clock = SampleClock::new();
        let wall = parse_asctime(&["Sat", "Jan", "13", "20:00:00", "2024"]).unwrap();
        clock.anchor_start(wall.timestamp() as f64, 100.0, Some(wall));

        let at = clock.wall_time_at(160.0).unwrap();
        assert_eq!(format_asctime(&at), "Sat Jan 13 20:01:00 2024");

        clock.note_print_time(160.0, 10.0);
        let at = clock.wall_time_at_print_time(20.0).unwrap();
        assert_eq!(format_asctime(&at), "Sat Jan 13 20:01:10 2024");
    }

    #[test]
    fn test_out_of_range_times_are_dropped() {
        let mut clock = SampleClock::new();
        let wall = parse_asctime(&["Sat", "Jan", "13", "20:00:00", "2024"]).unwrap();
        clock.anchor_start(wall.timestamp() as f64, 100.0, Some(wall));

        assert!(clock.wall_time_at(-1e300).is_none());
        assert!(clock.wall_time_at(1e300).is_none());
        assert!(clock.wall_time_at_print_time(-1e300).is_none());
    }

    #[test]
    fn test_wall_time_needs_anchor() {
        let clock = SampleClock::new();
        assert!(clock.wall_time_at(10.0).is_none());
    }
}
