use crate::classify::event::Event;

/// Receives the ordered event stream of one pass.
///
/// The engine guarantees every event has been delivered before
/// [`crate::Classifier::finish`] returns.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: Event) {
        (**self).emit(event);
    }
}

/// Turns a captured raw firmware build config into display lines.
///
/// The engine treats the result as opaque and forwards it unchanged.
pub trait BuildConfigFormatter {
    fn format(&self, raw: &str) -> Vec<String>;
}

/// Formatter used when no schema-aware formatter is wired in: keeps the
/// non-empty `CONFIG_*` assignments as they were captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFormatter;

impl BuildConfigFormatter for PassthroughFormatter {
    fn format(&self, raw: &str) -> Vec<String> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }
}
