//! Event sink writing one JSON object per line.

use std::io::{self, Write};

use engine::{Event, EventSink};

pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            error: None,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand the writer back, or the first write error.
    pub fn finish(mut self) -> io::Result<(W, usize)> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok((self.writer, self.written))
    }

    fn write(&mut self, event: &Event) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: Event) {
        if self.error.is_some() {
            return;
        }
        match self.write(&event) {
            Ok(()) => self.written += 1,
            Err(err) => {
                tracing::warn!(error = %err, event = event.name(), "sink: write failed, dropping remaining events");
                self.error = Some(err);
            }
        }
    }
}
