//! Event sinks for the append-only game log.
//!
//! The session writes every [`EventRecord`] to an [`EventSink`] as soon as it
//! is produced, so a crash mid-game still leaves a readable log up to the
//! last completed step.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use parley_types::EventRecord;

/// Errors that can occur while writing events.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The log file could not be opened or written.
    #[error("failed to write event log: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An event could not be serialized.
    #[error("failed to serialize event: {source}")]
    Json {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

/// Destination for game events.
pub trait EventSink {
    /// Append one record.
    fn record(&mut self, record: &EventRecord) -> Result<(), SinkError>;

    /// Flush buffered records.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every record in memory. Used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<EventRecord>,
}

impl MemorySink {
    /// An empty sink.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Everything recorded so far, in order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line to a file, flushing after each record.
#[derive(Debug)]
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn record(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_types::{GameEvent, GameOutcome};

    use super::*;

    fn end_record() -> EventRecord {
        EventRecord::now(
            2,
            GameEvent::GameEnd {
                outcome: GameOutcome::Stalemate { turn_limit: 2 },
            },
        )
    }

    #[test]
    fn memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        sink.record(&EventRecord::now(
            0,
            GameEvent::PhaseStarted {
                phase: "vote".into(),
                overridden: false,
            },
        ))
        .unwrap();
        sink.record(&end_record()).unwrap();
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records().last().map(|r| r.turn), Some(2));
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!("parley_sink_{}.jsonl", std::process::id()));
        std::fs::remove_file(&path).ok();

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.record(&end_record()).unwrap();
        sink.record(&end_record()).unwrap();
        sink.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: EventRecord = serde_json::from_str(lines.first().unwrap()).unwrap();
        assert_eq!(first.turn, 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn jsonl_records_reach_disk_without_an_explicit_flush() {
        let path =
            std::env::temp_dir().join(format!("parley_sink_live_{}.jsonl", std::process::id()));
        std::fs::remove_file(&path).ok();

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.record(&end_record()).unwrap();

        // The sink is still open: this is what a reader sees after a crash.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        drop(sink);

        std::fs::remove_file(&path).ok();
    }
}
