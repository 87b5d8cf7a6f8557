//! Log buffer service
//!
//! Manages in-memory log collection during deployment execution. The buffer
//! is written to by the stage pipeline and periodically drained by the log
//! sender task, which ships batches to the orchestrator.

use berth_core::domain::log::{LogStream, NewLogEntry};
use std::sync::{Arc, Mutex};

/// Service for managing log buffers
///
/// Thread-safe buffer for collecting log entries during deployment
/// execution. Entries keep their insertion order; the orchestrator assigns
/// the durable per-deployment sequence on append.
pub trait LogBuffer: Send + Sync {
    /// Adds a log entry to the buffer
    fn add_entry(&self, entry: NewLogEntry);

    /// Drains all buffered entries, clearing the buffer
    fn drain(&self) -> Vec<NewLogEntry>;
}

/// In-memory implementation of LogBuffer
#[derive(Clone)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<Vec<NewLogEntry>>>,
    batch: i32,
}

impl InMemoryLogBuffer {
    /// Creates a new buffer for one deployment attempt
    pub fn new(batch: i32) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            batch,
        }
    }

    /// Records the command about to run for a stage
    pub fn log_command(&self, stage: &str, command: &str) {
        self.add_entry(NewLogEntry {
            command: Some(command.to_string()),
            output: String::new(),
            stream: LogStream::Stdout,
            stage: stage.to_string(),
            hidden: false,
            batch: self.batch,
        });
    }

    /// Records stdout output for a stage
    pub fn log_stdout(&self, stage: &str, output: impl Into<String>) {
        self.add_entry(NewLogEntry {
            command: None,
            output: output.into(),
            stream: LogStream::Stdout,
            stage: stage.to_string(),
            hidden: false,
            batch: self.batch,
        });
    }

    /// Records stderr output for a stage
    pub fn log_stderr(&self, stage: &str, output: impl Into<String>) {
        self.add_entry(NewLogEntry {
            command: None,
            output: output.into(),
            stream: LogStream::Stderr,
            stage: stage.to_string(),
            hidden: false,
            batch: self.batch,
        });
    }

    /// Records output that must not surface in UI reads (secrets)
    pub fn log_hidden(&self, stage: &str, output: impl Into<String>) {
        self.add_entry(NewLogEntry {
            command: None,
            output: output.into(),
            stream: LogStream::Stdout,
            stage: stage.to_string(),
            hidden: true,
            batch: self.batch,
        });
    }
}

impl LogBuffer for InMemoryLogBuffer {
    fn add_entry(&self, entry: NewLogEntry) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push(entry);
    }

    fn drain(&self) -> Vec<NewLogEntry> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_clears_buffer() {
        let buf = InMemoryLogBuffer::new(0);
        buf.log_stdout("build_image", "step 1/4");
        buf.log_stderr("build_image", "warning: cache miss");

        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let buf = InMemoryLogBuffer::new(1);
        buf.log_command("deploy", "podman run app");
        buf.log_stdout("deploy", "started");

        let drained = buf.drain();
        assert_eq!(drained[0].command.as_deref(), Some("podman run app"));
        assert_eq!(drained[1].output, "started");
        assert!(drained.iter().all(|e| e.batch == 1));
    }

    #[test]
    fn test_hidden_entries_flagged() {
        let buf = InMemoryLogBuffer::new(0);
        buf.log_hidden("prepare", "DATABASE_URL=postgres://...");
        let drained = buf.drain();
        assert!(drained[0].hidden);
    }
}
