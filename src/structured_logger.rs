//! Structured JSONL logger for debugging and session reconstruction.
//!
//! This module provides machine-parseable logging with:
//! - Monotonic sequence numbers for ordering
//! - ISO 8601 timestamps with microsecond precision
//! - Session and run IDs for correlation
//! - Structured event data in JSON format

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::state_machine::{SessionCommand, SessionEvent};

/// Structured JSONL logger for debugging and session reconstruction.
pub struct StructuredLogger {
    session_id: String,
    run_id: AtomicU64,
    seq: AtomicU64,
    log_file: Option<Mutex<File>>,
    log_path: Option<PathBuf>,
}

/// A single log entry in JSONL format.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number (unique across entire session)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    /// Session ID
    pub session_id: String,
    /// Run ID (0 until the first run is requested)
    pub run_id: u64,
    /// Component that emitted the log
    pub component: String,
    /// Structured event data
    pub event: Value,
}

impl StructuredLogger {
    /// Creates a new structured logger for the given session.
    ///
    /// Logs are written to `<logs_dir>/<session_id>.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The logs directory cannot be created
    /// - The log file cannot be opened
    pub fn new(session_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join(format!("{}.jsonl", session_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            session_id: session_id.to_string(),
            run_id: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            log_file: Some(Mutex::new(file)),
            log_path: Some(log_path),
        })
    }

    /// A logger that discards everything. Used when the event log is
    /// turned off in config.
    pub fn disabled(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            run_id: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            log_file: None,
            log_path: None,
        }
    }

    /// Tags subsequent entries with the given run.
    pub fn begin_run(&self, run_id: u64) {
        self.run_id.store(run_id, Ordering::SeqCst);
    }

    /// Returns the next sequence number.
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs a structured event.
    ///
    /// The event is serialized to JSON and written as a single line.
    /// This method is thread-safe.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let Some(log_file) = &self.log_file else {
            return;
        };

        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            session_id: self.session_id.clone(),
            run_id: self.run_id.load(Ordering::SeqCst),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    /// Logs a command received by the session state machine.
    pub fn log_command(&self, seq: u64, command: &SessionCommand) {
        self.log(
            "StateMachine",
            serde_json::json!({
                "type": "Command",
                "apply_seq": seq,
                "command": command
            }),
        );
    }

    /// Logs an event emitted by the session state machine.
    pub fn log_event(&self, seq: u64, event: &SessionEvent) {
        self.log(
            "StateMachine",
            serde_json::json!({
                "type": "Event",
                "apply_seq": seq,
                "event": event
            }),
        );
    }

    /// Logs an inbound frame that could not be decoded.
    pub fn log_malformed_frame(&self, frame: &str, error: &str) {
        let preview: String = frame.chars().take(200).collect();
        self.log(
            "Connection",
            serde_json::json!({
                "type": "MalformedFrame",
                "frame": preview,
                "error": error
            }),
        );
    }

    /// Returns the path to the log file, if logging is enabled.
    pub fn path(&self) -> Option<&PathBuf> {
        self.log_path.as_ref()
    }

    /// Returns the current session ID.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
