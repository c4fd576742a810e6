//! Session events and the sinks that receive them.
//!
//! # Separation of Concerns
//!
//! - **Session events (this module)**: product output describing what a relay
//!   session did (round starts, dispatches, termination). Injected into the
//!   engine as an [`EventSink`].
//! - **Tracing (`logging`)**: dev diagnostics via `RUST_LOG`.
//!
//! [`TracingSink`] bridges the two so events show up on the console too.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

/// Kind of a session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStarted,
    LoopIteration,
    Dispatching,
    LoopTerminated,
    RoundsExhausted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session started",
            EventKind::LoopIteration => "loop iteration",
            EventKind::Dispatching => "dispatching",
            EventKind::LoopTerminated => "loop terminated",
            EventKind::RoundsExhausted => "rounds exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RelayEvent {
    pub fn now(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    /// `[<rfc3339 timestamp>] [<EVENT TYPE>] <message>`
    pub fn to_log_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.event_type().to_uppercase(),
            self.message
        )
    }
}

/// Receiver for session events.
///
/// Recording never fails from the engine's point of view; sinks that touch
/// the filesystem report their own problems through `tracing`.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &RelayEvent);
}

/// Emits every event at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &RelayEvent) {
        info!(event = event.event_type(), "{}", event.message);
    }
}

/// Appends one line per event to a session log file.
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileEventLog {
    /// Create the parent directory up front so a bad path fails at startup,
    /// not in the middle of a round.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create event log dir {}", parent.display()))?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open event log {}", self.path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("append {}", self.path.display()))
    }
}

impl EventSink for FileEventLog {
    fn record(&self, event: &RelayEvent) {
        if let Err(err) = self.append(&event.to_log_line()) {
            warn!(err = %err, path = %self.path.display(), "failed to write event log");
        }
    }
}

/// Forwards every event to each inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &RelayEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
