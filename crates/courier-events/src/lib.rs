//! Delivery event logging for courier.
//!
//! This crate provides an append-only JSONL event log kept next to each build.
//! Every delivery attempt outcome and every discard of a pending entry is
//! recorded; `Delivered` events double as the build's delivery receipts.
//!
//! # Example
//!
//! ```
//! use courier_events::EventLog;
//! use courier_types::{DeliveryEvent, EventType, ModuleIdentity, NotificationAction};
//!
//! let mut log = EventLog::new();
//!
//! log.record(DeliveryEvent::now(
//!     &ModuleIdentity::new("core", "1.2.3"),
//!     EventType::Skipped {
//!         action: NotificationAction::PostModule,
//!         reason: "descriptor missing".to_string(),
//!     },
//! ));
//!
//! assert_eq!(log.len(), 1);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use courier_types::{DeliveryEvent, DeliveryReceipt, EventType};

/// Default events file name
pub const EVENTS_FILE: &str = "events.jsonl";

/// Get the events file path for a build directory
pub fn events_path(build_dir: &Path) -> PathBuf {
    build_dir.join(EVENTS_FILE)
}

/// Append-only event log for delivery attempts.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<DeliveryEvent>,
}

impl EventLog {
    /// Create a new empty event log.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Record a new event.
    pub fn record(&mut self, event: DeliveryEvent) {
        self.events.push(event);
    }

    /// Write all recorded events to a file in JSONL format.
    ///
    /// Events are appended to the file if it already exists.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create events dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;

        let mut writer = std::io::BufWriter::new(file);

        for event in &self.events {
            let line = serde_json::to_string(event).context("failed to serialize event to JSON")?;
            writeln!(writer, "{}", line).context("failed to write event line")?;
        }

        writer.flush().context("failed to flush events file")?;

        Ok(())
    }

    /// Read all events from a JSONL file.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let file = File::open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;

        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for line in reader.lines() {
            let line = line.with_context(|| {
                format!("failed to read line from events file {}", path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: DeliveryEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse event JSON from line: {}", line))?;
            events.push(event);
        }

        Ok(Self { events })
    }

    /// Delivery receipts, in the order they were recorded.
    pub fn receipts(&self) -> Vec<&DeliveryReceipt> {
        self.events
            .iter()
            .filter_map(|e| match &e.event_type {
                EventType::Delivered { receipt } => Some(receipt),
                _ => None,
            })
            .collect()
    }

    /// Get all recorded events.
    pub fn all_events(&self) -> &[DeliveryEvent] {
        &self.events
    }

    /// Get the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Append a single event to the log at `path`.
pub fn append_event(path: &Path, event: DeliveryEvent) -> Result<()> {
    let mut log = EventLog::new();
    log.record(event);
    log.write_to_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_types::{ModuleIdentity, NotificationAction, PostponeReason};
    use tempfile::tempdir;

    fn identity(module: &str) -> ModuleIdentity {
        let (name, version) = module.split_once('@').unwrap_or((module, "1.0.0"));
        ModuleIdentity::new(name, version)
    }

    fn delivered(module: &str) -> DeliveryEvent {
        let id = identity(module);
        DeliveryEvent::now(
            &id,
            EventType::Delivered {
                receipt: DeliveryReceipt {
                    action: NotificationAction::PostModule,
                    module: id.clone(),
                    registry: "http://localhost:8074".to_string(),
                    status: 201,
                    delivered_at: Utc::now(),
                },
            },
        )
    }

    fn postponed(module: &str) -> DeliveryEvent {
        DeliveryEvent::now(
            &identity(module),
            EventType::Postponed {
                action: NotificationAction::Promote,
                entry_id: "0001".to_string(),
                reason: PostponeReason::Unreachable,
            },
        )
    }

    #[test]
    fn new_event_log_is_empty() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn receipts_only_include_deliveries() {
        let mut log = EventLog::new();
        log.record(postponed("core@1.0.0"));
        log.record(delivered("core@1.0.0"));

        let receipts = log.receipts();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].module, identity("core@1.0.0"));
        assert_eq!(receipts[0].status, 201);
    }

    #[test]
    fn write_to_file_creates_jsonl_format() {
        let td = tempdir().expect("tempdir");
        let path = events_path(td.path());

        let mut log = EventLog::new();
        log.record(delivered("core@1.0.0"));
        log.write_to_file(&path).expect("write");

        let content = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);

        let _: DeliveryEvent = serde_json::from_str(lines[0]).expect("parse");
    }

    #[test]
    fn append_event_accumulates() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("nested").join(EVENTS_FILE);

        append_event(&path, postponed("core@1.0.0")).expect("first");
        append_event(&path, delivered("core@1.0.0")).expect("second");

        let loaded = EventLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 2);
        assert!(matches!(
            loaded.all_events()[1].event_type,
            EventType::Delivered { .. }
        ));
    }

    #[test]
    fn read_from_file_returns_empty_log_when_missing() {
        let td = tempdir().expect("tempdir");
        let loaded = EventLog::read_from_file(&td.path().join("missing.jsonl")).expect("read");
        assert!(loaded.is_empty());
    }

    #[test]
    fn read_from_file_rejects_garbage() {
        let td = tempdir().expect("tempdir");
        let path = events_path(td.path());
        fs::write(&path, "{not json}\n").expect("write");

        assert!(EventLog::read_from_file(&path).is_err());
    }

    #[test]
    fn path_helper_returns_expected_path() {
        let base = PathBuf::from("x");
        assert_eq!(events_path(&base), PathBuf::from("x").join(EVENTS_FILE));
    }
}
