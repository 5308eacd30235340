//! Owned alteration events, for consumers that prefer values over callbacks.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected alteration of one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    /// The kind of alteration.
    pub kind: FileEventKind,

    /// Whether the entry is a file or a directory.
    pub entry: EntryKind,

    /// Path to the affected file or directory.
    pub path: PathBuf,

    /// When the event was dispatched.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new event stamped with the current time.
    pub fn new(kind: FileEventKind, entry: EntryKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            entry,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Check if this is a file event (not directory).
    pub fn is_file(&self) -> bool {
        self.entry == EntryKind::File
    }

    /// Check if this is a directory event.
    pub fn is_directory(&self) -> bool {
        self.entry == EntryKind::Directory
    }
}

/// Kind of alteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// Entry appeared since the previous scan.
    Created,

    /// Entry's existence, type, modification time or length changed.
    Changed,

    /// Entry disappeared since the previous scan.
    Deleted,
}

/// Type of the entry an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// Events gathered over one or more scans, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    /// Events in this batch.
    pub events: Vec<FileEvent>,

    /// When the batch was created.
    pub created_at: Option<DateTime<Utc>>,
}

impl EventBatch {
    /// Create a new empty batch.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            created_at: Some(Utc::now()),
        }
    }

    /// Add an event to the batch.
    pub fn push(&mut self, event: FileEvent) {
        self.events.push(event);
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events of one kind, in dispatch order.
    pub fn of_kind(&self, kind: FileEventKind) -> impl Iterator<Item = &FileEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Paths of all events, in dispatch order.
    pub fn paths(&self) -> Vec<&Path> {
        self.events.iter().map(|e| e.path.as_path()).collect()
    }

    /// Deduplicate events, keeping the latest event for each path at the
    /// position of its first occurrence.
    pub fn deduplicate(&mut self) {
        use std::collections::HashMap;

        let mut positions: HashMap<PathBuf, usize> = HashMap::new();
        let mut deduped: Vec<FileEvent> = Vec::with_capacity(self.events.len());

        for event in self.events.drain(..) {
            match positions.get(&event.path) {
                Some(&index) => deduped[index] = event,
                None => {
                    positions.insert(event.path.clone(), deduped.len());
                    deduped.push(event);
                }
            }
        }

        self.events = deduped;
    }
}
