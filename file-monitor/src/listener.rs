//! Listener contract and the stock listeners shipped with the crate.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::warn;

use crate::event::{EntryKind, EventBatch, FileEvent, FileEventKind};
use crate::observer::Observer;

/// Receives the events of an observer's scans.
///
/// Callbacks run synchronously on the scanning thread, so they should return
/// quickly. Every method defaults to a no-op; implement only what you need.
pub trait AlterationListener: Send + Sync {
    /// Called before a scan starts.
    fn on_start(&self, _observer: &dyn Observer) {}

    /// A directory appeared. Fires before any of its contents.
    fn on_directory_create(&self, _path: &Path) {}

    /// A directory's modification time changed.
    fn on_directory_change(&self, _path: &Path) {}

    /// A directory disappeared. Fires after all of its contents.
    fn on_directory_delete(&self, _path: &Path) {}

    /// A file appeared.
    fn on_file_create(&self, _path: &Path) {}

    /// A file's modification time or length changed.
    fn on_file_change(&self, _path: &Path) {}

    /// A file disappeared.
    fn on_file_delete(&self, _path: &Path) {}

    /// Called once a scan has finished.
    fn on_stop(&self, _observer: &dyn Observer) {}
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl AlterationListener for NoopListener {}

/// Route a typed event to the matching callback.
pub(crate) fn dispatch(
    listener: &dyn AlterationListener,
    event: FileEventKind,
    entry: EntryKind,
    path: &Path,
) {
    match (event, entry) {
        (FileEventKind::Created, EntryKind::File) => listener.on_file_create(path),
        (FileEventKind::Changed, EntryKind::File) => listener.on_file_change(path),
        (FileEventKind::Deleted, EntryKind::File) => listener.on_file_delete(path),
        (FileEventKind::Created, EntryKind::Directory) => listener.on_directory_create(path),
        (FileEventKind::Changed, EntryKind::Directory) => listener.on_directory_change(path),
        (FileEventKind::Deleted, EntryKind::Directory) => listener.on_directory_delete(path),
    }
}

/// Listener that records the events of the most recent scan.
///
/// The batch is cleared in `on_start`, so after `check_and_notify` returns
/// it holds exactly that scan's events.
#[derive(Debug, Default)]
pub struct EventCollector {
    batch: Mutex<EventBatch>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EventBatch> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, kind: FileEventKind, entry: EntryKind, path: &Path) {
        self.lock().push(FileEvent::new(kind, entry, path));
    }

    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<FileEvent> {
        self.lock().events.clone()
    }

    /// Take the recorded batch, leaving an empty one behind.
    pub fn take(&self) -> EventBatch {
        std::mem::replace(&mut *self.lock(), EventBatch::new())
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl AlterationListener for EventCollector {
    fn on_start(&self, _observer: &dyn Observer) {
        *self.lock() = EventBatch::new();
    }

    fn on_directory_create(&self, path: &Path) {
        self.record(FileEventKind::Created, EntryKind::Directory, path);
    }

    fn on_directory_change(&self, path: &Path) {
        self.record(FileEventKind::Changed, EntryKind::Directory, path);
    }

    fn on_directory_delete(&self, path: &Path) {
        self.record(FileEventKind::Deleted, EntryKind::Directory, path);
    }

    fn on_file_create(&self, path: &Path) {
        self.record(FileEventKind::Created, EntryKind::File, path);
    }

    fn on_file_change(&self, path: &Path) {
        self.record(FileEventKind::Changed, EntryKind::File, path);
    }

    fn on_file_delete(&self, path: &Path) {
        self.record(FileEventKind::Deleted, EntryKind::File, path);
    }
}

/// Listener forwarding every event into a tokio channel.
///
/// `send` on an unbounded channel never blocks, so this is safe to use from
/// the monitor thread while an async task drains the receiver.
#[derive(Debug, Clone)]
pub struct EventChannelListener {
    event_tx: mpsc::UnboundedSender<FileEvent>,
}

impl EventChannelListener {
    /// Create a listener and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FileEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, event_rx)
    }

    /// Wrap an existing sender.
    pub fn from_sender(event_tx: mpsc::UnboundedSender<FileEvent>) -> Self {
        Self { event_tx }
    }

    fn send(&self, kind: FileEventKind, entry: EntryKind, path: &Path) {
        if let Err(e) = self.event_tx.send(FileEvent::new(kind, entry, path)) {
            warn!("Dropping file event, receiver closed: {}", e.0.path.display());
        }
    }
}

impl AlterationListener for EventChannelListener {
    fn on_directory_create(&self, path: &Path) {
        self.send(FileEventKind::Created, EntryKind::Directory, path);
    }

    fn on_directory_change(&self, path: &Path) {
        self.send(FileEventKind::Changed, EntryKind::Directory, path);
    }

    fn on_directory_delete(&self, path: &Path) {
        self.send(FileEventKind::Deleted, EntryKind::Directory, path);
    }

    fn on_file_create(&self, path: &Path) {
        self.send(FileEventKind::Created, EntryKind::File, path);
    }

    fn on_file_change(&self, path: &Path) {
        self.send(FileEventKind::Changed, EntryKind::File, path);
    }

    fn on_file_delete(&self, path: &Path) {
        self.send(FileEventKind::Deleted, EntryKind::File, path);
    }
}
