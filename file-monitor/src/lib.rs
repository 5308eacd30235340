//! # File Monitor
//!
//! Polling file alteration monitoring for the Codex context system. An
//! observer snapshots a directory tree and, on every scan, reports what was
//! created, changed or deleted since the previous one; a monitor drives any
//! number of observers from a single background thread.
//!
//! ## Features
//!
//! - **Pure Polling**: No kernel notification APIs; works on any filesystem
//! - **Deterministic Ordering**: Siblings reported in name order, new
//!   directories before their contents, deleted directories after them
//! - **Exclusion Patterns**: Glob-based filtering of tracked entries
//! - **Pluggable Seams**: Filesystem, entry factory, listeners and thread
//!   construction are all traits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 File Alteration Monitor                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  MonitorConfig ──► FileAlterationMonitor (background thread)    │
//! │                          │                                      │
//! │                          ▼                                      │
//! │  FileFilter ──► FileAlterationObserver ──► AlterationListener   │
//! │                          │                      │               │
//! │                          ▼                      ▼               │
//! │                   FileEntry tree        FileEvent / channel     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use codex_file_monitor::{EventCollector, FileAlterationMonitor, FileAlterationObserver};
//!
//! # fn main() -> codex_file_monitor::Result<()> {
//! let observer = Arc::new(FileAlterationObserver::new("/var/data")?);
//! let collector = Arc::new(EventCollector::new());
//! observer.add_listener(collector.clone());
//!
//! let monitor = FileAlterationMonitor::new(Duration::from_secs(1));
//! monitor.add_observer(observer);
//! monitor.start()?;
//! // ...
//! monitor.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod comparison;
pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod filter;
pub mod fs;
pub mod listener;
pub mod monitor;
pub mod observer;

pub use comparison::NameComparison;
pub use config::{MonitorConfig, ObserverConfig};
pub use entry::{DefaultEntryFactory, EntryFactory, FileEntry};
pub use error::{MonitorError, Result};
pub use event::{EntryKind, EventBatch, FileEvent, FileEventKind};
pub use filter::{FileFilter, GlobFilter};
pub use fs::{EntryState, FileSystem, OsFileSystem};
pub use listener::{AlterationListener, EventChannelListener, EventCollector, NoopListener};
pub use monitor::{DEFAULT_INTERVAL, DefaultThreadFactory, FileAlterationMonitor, ThreadFactory};
pub use observer::{FileAlterationObserver, Observer};
