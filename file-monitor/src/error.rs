//! Error types for the file alteration monitor.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while configuring or driving observers.
///
/// Filesystem failures during a scan are never reported here: an unreadable
/// directory simply yields no children for that scan.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The observer was given an empty root path.
    #[error("root path must not be empty")]
    EmptyRootPath,

    /// Invalid exclude pattern.
    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// `start` was called on a running monitor.
    #[error("monitor is already running")]
    AlreadyRunning,

    /// `stop` was called on a stopped monitor.
    #[error("monitor is not running")]
    NotRunning,

    /// An observer failed to initialize while the monitor was starting.
    #[error("failed to initialize observer for {}: {source}", path.display())]
    Initialize {
        path: PathBuf,
        #[source]
        source: Box<MonitorError>,
    },

    /// An observer failed to release its resources while the monitor was stopping.
    #[error("failed to destroy observer for {}: {source}", path.display())]
    Destroy {
        path: PathBuf,
        #[source]
        source: Box<MonitorError>,
    },

    /// The background thread could not be spawned.
    #[error("failed to spawn monitor thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
