//! Filesystem primitives consumed by the observer.
//!
//! The diff algorithm only needs two things from the host: the current
//! attributes of a path and the immediate children of a directory. Both are
//! behind the [`FileSystem`] trait so the scan logic never touches `std::fs`
//! directly.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// Attributes of a path as observed at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryState {
    /// Whether the path exists.
    pub exists: bool,

    /// Whether the path is a directory.
    pub is_directory: bool,

    /// Last modification time, `UNIX_EPOCH` when unknown or missing.
    pub last_modified: SystemTime,

    /// Size in bytes, zero for directories and missing paths.
    pub length: u64,
}

impl EntryState {
    /// State of a path that does not exist.
    pub const fn missing() -> Self {
        Self {
            exists: false,
            is_directory: false,
            last_modified: SystemTime::UNIX_EPOCH,
            length: 0,
        }
    }

    /// Build a state from filesystem metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let is_directory = metadata.is_dir();
        Self {
            exists: true,
            is_directory,
            last_modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            length: if is_directory { 0 } else { metadata.len() },
        }
    }
}

impl Default for EntryState {
    fn default() -> Self {
        Self::missing()
    }
}

/// Source of filesystem state for an observer.
pub trait FileSystem: Send + Sync {
    /// Current attributes of `path`. Missing or unreadable paths report
    /// [`EntryState::missing`].
    fn state(&self, path: &Path) -> EntryState;

    /// Immediate children of `path`, in no particular order.
    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// [`FileSystem`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem {
    follow_symlinks: bool,
}

impl OsFileSystem {
    /// Create a filesystem that does not follow symbolic links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow symbolic links when reading attributes and listing children.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }
}

impl FileSystem for OsFileSystem {
    fn state(&self, path: &Path) -> EntryState {
        let metadata = if self.follow_symlinks {
            std::fs::metadata(path)
        } else {
            std::fs::symlink_metadata(path)
        };

        match metadata {
            Ok(metadata) => EntryState::from_metadata(&metadata),
            Err(_) => EntryState::missing(),
        }
    }

    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let walker = WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_symlinks);

        let mut children = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => children.push(entry.into_path()),
                // Failing to read the directory itself surfaces as an error at depth 0.
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(_) => continue,
            }
        }

        Ok(children)
    }
}
