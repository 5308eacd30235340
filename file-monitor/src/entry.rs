//! Snapshot of a single filesystem node and its children.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::comparison::file_name;
use crate::fs::{EntryState, FileSystem};

/// Recorded state of one filesystem node as of the last scan.
///
/// A parent exclusively owns its children; there are no back-references; the
/// nesting level is kept in [`FileEntry::depth`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: PathBuf,
    name: String,
    depth: usize,
    state: EntryState,
    children: Vec<FileEntry>,
}

impl FileEntry {
    /// Create an un-refreshed root entry for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path),
            path,
            depth: 0,
            state: EntryState::missing(),
            children: Vec::new(),
        }
    }

    /// Create an un-refreshed child of `self` for `path`.
    ///
    /// Callers must [`refresh`](Self::refresh) the result before using it.
    pub fn new_child_instance(&self, path: impl Into<PathBuf>) -> Self {
        let mut child = Self::new(path);
        child.depth = self.depth + 1;
        child
    }

    /// Re-read this entry's attributes from the live node at `path`.
    ///
    /// `path` is normally the tracked path; it differs only when a listing
    /// entry was matched by a comparator that ignores the difference (a
    /// case-only rename). Returns `true` if existence, type, modification time
    /// or length changed. Path and name are updated too but never count as a
    /// change.
    pub fn refresh(&mut self, fs: &dyn FileSystem, path: &Path) -> bool {
        let previous = self.state;
        if self.path != path {
            self.path = path.to_path_buf();
        }
        self.name = file_name(&self.path);
        self.state = fs.state(&self.path);
        // Keep the invariant that only existing regular files carry a length.
        if !self.state.exists {
            self.state = EntryState::missing();
        }

        self.state != previous
    }

    /// Path this entry tracks.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the tracked path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nesting level below the observer root (the root is 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the path existed at the last refresh.
    pub fn exists(&self) -> bool {
        self.state.exists
    }

    /// Whether the path was a directory at the last refresh.
    pub fn is_directory(&self) -> bool {
        self.state.is_directory
    }

    /// Modification time seen at the last refresh (`UNIX_EPOCH` if missing).
    pub fn last_modified(&self) -> SystemTime {
        self.state.last_modified
    }

    /// Size in bytes seen at the last refresh (0 for directories and missing paths).
    pub fn length(&self) -> u64 {
        self.state.length
    }

    /// Attributes recorded by the last refresh.
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Child snapshots, in comparator order.
    pub fn children(&self) -> &[FileEntry] {
        &self.children
    }

    /// Replace the child snapshots.
    pub fn set_children(&mut self, children: Vec<FileEntry>) {
        self.children = children;
    }

    /// Take the child snapshots out, leaving this entry childless.
    pub(crate) fn take_children(&mut self) -> Vec<FileEntry> {
        std::mem::take(&mut self.children)
    }

    /// Number of entries in this subtree, excluding `self`.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    /// Find a descendant by path.
    pub fn find(&self, path: &Path) -> Option<&FileEntry> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Strategy for building child snapshots.
///
/// The observer never constructs entries directly; swapping the factory lets
/// callers decorate or pre-populate entries without touching the diff.
pub trait EntryFactory: Send + Sync {
    /// Build a fresh, un-refreshed child of `parent` for `path`.
    fn new_child_instance(&self, parent: &FileEntry, path: &Path) -> FileEntry;
}

/// Factory that delegates to [`FileEntry::new_child_instance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntryFactory;

impl EntryFactory for DefaultEntryFactory {
    fn new_child_instance(&self, parent: &FileEntry, path: &Path) -> FileEntry {
        parent.new_child_instance(path)
    }
}

impl<F> EntryFactory for F
where
    F: Fn(&FileEntry, &Path) -> FileEntry + Send + Sync,
{
    fn new_child_instance(&self, parent: &FileEntry, path: &Path) -> FileEntry {
        self(parent, path)
    }
}
