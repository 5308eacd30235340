//! Tree observer: snapshots a directory tree and reports what changed
//! between two scans.

use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::comparison::{NameComparison, file_name};
use crate::entry::{DefaultEntryFactory, EntryFactory, FileEntry};
use crate::error::{MonitorError, Result};
use crate::event::{EntryKind, FileEventKind};
use crate::filter::FileFilter;
use crate::fs::{FileSystem, OsFileSystem};
use crate::listener::{AlterationListener, dispatch};

/// Something a monitor can drive on its background loop.
pub trait Observer: Send + Sync {
    /// Root path being observed.
    fn root_path(&self) -> &Path;

    /// Capture the initial state without reporting anything.
    fn initialize(&self) -> Result<()>;

    /// Scan once and notify listeners of every difference since the last scan.
    fn check_and_notify(&self);

    /// Release any resources held by the observer.
    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

type ListenerList = Arc<Vec<Arc<dyn AlterationListener>>>;

/// Polling observer for one root path.
///
/// Each [`check_and_notify`](Observer::check_and_notify) call lists the tree
/// again and merges it against the previous snapshot:
///
/// - children of every directory are visited in comparator order;
/// - a new directory is reported before its contents;
/// - a deleted directory is reported after its contents;
/// - an existing entry is reported as changed when its existence, type,
///   modification time or length differ.
///
/// Entries are matched by name through the configured [`NameComparison`], so
/// under [`NameComparison::Insensitive`] a case-only rename is not an event.
pub struct FileAlterationObserver {
    root_path: PathBuf,
    root: Mutex<FileEntry>,
    filter: Option<Arc<dyn FileFilter>>,
    comparison: NameComparison,
    file_system: Arc<dyn FileSystem>,
    entry_factory: Arc<dyn EntryFactory>,
    listeners: RwLock<ListenerList>,
}

impl FileAlterationObserver {
    /// Create an observer for `root_path`. The path need not exist yet.
    pub fn new(root_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_root_entry(FileEntry::new(root_path))
    }

    /// Create an observer around a pre-built root entry.
    pub fn with_root_entry(root: FileEntry) -> Result<Self> {
        if root.path().as_os_str().is_empty() {
            return Err(MonitorError::EmptyRootPath);
        }

        Ok(Self {
            root_path: root.path().to_path_buf(),
            root: Mutex::new(root),
            filter: None,
            comparison: NameComparison::default(),
            file_system: Arc::new(OsFileSystem::new()),
            entry_factory: Arc::new(DefaultEntryFactory),
            listeners: RwLock::new(Arc::new(Vec::new())),
        })
    }

    /// Only track entries accepted by `filter`.
    pub fn with_filter(mut self, filter: impl FileFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Set how entry names are compared.
    pub fn with_comparison(mut self, comparison: NameComparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Read state through a different filesystem implementation.
    pub fn with_file_system(mut self, file_system: impl FileSystem + 'static) -> Self {
        self.file_system = Arc::new(file_system);
        self
    }

    /// Build child entries through a different factory.
    pub fn with_entry_factory(mut self, factory: impl EntryFactory + 'static) -> Self {
        self.entry_factory = Arc::new(factory);
        self
    }

    /// The configured name comparison.
    pub fn comparison(&self) -> NameComparison {
        self.comparison
    }

    /// Whether a file filter is configured.
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Register a listener. Safe to call while a scan is running; the
    /// listener sees events from the next scan on.
    pub fn add_listener(&self, listener: Arc<dyn AlterationListener>) {
        let mut guard = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Unregister every registration of `listener`. Unknown listeners are ignored.
    pub fn remove_listener<L>(&self, listener: &Arc<L>)
    where
        L: AlterationListener + ?Sized,
    {
        let target = Arc::as_ptr(listener).cast::<()>();
        let mut guard = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|l| Arc::as_ptr(l).cast::<()>() == target) {
            return;
        }
        let next = guard
            .iter()
            .filter(|l| Arc::as_ptr(*l).cast::<()>() != target)
            .cloned()
            .collect();
        *guard = Arc::new(next);
    }

    /// Snapshot of the registered listeners, in registration order.
    pub fn listeners(&self) -> ListenerList {
        Arc::clone(&self.listeners.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy of the current snapshot tree.
    ///
    /// Must not be called from a listener callback of this observer: the tree
    /// is locked for the duration of a scan.
    pub fn snapshot(&self) -> FileEntry {
        self.lock_root().clone()
    }

    fn lock_root(&self) -> MutexGuard<'_, FileEntry> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compare(&self, entry: &FileEntry, path: &Path) -> Ordering {
        self.comparison.compare(entry.name(), &file_name(path))
    }

    /// Immediate children of `path`, filtered and in comparator order.
    /// Listing failures yield no children.
    fn list_files(&self, path: &Path) -> Vec<PathBuf> {
        let mut children = match self.file_system.list(path) {
            Ok(children) => children,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Directory vanished during scan: {}", path.display());
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to list {}: {e}", path.display());
                return Vec::new();
            }
        };

        if let Some(filter) = &self.filter {
            children.retain(|child| filter.accept(child));
        }
        self.comparison.sort(&mut children);
        children
    }

    /// Build a refreshed entry for `path` with its whole subtree. No events.
    fn create_entry(&self, parent: &FileEntry, path: &Path) -> FileEntry {
        let mut entry = self.entry_factory.new_child_instance(parent, path);
        entry.refresh(self.file_system.as_ref(), path);
        let children = self.list_subtree(&entry);
        entry.set_children(children);
        entry
    }

    fn list_subtree(&self, entry: &FileEntry) -> Vec<FileEntry> {
        if !entry.is_directory() {
            return Vec::new();
        }
        self.list_files(entry.path())
            .iter()
            .map(|child| self.create_entry(entry, child))
            .collect()
    }

    /// Merge `current` (a fresh sorted listing) against the children of `parent`.
    fn reconcile(&self, scan: &mut Scan<'_>, parent: &mut FileEntry, current: Vec<PathBuf>) {
        let previous = parent.take_children();
        let mut reconciled = Vec::with_capacity(current.len());
        let mut current = current.into_iter().peekable();

        for mut entry in previous {
            while let Some(path) =
                current.next_if(|path| self.compare(&entry, path) == Ordering::Greater)
            {
                let created = self.create_entry(parent, &path);
                scan.created(&created);
                reconciled.push(created);
            }

            if let Some(path) =
                current.next_if(|path| self.compare(&entry, path) == Ordering::Equal)
            {
                self.matched(scan, &mut entry, &path);
                reconciled.push(entry);
            } else {
                self.reconcile(scan, &mut entry, Vec::new());
                scan.deleted(&entry);
            }
        }

        for path in current {
            let created = self.create_entry(parent, &path);
            scan.created(&created);
            reconciled.push(created);
        }

        parent.set_children(reconciled);
    }

    fn matched(&self, scan: &mut Scan<'_>, entry: &mut FileEntry, path: &Path) {
        if entry.refresh(self.file_system.as_ref(), path) {
            scan.changed(entry);
        }

        let current = if entry.is_directory() {
            self.list_files(path)
        } else {
            Vec::new()
        };
        self.reconcile(scan, entry, current);
    }
}

impl Observer for FileAlterationObserver {
    fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn initialize(&self) -> Result<()> {
        let mut root = self.lock_root();
        root.refresh(self.file_system.as_ref(), &self.root_path);
        let children = self.list_subtree(&root);
        root.set_children(children);

        debug!(
            "Initialized observer for {} ({} entries)",
            self.root_path.display(),
            root.descendant_count()
        );
        Ok(())
    }

    fn check_and_notify(&self) {
        let listeners = self.listeners();
        for listener in listeners.iter() {
            listener.on_start(self);
        }

        let start = Instant::now();
        let mut scan = Scan::new(&listeners);
        {
            let mut root = self.lock_root();
            let existed = root.exists();
            root.refresh(self.file_system.as_ref(), &self.root_path);

            if root.exists() {
                let current = if root.is_directory() {
                    self.list_files(&self.root_path)
                } else {
                    Vec::new()
                };
                self.reconcile(&mut scan, &mut root, current);
            } else if existed {
                self.reconcile(&mut scan, &mut root, Vec::new());
            }
        }

        debug!(
            "Scanned {} in {:?} (created: {}, changed: {}, deleted: {})",
            self.root_path.display(),
            start.elapsed(),
            scan.created,
            scan.changed,
            scan.deleted
        );

        for listener in listeners.iter() {
            listener.on_stop(self);
        }
    }
}

impl fmt::Debug for FileAlterationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAlterationObserver")
            .field("root_path", &self.root_path)
            .field("comparison", &self.comparison)
            .field("has_filter", &self.filter.is_some())
            .field("listeners", &self.listeners().len())
            .finish()
    }
}

/// Per-scan dispatch state.
struct Scan<'a> {
    listeners: &'a [Arc<dyn AlterationListener>],
    created: usize,
    changed: usize,
    deleted: usize,
}

impl<'a> Scan<'a> {
    fn new(listeners: &'a [Arc<dyn AlterationListener>]) -> Self {
        Self {
            listeners,
            created: 0,
            changed: 0,
            deleted: 0,
        }
    }

    fn fire(&self, kind: FileEventKind, entry: &FileEntry) {
        let entry_kind = if entry.is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        trace!("{kind:?} {entry_kind:?}: {}", entry.path().display());

        for listener in self.listeners {
            dispatch(listener.as_ref(), kind, entry_kind, entry.path());
        }
    }

    /// Report `entry` and then, depth first, everything beneath it.
    fn created(&mut self, entry: &FileEntry) {
        self.created += 1;
        self.fire(FileEventKind::Created, entry);
        for child in entry.children() {
            self.created(child);
        }
    }

    fn changed(&mut self, entry: &FileEntry) {
        self.changed += 1;
        self.fire(FileEventKind::Changed, entry);
    }

    fn deleted(&mut self, entry: &FileEntry) {
        self.deleted += 1;
        self.fire(FileEventKind::Deleted, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FileEvent;
    use crate::filter::GlobFilter;
    use crate::fs::EntryState;
    use crate::listener::EventCollector;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn observe(dir: &TempDir) -> (FileAlterationObserver, Arc<EventCollector>) {
        let observer = FileAlterationObserver::new(dir.path())
            .unwrap()
            .with_comparison(NameComparison::Sensitive);
        let collector = Arc::new(EventCollector::new());
        observer.add_listener(collector.clone());
        observer.initialize().unwrap();
        (observer, collector)
    }

    fn summary(dir: &TempDir, events: Vec<FileEvent>) -> Vec<(FileEventKind, EntryKind, String)> {
        events
            .into_iter()
            .map(|e| {
                let relative = e.path.strip_prefix(dir.path()).unwrap();
                (e.kind, e.entry, relative.to_string_lossy().into_owned())
            })
            .collect()
    }

    fn bump_mtime(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        let modified = file.metadata().unwrap().modified().unwrap();
        file.set_modified(modified + by).unwrap();
    }

    #[test]
    fn test_empty_root_path_rejected() {
        let result = FileAlterationObserver::new("");
        assert!(matches!(result, Err(MonitorError::EmptyRootPath)));
    }

    #[test]
    fn test_initialize_reports_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("existing.txt"), "x").unwrap();
        let (observer, collector) = observe(&dir);

        observer.check_and_notify();

        assert!(collector.is_empty());
        assert_eq!(observer.snapshot().children().len(), 1);
    }

    #[test]
    fn test_unchanged_tree_fires_only_start_and_stop() {
        #[derive(Default)]
        struct Counting {
            starts: AtomicUsize,
            stops: AtomicUsize,
            events: AtomicUsize,
        }
        impl AlterationListener for Counting {
            fn on_start(&self, _observer: &dyn Observer) {
                self.starts.fetch_add(1, AtomicOrdering::SeqCst);
            }
            fn on_file_create(&self, _path: &Path) {
                self.events.fetch_add(1, AtomicOrdering::SeqCst);
            }
            fn on_file_change(&self, _path: &Path) {
                self.events.fetch_add(1, AtomicOrdering::SeqCst);
            }
            fn on_file_delete(&self, _path: &Path) {
                self.events.fetch_add(1, AtomicOrdering::SeqCst);
            }
            fn on_stop(&self, _observer: &dyn Observer) {
                self.stops.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let observer = FileAlterationObserver::new(dir.path()).unwrap();
        let counting = Arc::new(Counting::default());
        observer.add_listener(counting.clone());
        observer.initialize().unwrap();

        observer.check_and_notify();
        observer.check_and_notify();

        assert_eq!(counting.starts.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(counting.stops.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(counting.events.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_file_create_detected_once() {
        let dir = TempDir::new().unwrap();
        let (observer, collector) = observe(&dir);

        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        observer.check_and_notify();

        assert_eq!(
            summary(&dir, collector.events()),
            vec![(FileEventKind::Created, EntryKind::File, "a.txt".to_string())]
        );

        observer.check_and_notify();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_file_delete_detected_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let (observer, collector) = observe(&dir);

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        observer.check_and_notify();

        assert_eq!(
            summary(&dir, collector.events()),
            vec![(FileEventKind::Deleted, EntryKind::File, "a.txt".to_string())]
        );
        assert!(observer.snapshot().children().is_empty());

        observer.check_and_notify();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_change_requires_mtime_or_length_difference() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "same").unwrap();
        let (observer, collector) = observe(&dir);

        // Same content, same length, mtime restored.
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        std::fs::write(&path, "same").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        observer.check_and_notify();
        assert!(collector.is_empty());

        bump_mtime(&path, Duration::from_secs(2));
        observer.check_and_notify();
        assert_eq!(
            summary(&dir, collector.events()),
            vec![(FileEventKind::Changed, EntryKind::File, "a.txt".to_string())]
        );
    }

    #[test]
    fn test_sibling_creates_follow_comparator_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m.txt"), "").unwrap();
        let (observer, collector) = observe(&dir);

        for name in ["z.txt", "b.txt", "a.txt", "y.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        observer.check_and_notify();

        let names: Vec<_> = summary(&dir, collector.events())
            .into_iter()
            .map(|(_, _, name)| name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "y.txt", "z.txt"]);
    }

    #[test]
    fn test_created_directory_reported_before_contents() {
        let dir = TempDir::new().unwrap();
        let (observer, collector) = observe(&dir);

        std::fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        std::fs::write(dir.path().join("sub/file.txt"), "x").unwrap();
        std::fs::write(dir.path().join("sub/inner/deep.txt"), "y").unwrap();
        observer.check_and_notify();

        assert_eq!(
            summary(&dir, collector.events()),
            vec![
                (FileEventKind::Created, EntryKind::Directory, "sub".to_string()),
                (FileEventKind::Created, EntryKind::File, "sub/file.txt".to_string()),
                (FileEventKind::Created, EntryKind::Directory, "sub/inner".to_string()),
                (FileEventKind::Created, EntryKind::File, "sub/inner/deep.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_deleted_directory_reported_after_contents() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        std::fs::write(dir.path().join("sub/file.txt"), "x").unwrap();
        std::fs::write(dir.path().join("sub/inner/deep.txt"), "y").unwrap();
        let (observer, collector) = observe(&dir);

        std::fs::remove_dir_all(dir.path().join("sub")).unwrap();
        observer.check_and_notify();

        assert_eq!(
            summary(&dir, collector.events()),
            vec![
                (FileEventKind::Deleted, EntryKind::File, "sub/file.txt".to_string()),
                (FileEventKind::Deleted, EntryKind::File, "sub/inner/deep.txt".to_string()),
                (FileEventKind::Deleted, EntryKind::Directory, "sub/inner".to_string()),
                (FileEventKind::Deleted, EntryKind::Directory, "sub".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested_change_is_found() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let path = dir.path().join("sub/a.txt");
        std::fs::write(&path, "short").unwrap();
        let (observer, collector) = observe(&dir);

        std::fs::write(&path, "a longer body").unwrap();
        observer.check_and_notify();

        let events = summary(&dir, collector.events());
        assert!(events.contains(&(
            FileEventKind::Changed,
            EntryKind::File,
            "sub/a.txt".to_string()
        )));
        assert!(
            events
                .iter()
                .all(|(kind, _, _)| *kind == FileEventKind::Changed)
        );
    }

    #[test]
    fn test_filter_excludes_entries() {
        let dir = TempDir::new().unwrap();
        let observer = FileAlterationObserver::new(dir.path())
            .unwrap()
            .with_filter(GlobFilter::new(["**/*.tmp"]).unwrap().relative_to(dir.path()));
        let collector = Arc::new(EventCollector::new());
        observer.add_listener(collector.clone());
        observer.initialize().unwrap();

        std::fs::write(dir.path().join("keep.txt"), "").unwrap();
        std::fs::write(dir.path().join("scratch.tmp"), "").unwrap();
        observer.check_and_notify();

        assert_eq!(
            summary(&dir, collector.events()),
            vec![(FileEventKind::Created, EntryKind::File, "keep.txt".to_string())]
        );
        let snapshot = observer.snapshot();
        assert!(snapshot.find(&dir.path().join("scratch.tmp")).is_none());
        assert!(snapshot.find(&dir.path().join("keep.txt")).is_some());
    }

    #[test]
    fn test_case_only_rename_is_not_an_event_when_insensitive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("A.TXT"), "content").unwrap();
        let observer = FileAlterationObserver::new(dir.path())
            .unwrap()
            .with_comparison(NameComparison::Insensitive);
        let collector = Arc::new(EventCollector::new());
        observer.add_listener(collector.clone());
        observer.initialize().unwrap();

        std::fs::rename(dir.path().join("A.TXT"), dir.path().join("a.txt")).unwrap();
        observer.check_and_notify();

        assert!(
            collector
                .events()
                .iter()
                .all(|e| e.kind == FileEventKind::Changed),
            "no create/delete pair expected: {:?}",
            collector.events()
        );
        assert_eq!(observer.snapshot().children()[0].name(), "a.txt");
    }

    #[test]
    fn test_root_deleted_cascades() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "").unwrap();

        let observer = FileAlterationObserver::new(&root).unwrap();
        let collector = Arc::new(EventCollector::new());
        observer.add_listener(collector.clone());
        observer.initialize().unwrap();

        std::fs::remove_dir_all(&root).unwrap();
        observer.check_and_notify();

        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FileEventKind::Deleted);
        assert_eq!(events[0].path, root.join("a.txt"));

        observer.check_and_notify();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_root_created_after_initialize() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("later");
        let observer = FileAlterationObserver::new(&root).unwrap();
        let collector = Arc::new(EventCollector::new());
        observer.add_listener(collector.clone());
        observer.initialize().unwrap();

        observer.check_and_notify();
        assert!(collector.is_empty());

        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("new.txt"), "").unwrap();
        observer.check_and_notify();

        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, root.join("new.txt"));
    }

    #[test]
    fn test_file_replaced_by_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node");
        std::fs::write(&path, "file").unwrap();
        let (observer, collector) = observe(&dir);

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("child.txt"), "").unwrap();
        observer.check_and_notify();

        assert_eq!(
            summary(&dir, collector.events()),
            vec![
                (FileEventKind::Changed, EntryKind::Directory, "node".to_string()),
                (FileEventKind::Created, EntryKind::File, "node/child.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_remove_listener_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (observer, collector) = observe(&dir);
        let never_added = Arc::new(EventCollector::new());

        observer.remove_listener(&never_added);
        observer.remove_listener(&collector);
        observer.remove_listener(&collector);

        assert!(observer.listeners().is_empty());

        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        observer.check_and_notify();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_every_listener_sees_every_event() {
        let dir = TempDir::new().unwrap();
        let (observer, first) = observe(&dir);
        let second = Arc::new(EventCollector::new());
        observer.add_listener(second.clone());

        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        observer.check_and_notify();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_listener_added_during_scan_does_not_deadlock() {
        struct Adder {
            observer: std::sync::Weak<FileAlterationObserver>,
            added: Arc<EventCollector>,
        }
        impl AlterationListener for Adder {
            fn on_file_create(&self, _path: &Path) {
                if let Some(observer) = self.observer.upgrade() {
                    observer.add_listener(self.added.clone());
                }
            }
        }

        let dir = TempDir::new().unwrap();
        let observer = Arc::new(FileAlterationObserver::new(dir.path()).unwrap());
        observer.initialize().unwrap();
        let added = Arc::new(EventCollector::new());
        observer.add_listener(Arc::new(Adder {
            observer: Arc::downgrade(&observer),
            added: added.clone(),
        }));

        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        observer.check_and_notify();

        assert_eq!(observer.listeners().len(), 2);
    }

    /// Filesystem that refuses to list one directory while `locked` is set.
    struct Unreadable {
        inner: OsFileSystem,
        blocked: PathBuf,
        locked: Arc<AtomicBool>,
    }

    impl Unreadable {
        fn new(blocked: &Path) -> (Self, Arc<AtomicBool>) {
            let locked = Arc::new(AtomicBool::new(true));
            let fs = Self {
                inner: OsFileSystem::new(),
                blocked: blocked.to_path_buf(),
                locked: locked.clone(),
            };
            (fs, locked)
        }
    }

    impl FileSystem for Unreadable {
        fn state(&self, path: &Path) -> EntryState {
            self.inner.state(path)
        }

        fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            if path == self.blocked && self.locked.load(AtomicOrdering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "blocked"));
            }
            self.inner.list(path)
        }
    }

    #[test]
    fn test_listing_failure_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("secret.txt"), "").unwrap();
        std::fs::write(dir.path().join("open.txt"), "").unwrap();

        let (fs, _) = Unreadable::new(&locked);
        let observer = FileAlterationObserver::new(dir.path())
            .unwrap()
            .with_file_system(fs);
        observer.initialize().unwrap();

        let snapshot = observer.snapshot();
        assert!(snapshot.find(&locked).is_some());
        assert!(snapshot.find(&locked.join("secret.txt")).is_none());
        assert!(snapshot.find(&dir.path().join("open.txt")).is_some());
    }

    #[test]
    fn test_listing_failure_during_scan_deletes_then_recreates() {
        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("secret.txt"), "").unwrap();

        let (fs, is_locked) = Unreadable::new(&locked);
        is_locked.store(false, AtomicOrdering::SeqCst);
        let observer = FileAlterationObserver::new(dir.path())
            .unwrap()
            .with_file_system(fs);
        let collector = Arc::new(EventCollector::new());
        observer.add_listener(collector.clone());
        observer.initialize().unwrap();
        assert!(observer.snapshot().find(&locked.join("secret.txt")).is_some());

        is_locked.store(true, AtomicOrdering::SeqCst);
        observer.check_and_notify();
        assert_eq!(
            summary(&dir, collector.events()),
            vec![(FileEventKind::Deleted, EntryKind::File, "locked/secret.txt".to_string())]
        );
        assert!(observer.snapshot().find(&locked).is_some());

        is_locked.store(false, AtomicOrdering::SeqCst);
        observer.check_and_notify();
        assert_eq!(
            summary(&dir, collector.events()),
            vec![(FileEventKind::Created, EntryKind::File, "locked/secret.txt".to_string())]
        );
    }

    #[test]
    fn test_custom_entry_factory_is_used() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "").unwrap();

        let observer = FileAlterationObserver::new(dir.path())
            .unwrap()
            .with_entry_factory(move |parent: &FileEntry, path: &Path| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                parent.new_child_instance(path)
            });
        observer.initialize().unwrap();

        assert_eq!(built.load(AtomicOrdering::SeqCst), 2);
        let snapshot = observer.snapshot();
        let nested = snapshot.find(&dir.path().join("sub/a.txt")).unwrap();
        assert_eq!(nested.depth(), 2);
    }
}
