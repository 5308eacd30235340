//! Background loop driving observers at a fixed interval.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::observer::Observer;

/// Interval used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

const THREAD_NAME: &str = "file-alteration-monitor";

/// Strategy for configuring the monitor's background thread.
///
/// Any `Fn() -> std::thread::Builder + Send + Sync` closure is a factory.
pub trait ThreadFactory: Send + Sync {
    /// Builder used to spawn the loop thread.
    fn new_thread(&self) -> thread::Builder;
}

impl<F> ThreadFactory for F
where
    F: Fn() -> thread::Builder + Send + Sync,
{
    fn new_thread(&self) -> thread::Builder {
        self()
    }
}

/// Spawns a thread named `file-alteration-monitor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultThreadFactory;

impl ThreadFactory for DefaultThreadFactory {
    fn new_thread(&self) -> thread::Builder {
        thread::Builder::new().name(THREAD_NAME.to_string())
    }
}

type ObserverList = Arc<Vec<Arc<dyn Observer>>>;

/// Runs every registered observer's scan on one background thread, sleeping
/// `interval` between passes.
///
/// The interval is the minimum gap between the end of one pass and the start
/// of the next; a slow scan delays the following one. `stop` never
/// interrupts a scan in progress, only the sleep after it.
pub struct FileAlterationMonitor {
    interval: Duration,
    observers: Arc<RwLock<ObserverList>>,
    running: Arc<AtomicBool>,
    thread_factory: Arc<dyn ThreadFactory>,
    worker: Mutex<WorkerSlot>,
}

/// Loop thread bookkeeping. Held locked for the whole of `start` and `stop`.
enum WorkerSlot {
    Idle,
    Running(Worker),
    /// A stop timed out; the thread is still finishing its last pass.
    Detached(mpsc::Receiver<()>),
}

/// Handles to a running loop thread.
struct Worker {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
    /// Disconnects when the loop thread exits, even by panic.
    exited_rx: mpsc::Receiver<()>,
}

impl FileAlterationMonitor {
    /// Create a monitor with no observers.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            observers: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            running: Arc::new(AtomicBool::new(false)),
            thread_factory: Arc::new(DefaultThreadFactory),
            worker: Mutex::new(WorkerSlot::Idle),
        }
    }

    /// Create a monitor with an initial set of observers.
    pub fn with_observers<I>(interval: Duration, observers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Observer>>,
    {
        let monitor = Self::new(interval);
        *monitor.observers.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(observers.into_iter().collect());
        monitor
    }

    /// Spawn the loop thread through `factory`.
    pub fn with_thread_factory(mut self, factory: impl ThreadFactory + 'static) -> Self {
        self.thread_factory = Arc::new(factory);
        self
    }

    /// Time slept between passes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the loop thread has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register an observer. If the monitor is running it is scanned from the
    /// next pass on; it is not initialized automatically, so entries that
    /// already exist are reported as created unless the caller initializes it
    /// first.
    pub fn add_observer(&self, observer: Arc<dyn Observer>) {
        info!("Adding observer for {}", observer.root_path().display());
        let mut guard = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&guard);
        next.push(observer);
        *guard = Arc::new(next);
    }

    /// Unregister every registration of `observer`. Unknown observers are ignored.
    pub fn remove_observer<O>(&self, observer: &Arc<O>)
    where
        O: Observer + ?Sized,
    {
        let target = Arc::as_ptr(observer).cast::<()>();
        let mut guard = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let next: Vec<_> = guard
            .iter()
            .filter(|o| Arc::as_ptr(*o).cast::<()>() != target)
            .cloned()
            .collect();
        if next.len() != guard.len() {
            info!("Removed observer for {}", observer.root_path().display());
            *guard = Arc::new(next);
        }
    }

    /// Snapshot of the registered observers, in registration order.
    pub fn observers(&self) -> ObserverList {
        Arc::clone(&self.observers.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_worker(&self) -> MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize every observer and start the loop thread.
    ///
    /// If an observer fails to initialize, no thread is spawned and the
    /// monitor stays stopped. After a timed-out stop this fails with
    /// `AlreadyRunning` until the detached thread has exited.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.lock_worker();
        let busy = match &*worker {
            WorkerSlot::Idle => false,
            WorkerSlot::Running(_) => true,
            WorkerSlot::Detached(exited_rx) => {
                !matches!(exited_rx.try_recv(), Err(TryRecvError::Disconnected))
            }
        };
        if busy {
            return Err(MonitorError::AlreadyRunning);
        }

        let observers = self.observers();
        for observer in observers.iter() {
            observer
                .initialize()
                .map_err(|e| MonitorError::Initialize {
                    path: observer.root_path().to_path_buf(),
                    source: Box::new(e),
                })?;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (exited_tx, exited_rx) = mpsc::channel();
        let scan_loop = ScanLoop {
            interval: self.interval,
            observers: Arc::clone(&self.observers),
            running: Arc::clone(&self.running),
            shutdown_rx,
            _exited_tx: exited_tx,
        };

        self.running.store(true, Ordering::SeqCst);
        let handle = match self.thread_factory.new_thread().spawn(move || scan_loop.run()) {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                if let Err(destroy_err) = destroy_all(&observers) {
                    warn!("Failed to release observers after spawn failure: {destroy_err}");
                }
                return Err(MonitorError::ThreadSpawn(e));
            }
        };

        *worker = WorkerSlot::Running(Worker {
            handle,
            shutdown_tx,
            exited_rx,
        });
        info!(
            "File alteration monitor started ({} observers, interval {:?})",
            observers.len(),
            self.interval
        );
        Ok(())
    }

    /// Stop the loop, waiting as long as it takes for the current pass to
    /// finish, then destroy every observer.
    pub fn stop(&self) -> Result<()> {
        self.stop_with_timeout(Duration::ZERO)
    }

    /// Stop the loop, waiting at most `timeout` for the thread to exit
    /// (`Duration::ZERO` waits indefinitely), then destroy every observer.
    ///
    /// Observers are destroyed even if the thread did not exit in time. The
    /// first destroy failure is returned after all observers were destroyed.
    pub fn stop_with_timeout(&self, timeout: Duration) -> Result<()> {
        let mut slot = self.lock_worker();
        let worker = match std::mem::replace(&mut *slot, WorkerSlot::Idle) {
            WorkerSlot::Running(worker) => worker,
            other => {
                *slot = other;
                return Err(MonitorError::NotRunning);
            }
        };

        self.running.store(false, Ordering::SeqCst);
        // The loop may already be gone; a closed channel is fine.
        let _ = worker.shutdown_tx.send(());

        let exited = if timeout.is_zero() {
            // Nothing is ever sent: this returns once the thread drops its sender.
            let _ = worker.exited_rx.recv();
            true
        } else {
            !matches!(
                worker.exited_rx.recv_timeout(timeout),
                Err(RecvTimeoutError::Timeout)
            )
        };

        if exited {
            if worker.handle.join().is_err() {
                warn!("File alteration monitor thread panicked");
            }
        } else {
            warn!("File alteration monitor thread did not stop within {timeout:?}, detaching");
            *slot = WorkerSlot::Detached(worker.exited_rx);
        }

        let result = destroy_all(&self.observers());
        info!("File alteration monitor stopped");
        result
    }
}

impl Default for FileAlterationMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Drop for FileAlterationMonitor {
    fn drop(&mut self) {
        if matches!(*self.lock_worker(), WorkerSlot::Running(_)) {
            if let Err(e) = self.stop() {
                warn!("Failed to stop file alteration monitor on drop: {e}");
            }
        }
    }
}

impl fmt::Debug for FileAlterationMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAlterationMonitor")
            .field("interval", &self.interval)
            .field("observers", &self.observers().len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Destroy every observer, returning the first failure.
fn destroy_all(observers: &[Arc<dyn Observer>]) -> Result<()> {
    let mut first_error = None;
    for observer in observers {
        if let Err(e) = observer.destroy() {
            warn!(
                "Failed to destroy observer for {}: {e}",
                observer.root_path().display()
            );
            first_error.get_or_insert(MonitorError::Destroy {
                path: observer.root_path().to_path_buf(),
                source: Box::new(e),
            });
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// State moved onto the loop thread.
struct ScanLoop {
    interval: Duration,
    observers: Arc<RwLock<ObserverList>>,
    running: Arc<AtomicBool>,
    shutdown_rx: mpsc::Receiver<()>,
    _exited_tx: mpsc::Sender<()>,
}

impl ScanLoop {
    fn run(self) {
        debug!("Monitor loop running");

        while self.running.load(Ordering::SeqCst) {
            let observers =
                Arc::clone(&self.observers.read().unwrap_or_else(PoisonError::into_inner));
            for observer in observers.iter() {
                observer.check_and_notify();
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match self.shutdown_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("Monitor loop exiting");
    }
}
