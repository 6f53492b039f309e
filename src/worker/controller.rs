// Worker thread lifecycle
//
// WorkerThreadManager owns at most one UI worker thread at a time. Start spawns it
// and waits for the worker to report either "ready" or "closed"; Stop runs the
// worker's shutdown hook and joins the thread. A transition lock serializes Start
// and Stop against each other.

use std::cell::Cell;
use std::fmt;
use std::num::NonZeroU64;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::{oneshot, watch};

use crate::error::{LifecycleError, ProgressBoxError, ResourceError};
use crate::metrics::Metrics;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Id of the manager whose worker runs on this thread, 0 elsewhere
    static WORKER_OF: Cell<u64> = const { Cell::new(0) };
}

/// Opaque, nonzero identifier of the live UI entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(NonZeroU64);

impl WindowHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A worker was already running; nothing was spawned
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// No worker was active
    AlreadyStopped,
}

/// Hooks run on the worker thread around its message loop
///
/// `before_run` fires once the UI entity is live, right before the loop starts;
/// `after_run` fires after the loop has exited and the entity is gone, and only if
/// `before_run` fired. The owner uses them to keep itself alive while a UI entity
/// is on screen.
pub trait RunHooks: Send + 'static {
    fn before_run(&mut self) {}
    fn after_run(&mut self) {}
}

impl RunHooks for () {}

/// Work that runs on the dedicated UI thread
pub trait ThreadWorker: Send + 'static {
    /// Build the UI entity, call [`ReadySignal::signal`] once it is live, then run
    /// the message loop until told to stop.
    ///
    /// Returning an error before signaling makes `start` fail with it.
    fn run(self, ready: &mut ReadySignal<'_>) -> Result<(), ResourceError>;

    /// Closure that asks a running worker to leave its loop. Called from the
    /// thread invoking `stop`.
    fn shutdown_hook(&self) -> Box<dyn FnOnce() + Send>;
}

enum StartupSignal {
    Ready,
    Closed(ResourceError),
}

/// Startup handshake handed to [`ThreadWorker::run`]
pub struct ReadySignal<'a> {
    startup: Option<oneshot::Sender<StartupSignal>>,
    window: &'a AtomicU64,
    hooks: &'a mut dyn RunHooks,
    signaled: bool,
}

impl ReadySignal<'_> {
    /// Publish the entity handle, run `before_run` and release the thread
    /// blocked in `start`. Later calls are ignored.
    pub fn signal(&mut self, handle: WindowHandle) {
        if self.signaled {
            return;
        }
        self.signaled = true;
        self.window.store(handle.get(), Ordering::Release);
        self.hooks.before_run();

        if let Some(tx) = self.startup.take() {
            let _ = tx.send(StartupSignal::Ready);
        }
    }
}

struct ActiveWorker {
    thread: JoinHandle<()>,
    closed: watch::Receiver<bool>,
    shutdown: Box<dyn FnOnce() + Send>,
}

impl ActiveWorker {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Spawns, tracks and joins the UI worker thread
///
/// # Blocking
///
/// `start` waits for the worker's handshake and `stop` waits for the thread to
/// exit. Neither wait has a timeout: a worker that hangs during startup or ignores
/// its shutdown hook blocks the caller indefinitely.
pub struct WorkerThreadManager {
    id: u64,
    thread_name: String,
    transition: Mutex<()>,
    active: Mutex<Option<ActiveWorker>>,
    window: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

impl WorkerThreadManager {
    pub fn new(thread_name: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            thread_name: thread_name.into(),
            transition: Mutex::new(()),
            active: Mutex::new(None),
            window: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveWorker>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when called from this manager's own worker thread.
    pub fn on_worker_thread(&self) -> bool {
        WORKER_OF.with(|current| current.get() == self.id)
    }

    fn ensure_not_worker_thread(&self) -> Result<(), LifecycleError> {
        if self.on_worker_thread() {
            return Err(LifecycleError::WorkerThreadReentry);
        }
        Ok(())
    }

    /// A worker is active and has not closed itself.
    pub fn is_running(&self) -> bool {
        self.active().as_ref().is_some_and(|w| !w.is_closed())
    }

    /// Handle of the live entity.
    ///
    /// The value may refer to an entity that is being torn down by a concurrent
    /// `stop`; callers must tolerate it going stale.
    pub fn window_handle(&self) -> Option<WindowHandle> {
        WindowHandle::new(self.window.load(Ordering::Acquire))
    }

    /// Spawn `worker` on a new thread unless one is already running.
    ///
    /// Blocks until the worker signals ready (returns `Started`) or closes
    /// first (returns the worker's startup error). A worker that closed itself
    /// earlier is joined before the new one is spawned.
    pub fn start<W, H>(&self, worker: W, hooks: H) -> Result<StartOutcome, ProgressBoxError>
    where
        W: ThreadWorker,
        H: RunHooks,
    {
        self.ensure_not_worker_thread()?;
        let _transition = self.transition();

        let stale = {
            let mut active = self.active();
            if active.as_ref().is_some_and(|w| !w.is_closed()) {
                tracing::debug!("Start requested while running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            active.take()
        };
        if let Some(stale) = stale {
            tracing::debug!("Reaping worker that closed itself");
            self.join(stale.thread);
        }

        let shutdown = worker.shutdown_hook();
        let (startup_tx, startup_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let body = {
            let id = self.id;
            let window = Arc::clone(&self.window);
            let metrics = Arc::clone(&self.metrics);
            move || run_worker_thread(id, worker, hooks, startup_tx, closed_tx, window, metrics)
        };

        let thread = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(body)
            .map_err(ResourceError::ThreadSpawn)?;
        self.metrics.record_worker_spawned();

        match startup_rx.blocking_recv() {
            Ok(StartupSignal::Ready) => {
                *self.active() = Some(ActiveWorker {
                    thread,
                    closed: closed_rx,
                    shutdown,
                });
                tracing::info!("UI worker started");
                Ok(StartOutcome::Started)
            }
            Ok(StartupSignal::Closed(err)) => {
                self.fail_startup(thread, &err);
                Err(err.into())
            }
            Err(_) => {
                let err = ResourceError::StartupFailed("worker exited without signaling".into());
                self.fail_startup(thread, &err);
                Err(err.into())
            }
        }
    }

    fn fail_startup(&self, thread: JoinHandle<()>, err: &ResourceError) {
        self.join(thread);
        self.metrics.record_startup_failure();
        tracing::error!("UI worker failed to start: {}", err);
    }

    /// Ask the worker to close and join its thread.
    ///
    /// Concurrent callers race to take the worker; the loser gets
    /// `AlreadyStopped`.
    pub fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        self.ensure_not_worker_thread()?;
        let _transition = self.transition();

        let Some(worker) = self.active().take() else {
            return Ok(StopOutcome::AlreadyStopped);
        };

        (worker.shutdown)();
        self.join(worker.thread);
        tracing::info!("UI worker stopped");
        Ok(StopOutcome::Stopped)
    }

    fn join(&self, thread: JoinHandle<()>) {
        if thread.join().is_err() {
            tracing::warn!("UI worker thread panicked outside its loop");
        }
        self.metrics.record_worker_joined();
    }
}

impl Drop for WorkerThreadManager {
    fn drop(&mut self) {
        let taken = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = taken else {
            return;
        };

        (worker.shutdown)();
        if self.on_worker_thread() {
            // Last owner released from inside the worker's own hooks; the thread
            // is already on its way out and cannot join itself
            tracing::debug!("Detaching UI worker thread during its own teardown");
            drop(worker.thread);
        } else {
            self.join(worker.thread);
        }
    }
}

fn run_worker_thread<W, H>(
    id: u64,
    worker: W,
    mut hooks: H,
    startup_tx: oneshot::Sender<StartupSignal>,
    closed_tx: watch::Sender<bool>,
    window: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
) where
    W: ThreadWorker,
    H: RunHooks,
{
    WORKER_OF.with(|current| current.set(id));
    tracing::debug!("UI worker thread started");

    let mut ready = ReadySignal {
        startup: Some(startup_tx),
        window: &window,
        hooks: &mut hooks,
        signaled: false,
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| worker.run(&mut ready)));
    let signaled = ready.signaled;
    let pending_startup = ready.startup.take();
    window.store(0, Ordering::Release);

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(_) => {
            metrics.record_worker_panic();
            tracing::warn!("UI worker loop panicked; treating as closed");
            Some(ResourceError::StartupFailed("worker panicked".into()))
        }
    };

    match (pending_startup, failure) {
        (Some(tx), Some(err)) => {
            let _ = tx.send(StartupSignal::Closed(err));
        }
        (Some(tx), None) => {
            let _ = tx.send(StartupSignal::Closed(ResourceError::StartupFailed(
                "worker closed before it was ready".into(),
            )));
        }
        (None, Some(err)) => tracing::warn!("UI worker ended with error: {}", err),
        (None, None) => {}
    }

    if signaled {
        hooks.after_run();
    }
    let _ = closed_tx.send(true);

    WORKER_OF.with(|current| current.set(0));
    tracing::debug!("UI worker thread finished");
}
