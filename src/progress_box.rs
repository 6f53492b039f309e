//! The progress box facade.
//!
//! [`ProgressBox`] is what hosts hold. It composes the shared state, the worker
//! thread manager, the control channel and the cancel broker:
//!
//! ```text
//! caller thread ──set_*──► SharedState ──StateChange──► ControlMessage ──► UI worker ──► view
//!                                                                            │
//! caller thread ◄──canceled()── SharedState ◄──mark_canceled── EventBroker ◄─┘ user cancel
//! ```
//!
//! # Sessions
//!
//! Before the first `start`, setters stage values that the view picks up when it
//! is created. After `stop`, the last values are kept as a read-only snapshot:
//! getters keep working, `start` and `set_caption` open a fresh session seeded from
//! the configured defaults, and every other mutator fails with
//! [`LifecycleError::NotRunning`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

use crate::error::{LifecycleError, Result};
use crate::events::{ConnectionPoint, ConnectionPointEnumerator, EventBroker, EventKind};
use crate::metrics::Metrics;
use crate::models::{
    BarColor, BoxConfig, BoxDefaults, MoveFlag, MoveRequest, ProgressInfo, RangeBound,
    StartOptions, TextField,
};
use crate::registry::{ObjectRegistry, RegistryGuard};
use crate::state::{CHANGE_CHANNEL_CAPACITY, SharedState, StateChange};
use crate::ui::ViewFactory;
use crate::worker::{
    ControlChannel, ControlMessage, RunHooks, StartOutcome, StopOutcome, UiWorker, WindowHandle,
    WorkerThreadManager,
};

const WORKER_THREAD_NAME: &str = "progressbox-ui";

enum Session {
    /// Values are being staged or shown
    Live(SharedState),
    /// Snapshot taken at the last stop
    Retired(ProgressInfo),
}

// Field order matters: the worker manager is dropped (and its thread stopped)
// before anything else, the registry guard last.
struct Inner {
    controller: WorkerThreadManager,
    lifecycle: Mutex<()>,
    session: Mutex<Session>,
    channel: Mutex<Option<ControlChannel>>,
    broker: EventBroker,
    factory: Arc<dyn ViewFactory>,
    defaults: BoxDefaults,
    metrics: Arc<Metrics>,
    change_tx: broadcast::Sender<StateChange>,
    self_ref: Weak<Inner>,
    _registration: RegistryGuard,
}

/// Keeps the box alive while its view is on screen, even if every handle the
/// host held has been dropped.
struct LifetimePin {
    owner: Weak<Inner>,
    pinned: Option<Arc<Inner>>,
}

impl RunHooks for LifetimePin {
    fn before_run(&mut self) {
        self.pinned = self.owner.upgrade();
    }

    fn after_run(&mut self) {
        // May drop the last reference; the manager then detaches this thread
        self.pinned.take();
    }
}

/// A modeless progress box driven from any thread
///
/// Cloning yields another handle to the same box. All methods may be called
/// from any thread.
///
/// While a view is on screen the box keeps itself alive; call [`stop`](Self::stop)
/// to take it down.
///
/// # Example
/// ```ignore
/// let registry = ObjectRegistry::new();
/// let factory = Arc::new(ConsoleViewFactory::stdout());
/// let progress = ProgressBox::new(factory, BoxConfig::default(), &registry);
///
/// progress.set_caption("Copying")?;
/// progress.start(StartOptions::APPEND_TO_NOTE, 0)?;
/// for file in files {
///     if progress.canceled() {
///         break;
///     }
///     progress.set_note(&file)?;
///     progress.increment(None)?;
/// }
/// progress.stop()?;
/// ```
#[derive(Clone)]
pub struct ProgressBox {
    inner: Arc<Inner>,
}

impl ProgressBox {
    pub fn new(
        factory: Arc<dyn ViewFactory>,
        config: BoxConfig,
        registry: &Arc<ObjectRegistry>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let initial = SharedState::with_channel(config.defaults.initial_state(), change_tx.clone());

        let inner = Arc::new_cyclic(|self_ref| Inner {
            controller: WorkerThreadManager::new(WORKER_THREAD_NAME, Arc::clone(&metrics)),
            lifecycle: Mutex::new(()),
            session: Mutex::new(Session::Live(initial)),
            channel: Mutex::new(None),
            broker: EventBroker::new(config.cancel_fan_out),
            factory,
            defaults: config.defaults,
            metrics,
            change_tx,
            self_ref: self_ref.clone(),
            _registration: registry.register(),
        });

        Self { inner }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn channel(&self) -> MutexGuard<'_, Option<ControlChannel>> {
        self.inner
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_state(&self) -> SharedState {
        SharedState::with_channel(self.inner.defaults.initial_state(), self.inner.change_tx.clone())
    }

    fn ensure_not_worker_thread(&self) -> Result<()> {
        if self.inner.controller.on_worker_thread() {
            return Err(LifecycleError::WorkerThreadReentry.into());
        }
        Ok(())
    }

    /// Live state, reopening a retired session.
    fn reopen(&self) -> SharedState {
        let mut session = self.session();
        if let Session::Live(state) = &*session {
            return state.clone();
        }
        tracing::debug!("Opening a new session from defaults");
        let state = self.fresh_state();
        *session = Session::Live(state.clone());
        state
    }

    fn read<R>(&self, f: impl FnOnce(&ProgressInfo) -> R) -> R {
        match &*self.session() {
            Session::Live(state) => state.read(f),
            Session::Retired(info) => f(info),
        }
    }

    /// Write through the live session, then forward the changes to the worker.
    fn mutate(&self, write: impl FnOnce(&SharedState) -> Vec<StateChange>) -> Result<()> {
        let changes = match &*self.session() {
            Session::Live(state) => write(state),
            Session::Retired(_) => return Err(LifecycleError::NotRunning.into()),
        };
        self.dispatch(&changes);
        Ok(())
    }

    fn dispatch(&self, changes: &[StateChange]) {
        if changes.is_empty() {
            return;
        }
        let channel = {
            let mut slot = self.channel();
            if slot.as_ref().is_some_and(ControlChannel::is_closed) {
                tracing::debug!("UI worker closed itself, changes stay in shared state");
                *slot = None;
            }
            slot.clone()
        };
        let Some(channel) = channel else {
            return;
        };
        for message in changes.iter().filter_map(control_message) {
            channel.post(message);
        }
    }

    // Lifecycle

    /// Show the box, spawning its UI worker.
    ///
    /// Non-empty `options` replace the stored option set and clear the cancel
    /// flag; in marquee mode `marquee_interval` (milliseconds, 0 for the view's
    /// default) is stored too. If the box is already running the new options are
    /// applied to the live view and `AlreadyRunning` is returned.
    ///
    /// Blocks until the view is up or has failed to come up.
    pub fn start(&self, options: StartOptions, marquee_interval: u32) -> Result<StartOutcome> {
        self.ensure_not_worker_thread()?;
        let _lifecycle = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let state = self.reopen();
        let changes = if options.is_empty() {
            Vec::new()
        } else {
            state.apply_start_options(options, marquee_interval)
        };

        if self.inner.controller.is_running() {
            self.dispatch(&changes);
            return Ok(StartOutcome::AlreadyRunning);
        }

        let (channel, receiver) = ControlChannel::new(Arc::clone(&self.inner.metrics));
        let worker = UiWorker::new(
            Arc::clone(&self.inner.factory),
            state,
            self.inner.broker.clone(),
            &channel,
            receiver,
            Arc::clone(&self.inner.metrics),
        );
        // Setters racing with startup queue behind initialization
        *self.channel() = Some(channel);

        let pin = LifetimePin {
            owner: self.inner.self_ref.clone(),
            pinned: None,
        };
        match self.inner.controller.start(worker, pin) {
            Ok(outcome) => {
                tracing::info!("Progress box started with {:?}", options);
                Ok(outcome)
            }
            Err(err) => {
                *self.channel() = None;
                Err(err)
            }
        }
    }

    /// Close the box and join its worker. The last values stay readable.
    pub fn stop(&self) -> Result<StopOutcome> {
        self.ensure_not_worker_thread()?;
        let _lifecycle = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let outcome = self.inner.controller.stop()?;
        if outcome == StopOutcome::Stopped {
            *self.channel() = None;
            let mut session = self.session();
            let snapshot = match &*session {
                Session::Live(state) => Some(state.snapshot()),
                Session::Retired(_) => None,
            };
            if let Some(snapshot) = snapshot {
                *session = Session::Retired(snapshot);
            }
            tracing::info!("Progress box stopped");
        }
        Ok(outcome)
    }

    /// The UI worker is up and its view has not closed itself.
    pub fn is_running(&self) -> bool {
        self.inner.controller.is_running()
    }

    /// Handle of the live view, if any. May go stale concurrently with `stop`.
    pub fn window_handle(&self) -> Option<WindowHandle> {
        self.inner.controller.window_handle()
    }

    // Text fields

    pub fn caption(&self) -> String {
        self.read(|s| s.caption.clone())
    }

    /// Set the caption. After a stop this opens a new session.
    pub fn set_caption(&self, text: &str) -> Result<()> {
        let changes = self.reopen().set_caption(text);
        self.dispatch(&changes);
        Ok(())
    }

    pub fn message(&self) -> String {
        self.read(|s| s.message.clone())
    }

    pub fn set_message(&self, text: &str) -> Result<()> {
        self.mutate(|s| s.set_message(text))
    }

    pub fn note(&self) -> String {
        self.read(|s| s.note.as_str().to_owned())
    }

    /// Replace the note, or append a line with [`StartOptions::APPEND_TO_NOTE`].
    pub fn set_note(&self, text: &str) -> Result<()> {
        self.mutate(|s| s.set_note(text))
    }

    // Progress

    pub fn lower_bound(&self) -> i32 {
        self.read(|s| s.lower_bound)
    }

    pub fn set_lower_bound(&self, value: i32) -> Result<()> {
        self.mutate(|s| s.set_lower_bound(value))
    }

    pub fn upper_bound(&self) -> i32 {
        self.read(|s| s.upper_bound)
    }

    pub fn set_upper_bound(&self, value: i32) -> Result<()> {
        self.mutate(|s| s.set_upper_bound(value))
    }

    pub fn position(&self) -> i32 {
        self.read(|s| s.position)
    }

    pub fn set_position(&self, value: i32) -> Result<()> {
        self.mutate(|s| s.set_position(value))
    }

    /// Advance the position by `step` (1 if `None`) and return the new value.
    pub fn increment(&self, step: Option<i32>) -> Result<i32> {
        let mut position = 0;
        self.mutate(|s| {
            let (new_position, changes) = s.increment(step.unwrap_or(1));
            position = new_position;
            changes
        })?;
        Ok(position)
    }

    pub fn bar_color(&self) -> BarColor {
        self.read(|s| s.bar_color)
    }

    pub fn set_bar_color(&self, color: BarColor) -> Result<()> {
        self.mutate(|s| s.set_bar_color(color))
    }

    pub fn show_progress_bar(&self) -> Result<()> {
        self.mutate(|s| s.set_progress_bar_shown(true))
    }

    pub fn hide_progress_bar(&self) -> Result<()> {
        self.mutate(|s| s.set_progress_bar_shown(false))
    }

    pub fn options(&self) -> StartOptions {
        self.read(|s| s.options)
    }

    // Window

    pub fn visible(&self) -> bool {
        self.read(|s| s.visible)
    }

    pub fn set_visible(&self, visible: bool) -> Result<()> {
        self.mutate(|s| s.set_visible(visible))
    }

    /// Move the box. [`MoveFlag::None`] leaves it where it is; [`MoveFlag::XY`]
    /// uses `x` and `y`, every other flag ignores them.
    pub fn move_window(&self, flag: MoveFlag, x: i32, y: i32) -> Result<()> {
        self.mutate(|s| {
            if flag == MoveFlag::None {
                return Vec::new();
            }
            s.request_move(MoveRequest::new(flag, x, y))
        })
    }

    // Cancel

    /// The user asked to cancel and nobody vetoed. Stays set until the next
    /// `start` with options.
    pub fn canceled(&self) -> bool {
        self.read(|s| s.canceled)
    }

    /// New connection point for subscribing to `kind`.
    pub fn find_connection_point(&self, kind: EventKind) -> Arc<ConnectionPoint> {
        self.inner.broker.find_connection_point(kind)
    }

    pub fn enumerate_connections(&self) -> ConnectionPointEnumerator {
        self.inner.broker.enumerate()
    }

    // Introspection

    pub fn snapshot(&self) -> ProgressInfo {
        self.read(ProgressInfo::clone)
    }

    /// Receive every state change, including ones made by the UI worker.
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.inner.change_tx.subscribe()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.metrics)
    }
}

/// The control message that brings the view in line with `change`, if any.
fn control_message(change: &StateChange) -> Option<ControlMessage> {
    let message = match *change {
        StateChange::CaptionChanged => ControlMessage::SetText(TextField::Caption),
        StateChange::MessageChanged => ControlMessage::SetText(TextField::Message),
        StateChange::NoteChanged => ControlMessage::SetText(TextField::Note),
        StateChange::LowerBoundChanged(v) => ControlMessage::SetRange(RangeBound::Lower, v),
        StateChange::UpperBoundChanged(v) => ControlMessage::SetRange(RangeBound::Upper, v),
        StateChange::PositionChanged(v) => ControlMessage::SetPos(v),
        StateChange::BarColorChanged(color) => ControlMessage::SetBarColor(color),
        StateChange::ProgressBarToggled(shown) => ControlMessage::ShowProgress(shown),
        StateChange::MarqueeChanged { enabled, interval } => {
            ControlMessage::SetMarquee { enabled, interval }
        }
        StateChange::CancelEnabledChanged(enabled) => ControlMessage::EnableCancel(enabled),
        StateChange::VisibilityChanged(visible) => ControlMessage::SetVisible(visible),
        StateChange::MoveRequested(request) => ControlMessage::Move(request),
        StateChange::OptionsChanged(_) | StateChange::Canceled => return None,
    };
    Some(message)
}
