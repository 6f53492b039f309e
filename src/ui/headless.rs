// Headless view
//
// Keeps the display model in memory. The probe lets a host (or a test) look at what
// would be on screen and inject the user actions a real toolkit would report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::view::{ProgressView, ViewFactory, ViewModel};
use crate::error::ViewError;
use crate::models::{BarColor, ProgressInfo, Rect};
use crate::worker::{EventSink, UiEvent, WindowHandle};

const DEFAULT_SCREEN: Rect = Rect::new(0, 0, 1920, 1080);
const DEFAULT_FRAME: Rect = Rect::new(0, 0, 400, 160);

#[derive(Default)]
struct ProbeState {
    model: ViewModel,
    alive: bool,
    events: Option<EventSink>,
    views_created: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ProbeState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify(&self, f: impl FnOnce(&mut ProbeState)) {
        f(&mut self.lock());
        self.changed.notify_all();
    }
}

/// Creates [`HeadlessView`]s that all report to the same probe
pub struct HeadlessViewFactory {
    shared: Arc<Shared>,
    screen: Rect,
    frame: Rect,
    fail_next: Mutex<Option<String>>,
    next_handle: AtomicU64,
}

impl HeadlessViewFactory {
    pub fn new() -> Self {
        Self::with_geometry(DEFAULT_SCREEN, DEFAULT_FRAME)
    }

    pub fn with_geometry(screen: Rect, frame: Rect) -> Self {
        Self {
            shared: Arc::default(),
            screen,
            frame,
            fail_next: Mutex::new(None),
            next_handle: AtomicU64::new(0x1000),
        }
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Make the next `create` fail with `reason`.
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }
}

impl Default for HeadlessViewFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewFactory for HeadlessViewFactory {
    fn create(
        &self,
        _initial: &ProgressInfo,
        events: EventSink,
    ) -> Result<Box<dyn ProgressView>, ViewError> {
        if let Some(reason) = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(ViewError(reason));
        }

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = WindowHandle::new(raw).ok_or_else(|| ViewError("handle space exhausted".into()))?;

        let frame = self.frame;
        self.shared.modify(|st| {
            st.model = ViewModel {
                frame,
                ..ViewModel::default()
            };
            st.alive = true;
            st.events = Some(events);
            st.views_created += 1;
        });

        Ok(Box::new(HeadlessView {
            handle,
            screen: self.screen,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// In-memory progress box
pub struct HeadlessView {
    handle: WindowHandle,
    screen: Rect,
    shared: Arc<Shared>,
}

impl HeadlessView {
    fn update(&self, f: impl FnOnce(&mut ViewModel)) {
        self.shared.modify(|st| f(&mut st.model));
    }
}

impl ProgressView for HeadlessView {
    fn handle(&self) -> WindowHandle {
        self.handle
    }

    fn set_title(&mut self, text: &str) {
        self.update(|m| text.clone_into(&mut m.title));
    }

    fn set_message(&mut self, text: &str) {
        self.update(|m| text.clone_into(&mut m.message));
    }

    fn set_note(&mut self, text: &str, caret: usize) {
        self.update(|m| {
            text.clone_into(&mut m.note);
            m.caret = caret;
        });
    }

    fn set_range(&mut self, lower: i32, upper: i32) {
        self.update(|m| {
            m.lower = lower;
            m.upper = upper;
        });
    }

    fn set_position(&mut self, position: i32) {
        self.update(|m| m.position = position);
    }

    fn set_marquee(&mut self, enabled: bool, interval: u32) {
        self.update(|m| m.marquee = enabled.then_some(interval));
    }

    fn set_bar_color(&mut self, color: BarColor) {
        self.update(|m| m.bar_color = color);
    }

    fn show_progress_bar(&mut self, shown: bool) {
        self.update(|m| m.progress_bar_shown = shown);
    }

    fn set_cancel_enabled(&mut self, enabled: bool) {
        self.update(|m| m.cancel_enabled = enabled);
    }

    fn set_visible(&mut self, visible: bool) {
        self.update(|m| m.visible = visible);
    }

    fn screen_rect(&self) -> Rect {
        self.screen
    }

    fn frame_rect(&self) -> Rect {
        self.shared.lock().model.frame
    }

    fn move_to(&mut self, x: i32, y: i32) {
        self.update(|m| m.frame = m.frame.moved_to(x, y));
    }

    fn bring_to_front(&mut self) {
        self.update(|m| m.raised += 1);
    }
}

impl Drop for HeadlessView {
    fn drop(&mut self) {
        self.shared.modify(|st| {
            st.alive = false;
            st.model.visible = false;
            st.events = None;
        });
    }
}

/// Observer and input injector for headless views
#[derive(Clone)]
pub struct HeadlessProbe {
    shared: Arc<Shared>,
}

impl HeadlessProbe {
    pub fn snapshot(&self) -> ViewModel {
        self.shared.lock().model.clone()
    }

    /// A view exists and has not been destroyed.
    pub fn is_alive(&self) -> bool {
        self.shared.lock().alive
    }

    pub fn views_created(&self) -> u64 {
        self.shared.lock().views_created
    }

    /// Press the cancel button. Returns `false` if no view is live.
    pub fn click_cancel(&self) -> bool {
        self.post(UiEvent::CancelRequested)
    }

    /// Close the box the way a window manager would.
    pub fn close(&self) -> bool {
        self.post(UiEvent::Closed)
    }

    fn post(&self, event: UiEvent) -> bool {
        let events = self.shared.lock().events.clone();
        events.is_some_and(|sink| sink.post(event))
    }

    /// Block until `condition` holds for the displayed model, or `timeout` passes.
    pub fn wait_for(&self, timeout: Duration, condition: impl Fn(&ViewModel) -> bool) -> bool {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |st| !condition(&st.model))
            .unwrap_or_else(PoisonError::into_inner);
        condition(&guard.model)
    }

    /// Block until the live view is destroyed, or `timeout` passes.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |st| st.alive)
            .unwrap_or_else(PoisonError::into_inner);
        !guard.alive
    }
}
