// Shared state module
//
// This module provides SharedState, the one place where caller threads and the UI
// worker thread exchange values. Every access goes through a single mutex held only
// for the copy or assignment; changes are detected and broadcast as StateChange events.

use crate::models::{BarColor, Fingerprint, MoveRequest, ProgressInfo, StartOptions};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Capacity of the state change broadcast channel. Lagging receivers skip old events.
pub const CHANGE_CHANNEL_CAPACITY: usize = 100;

/// Change events emitted when state is modified
///
/// The facade turns the caller-originated ones into control messages for the UI
/// worker; anyone else may [`subscribe`](SharedState::subscribe) to observe them.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    CaptionChanged,
    MessageChanged,
    NoteChanged,
    LowerBoundChanged(i32),
    UpperBoundChanged(i32),
    PositionChanged(i32),
    BarColorChanged(BarColor),
    OptionsChanged(StartOptions),

    /// Progress bar shown (`true`) or hidden
    ProgressBarToggled(bool),

    MarqueeChanged {
        enabled: bool,
        interval: u32,
    },

    /// Whether the user can press cancel changed (option bit or cancel latch)
    CancelEnabledChanged(bool),

    VisibilityChanged(bool),

    /// A new relocation is pending
    MoveRequested(MoveRequest),

    /// The cancel latch flipped to `true`
    Canceled,
}

/// Thread-safe state container with change events
///
/// Cloning is cheap and yields another handle to the same state.
///
/// # Locking
///
/// - One mutex guards every field; each accessor holds it only for the copy or
///   assignment and never calls another accessor while holding it.
/// - Writes to one field are totally ordered. Writes to two different fields from
///   two threads are not ordered relative to each other, and a caption+message pair
///   is not a transaction.
/// - A poisoned mutex (a panic while holding it) is recovered, so the last written
///   values stay readable.
#[derive(Clone)]
pub struct SharedState {
    info: Arc<Mutex<ProgressInfo>>,
    change_tx: broadcast::Sender<StateChange>,
}

impl SharedState {
    /// Create state with its own change channel.
    pub fn new(initial: ProgressInfo) -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self::with_channel(initial, change_tx)
    }

    /// Create state that publishes on an existing change channel, so subscribers
    /// survive a session being replaced.
    pub fn with_channel(initial: ProgressInfo, change_tx: broadcast::Sender<StateChange>) -> Self {
        Self {
            info: Arc::new(Mutex::new(initial)),
            change_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every field.
    pub fn snapshot(&self) -> ProgressInfo {
        self.lock().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let done = state.read(|s| s.position >= s.upper_bound);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ProgressInfo) -> R,
    {
        let info = self.lock();
        f(&info)
    }

    /// Mutate the state and emit change events
    ///
    /// The events are detected by diffing a fingerprint taken before the update
    /// with one taken after it, then broadcast once the lock is released.
    ///
    /// # Returns
    /// The StateChange events that were emitted, in a fixed field order
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ProgressInfo),
    {
        let changes = {
            let mut info = self.lock();
            let before = info.fingerprint();
            update_fn(&mut info);
            detect_changes(&before, &info.fingerprint())
        };

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.change_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.change_tx.subscribe()
    }

    // Field accessors

    pub fn caption(&self) -> String {
        self.read(|s| s.caption.clone())
    }

    pub fn set_caption(&self, text: &str) -> Vec<StateChange> {
        self.update(|s| text.clone_into(&mut s.caption))
    }

    pub fn message(&self) -> String {
        self.read(|s| s.message.clone())
    }

    pub fn set_message(&self, text: &str) -> Vec<StateChange> {
        self.update(|s| text.clone_into(&mut s.message))
    }

    pub fn note(&self) -> String {
        self.read(|s| s.note.as_str().to_owned())
    }

    /// Replace the note, or append `text` as a new line when
    /// [`StartOptions::APPEND_TO_NOTE`] is set.
    pub fn set_note(&self, text: &str) -> Vec<StateChange> {
        self.update(|s| {
            if s.options.contains(StartOptions::APPEND_TO_NOTE) {
                s.note.append_line(text);
            } else {
                s.note.replace(text);
            }
        })
    }

    pub fn lower_bound(&self) -> i32 {
        self.read(|s| s.lower_bound)
    }

    pub fn set_lower_bound(&self, value: i32) -> Vec<StateChange> {
        self.update(|s| s.lower_bound = value)
    }

    pub fn upper_bound(&self) -> i32 {
        self.read(|s| s.upper_bound)
    }

    pub fn set_upper_bound(&self, value: i32) -> Vec<StateChange> {
        self.update(|s| s.upper_bound = value)
    }

    pub fn position(&self) -> i32 {
        self.read(|s| s.position)
    }

    pub fn set_position(&self, value: i32) -> Vec<StateChange> {
        self.update(|s| s.position = value)
    }

    /// Add `step` to the position in one critical section and return the new value.
    pub fn increment(&self, step: i32) -> (i32, Vec<StateChange>) {
        let mut position = 0;
        let changes = self.update(|s| {
            s.position = s.position.saturating_add(step);
            position = s.position;
        });
        (position, changes)
    }

    pub fn bar_color(&self) -> BarColor {
        self.read(|s| s.bar_color)
    }

    pub fn set_bar_color(&self, color: BarColor) -> Vec<StateChange> {
        self.update(|s| s.bar_color = color)
    }

    pub fn options(&self) -> StartOptions {
        self.read(|s| s.options)
    }

    /// Store options passed to `start`: the set is replaced, the cancel latch is
    /// cleared and, in marquee mode, the update interval is recorded.
    pub fn apply_start_options(&self, options: StartOptions, marquee_interval: u32) -> Vec<StateChange> {
        self.update(|s| {
            s.options = options;
            if options.contains(StartOptions::MARQUEE) {
                s.marquee_interval = marquee_interval;
            }
            s.canceled = false;
        })
    }

    pub fn set_progress_bar_shown(&self, shown: bool) -> Vec<StateChange> {
        self.update(|s| s.options.set(StartOptions::SHOW_PROGRESSBAR, shown))
    }

    pub fn canceled(&self) -> bool {
        self.read(|s| s.canceled)
    }

    /// Latch the cancel flag. Returns `false` if it was already set.
    pub fn mark_canceled(&self) -> bool {
        let mut latched = false;
        self.update(|s| {
            latched = !s.canceled;
            s.canceled = true;
        });
        latched
    }

    pub fn visible(&self) -> bool {
        self.read(|s| s.visible)
    }

    pub fn set_visible(&self, visible: bool) -> Vec<StateChange> {
        self.update(|s| s.visible = visible)
    }

    pub fn move_request(&self) -> MoveRequest {
        self.read(|s| s.move_request)
    }

    pub fn request_move(&self, request: MoveRequest) -> Vec<StateChange> {
        self.update(|s| s.move_request = request)
    }

    /// Mark `done` as carried out, unless a newer request replaced it meanwhile.
    pub fn complete_move(&self, done: MoveRequest) -> bool {
        let mut cleared = false;
        self.update(|s| {
            if s.move_request == done {
                s.move_request = MoveRequest::default();
                cleared = true;
            }
        });
        cleared
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(ProgressInfo::default())
    }
}

/// Detect what changed between two fingerprints and generate events
fn detect_changes(old: &Fingerprint, new: &Fingerprint) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.caption != new.caption {
        changes.push(StateChange::CaptionChanged);
    }
    if old.message != new.message {
        changes.push(StateChange::MessageChanged);
    }
    if old.note_revision != new.note_revision {
        changes.push(StateChange::NoteChanged);
    }

    if old.lower_bound != new.lower_bound {
        changes.push(StateChange::LowerBoundChanged(new.lower_bound));
    }
    if old.upper_bound != new.upper_bound {
        changes.push(StateChange::UpperBoundChanged(new.upper_bound));
    }
    if old.position != new.position {
        changes.push(StateChange::PositionChanged(new.position));
    }
    if old.bar_color != new.bar_color {
        changes.push(StateChange::BarColorChanged(new.bar_color));
    }

    // Option bits and the derived UI toggles
    if old.options != new.options {
        changes.push(StateChange::OptionsChanged(new.options));
    }
    let bar = |f: &Fingerprint| f.options.contains(StartOptions::SHOW_PROGRESSBAR);
    if bar(old) != bar(new) {
        changes.push(StateChange::ProgressBarToggled(bar(new)));
    }
    let marquee = |f: &Fingerprint| f.options.contains(StartOptions::MARQUEE);
    if marquee(old) != marquee(new) || (marquee(new) && old.marquee_interval != new.marquee_interval) {
        changes.push(StateChange::MarqueeChanged {
            enabled: marquee(new),
            interval: new.marquee_interval,
        });
    }
    let cancel_enabled =
        |f: &Fingerprint| !f.options.contains(StartOptions::DISABLE_CANCEL) && !f.canceled;
    if cancel_enabled(old) != cancel_enabled(new) {
        changes.push(StateChange::CancelEnabledChanged(cancel_enabled(new)));
    }

    if old.visible != new.visible {
        changes.push(StateChange::VisibilityChanged(new.visible));
    }
    if old.move_request != new.move_request && new.move_request.is_pending() {
        changes.push(StateChange::MoveRequested(new.move_request));
    }
    if !old.canceled && new.canceled {
        changes.push(StateChange::Canceled);
    }

    changes
}
