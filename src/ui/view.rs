// View abstraction
//
// A ProgressView is the on-screen entity. It is created by a ViewFactory on the UI
// worker thread and never leaves that thread, so implementations need not be Send.

use crate::error::ViewError;
use crate::models::{BarColor, ProgressInfo, Rect};
use crate::worker::{EventSink, WindowHandle};

/// The live progress box as drawn by some toolkit
///
/// Only the UI worker calls these methods. Values are applied as given; the view
/// clamps what it draws but never writes back to shared state.
pub trait ProgressView {
    fn handle(&self) -> WindowHandle;

    fn set_title(&mut self, text: &str);
    fn set_message(&mut self, text: &str);

    /// Replace the note text and place the caret at byte offset `caret`.
    fn set_note(&mut self, text: &str, caret: usize);

    fn set_range(&mut self, lower: i32, upper: i32);
    fn set_position(&mut self, position: i32);

    /// `interval` is in milliseconds; 0 selects the toolkit default.
    fn set_marquee(&mut self, enabled: bool, interval: u32);

    fn set_bar_color(&mut self, color: BarColor);
    fn show_progress_bar(&mut self, shown: bool);
    fn set_cancel_enabled(&mut self, enabled: bool);
    fn set_visible(&mut self, visible: bool);

    /// Work area the box may be placed in.
    fn screen_rect(&self) -> Rect;
    /// Current outer frame of the box.
    fn frame_rect(&self) -> Rect;
    fn move_to(&mut self, x: i32, y: i32);

    fn bring_to_front(&mut self) {}
}

/// Creates views on the UI worker thread
///
/// `events` is how the view reports user actions (cancel, close) back to the
/// worker loop.
pub trait ViewFactory: Send + Sync {
    fn create(
        &self,
        initial: &ProgressInfo,
        events: EventSink,
    ) -> Result<Box<dyn ProgressView>, ViewError>;
}

/// What a view currently shows
///
/// Shared by the bundled views as their display model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewModel {
    pub title: String,
    pub message: String,
    pub note: String,
    pub caret: usize,
    pub lower: i32,
    pub upper: i32,
    pub position: i32,
    /// Marquee interval while marquee mode is on
    pub marquee: Option<u32>,
    pub bar_color: BarColor,
    pub progress_bar_shown: bool,
    pub cancel_enabled: bool,
    pub visible: bool,
    pub frame: Rect,
    /// Times the view was brought to the front
    pub raised: u32,
}

impl ViewModel {
    /// Position clamped into the range, as a fraction. `None` for an empty range.
    pub fn fraction(&self) -> Option<f64> {
        if self.upper <= self.lower {
            return None;
        }
        let span = f64::from(self.upper) - f64::from(self.lower);
        let done = f64::from(self.position.clamp(self.lower, self.upper)) - f64::from(self.lower);
        Some(done / span)
    }
}
