// Console view
//
// Renders the progress box as plain text lines on a writer. There is no cancel
// button to click; hosts inject the cancel request through the factory's event
// sink (the demo binary wires Ctrl+C to it).

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::view::{ProgressView, ViewFactory, ViewModel};
use crate::error::ViewError;
use crate::models::{BarColor, ProgressInfo, Rect};
use crate::worker::{EventSink, WindowHandle};

/// Terminal area, in character cells.
const SCREEN: Rect = Rect::new(0, 0, 80, 25);
const FRAME: Rect = Rect::new(0, 0, 60, 6);
const BAR_WIDTH: usize = 40;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Creates [`ConsoleView`]s writing to one shared output
pub struct ConsoleViewFactory {
    out: SharedWriter,
    events: Mutex<Option<EventSink>>,
    next_handle: AtomicU64,
}

impl ConsoleViewFactory {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            events: Mutex::new(None),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Sink of the most recently created view, for injecting user actions.
    pub fn event_sink(&self) -> Option<EventSink> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ViewFactory for ConsoleViewFactory {
    fn create(
        &self,
        _initial: &ProgressInfo,
        events: EventSink,
    ) -> Result<Box<dyn ProgressView>, ViewError> {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = WindowHandle::new(raw).ok_or_else(|| ViewError("handle space exhausted".into()))?;
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(events);

        Ok(Box::new(ConsoleView {
            handle,
            out: Arc::clone(&self.out),
            model: ViewModel {
                frame: FRAME,
                ..ViewModel::default()
            },
            last_bar: None,
        }))
    }
}

/// Text rendition of the progress box
pub struct ConsoleView {
    handle: WindowHandle,
    out: SharedWriter,
    model: ViewModel,
    last_bar: Option<String>,
}

impl ConsoleView {
    fn line(&self, text: &str) {
        if !self.model.visible {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{}", text).and_then(|()| out.flush()) {
            tracing::debug!("Console view write failed: {}", e);
        }
    }

    fn bar(&self) -> Option<String> {
        if !self.model.progress_bar_shown {
            return None;
        }
        if self.model.marquee.is_some() {
            return Some(format!("[{:^width$}]", "working", width = BAR_WIDTH));
        }
        let fraction = self.model.fraction()?;
        let filled = (fraction * BAR_WIDTH as f64).round() as usize;
        Some(format!(
            "[{}{}] {:>3.0}%",
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            fraction * 100.0
        ))
    }

    // Only redraw when the rendered bar actually changes
    fn render_bar(&mut self) {
        let bar = self.bar();
        if bar != self.last_bar {
            if let Some(text) = &bar {
                self.line(text);
            }
            self.last_bar = bar;
        }
    }
}

impl ProgressView for ConsoleView {
    fn handle(&self) -> WindowHandle {
        self.handle
    }

    fn set_title(&mut self, text: &str) {
        text.clone_into(&mut self.model.title);
        self.line(&format!("== {} ==", text));
    }

    fn set_message(&mut self, text: &str) {
        text.clone_into(&mut self.model.message);
        self.line(text);
    }

    fn set_note(&mut self, text: &str, caret: usize) {
        text.clone_into(&mut self.model.note);
        self.model.caret = caret;
        let tail = text.get(caret..).unwrap_or(text);
        for entry in tail.lines() {
            self.line(&format!("  > {}", entry));
        }
    }

    fn set_range(&mut self, lower: i32, upper: i32) {
        self.model.lower = lower;
        self.model.upper = upper;
        self.render_bar();
    }

    fn set_position(&mut self, position: i32) {
        self.model.position = position;
        self.render_bar();
    }

    fn set_marquee(&mut self, enabled: bool, interval: u32) {
        self.model.marquee = enabled.then_some(interval);
        self.render_bar();
    }

    fn set_bar_color(&mut self, color: BarColor) {
        self.model.bar_color = color;
    }

    fn show_progress_bar(&mut self, shown: bool) {
        self.model.progress_bar_shown = shown;
        self.render_bar();
    }

    fn set_cancel_enabled(&mut self, enabled: bool) {
        let was = self.model.cancel_enabled;
        self.model.cancel_enabled = enabled;
        if was && !enabled {
            self.line("(cancel unavailable)");
        }
    }

    fn set_visible(&mut self, visible: bool) {
        self.model.visible = visible;
        if visible {
            // Force a full bar redraw after being hidden
            self.last_bar = None;
            self.render_bar();
        }
    }

    fn screen_rect(&self) -> Rect {
        SCREEN
    }

    fn frame_rect(&self) -> Rect {
        self.model.frame
    }

    fn move_to(&mut self, x: i32, y: i32) {
        self.model.frame = self.model.frame.moved_to(x, y);
        tracing::debug!("Console view moved to ({}, {})", x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::worker::ControlChannel;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn console() -> (Box<dyn ProgressView>, Capture, ConsoleViewFactory) {
        let capture = Capture::default();
        let factory = ConsoleViewFactory::new(capture.clone());
        let (channel, _rx) = ControlChannel::new(Arc::new(Metrics::new()));
        let view = factory
            .create(&ProgressInfo::default(), channel.event_sink())
            .map_err(|e| e.to_string())
            .unwrap();
        (view, capture, factory)
    }

    #[test]
    fn test_hidden_view_writes_nothing() {
        let (mut view, capture, _factory) = console();
        view.set_title("Quiet");
        assert!(capture.text().is_empty());
    }

    #[test]
    fn test_renders_bar_and_notes() {
        let (mut view, capture, factory) = console();
        view.set_visible(true);
        view.set_title("Copying");
        view.set_range(0, 4);
        view.show_progress_bar(true);
        view.set_position(1);
        view.set_position(1);
        view.set_note("a.txt\nb.txt\n", "a.txt\n".len());

        let text = capture.text();
        assert!(text.contains("== Copying =="));
        assert!(text.contains(" 25%"));
        assert_eq!(text.matches(" 25%").count(), 1);
        assert!(text.contains("  > b.txt"));
        assert!(!text.contains("  > a.txt"));
        assert!(factory.event_sink().is_some());
    }

    #[test]
    fn test_marquee_bar() {
        let (mut view, capture, _factory) = console();
        view.set_visible(true);
        view.show_progress_bar(true);
        view.set_marquee(true, 30);
        assert!(capture.text().contains("working"));
    }
}
