// UI worker
//
// Runs on the dedicated UI thread: builds the view from the current shared state,
// then applies control messages and handles user events until told to stop. This
// is the only code that touches the view.

use std::sync::Arc;

use super::channel::{ControlChannel, ControlMessage, ControlReceiver, UiEvent, WorkerMessage};
use super::controller::{ReadySignal, ThreadWorker};
use crate::error::ResourceError;
use crate::events::EventBroker;
use crate::metrics::Metrics;
use crate::models::{BarColor, ProgressInfo, StartOptions, TextField};
use crate::state::SharedState;
use crate::ui::{ProgressView, ViewFactory};

/// One session of the UI worker loop
pub struct UiWorker {
    factory: Arc<dyn ViewFactory>,
    state: SharedState,
    broker: EventBroker,
    channel: ControlChannel,
    receiver: ControlReceiver,
    metrics: Arc<Metrics>,
}

impl UiWorker {
    pub fn new(
        factory: Arc<dyn ViewFactory>,
        state: SharedState,
        broker: EventBroker,
        channel: &ControlChannel,
        receiver: ControlReceiver,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            factory,
            state,
            broker,
            channel: channel.clone(),
            receiver,
            metrics,
        }
    }

    /// Push the initial state into a freshly created view.
    fn initialize(&self, view: &mut dyn ProgressView, info: &ProgressInfo) {
        let mut show_bar = info.progress_bar_shown();

        if info.upper_bound > info.lower_bound {
            view.set_range(info.lower_bound, info.upper_bound);
            show_bar = true;
        }
        if info.position != 0 {
            view.set_position(info.position);
        }
        if info.marquee() {
            view.set_marquee(true, info.marquee_interval);
            show_bar = true;
        }
        if info.bar_color != BarColor::SystemDefault {
            view.set_bar_color(info.bar_color);
        }
        if show_bar && !info.progress_bar_shown() {
            self.state.set_progress_bar_shown(true);
        }
        view.show_progress_bar(show_bar);
        view.set_cancel_enabled(info.cancel_enabled());

        if !info.caption.is_empty() {
            view.set_title(&info.caption);
        }
        if !info.message.is_empty() {
            view.set_message(&info.message);
        }
        if !info.note.is_empty() {
            view.set_note(info.note.as_str(), note_caret(info));
        }
        if info.move_request.is_pending() {
            self.apply_move(view);
        }

        view.set_visible(true);
        view.bring_to_front();
        self.state.set_visible(true);
    }

    fn run_loop(&mut self, view: &mut dyn ProgressView) {
        while let Some(message) = self.receiver.recv_blocking() {
            match message {
                WorkerMessage::Control(ControlMessage::Destroy) => {
                    tracing::debug!("Destroy received");
                    break;
                }
                WorkerMessage::Control(control) => {
                    self.apply(view, control);
                    self.metrics.record_message_applied();
                }
                WorkerMessage::Ui(UiEvent::CancelRequested) => self.handle_cancel(view),
                WorkerMessage::Ui(UiEvent::Closed) => {
                    tracing::info!("View closed by the user");
                    break;
                }
            }
        }
    }

    /// Apply a control message using the field's current value.
    fn apply(&self, view: &mut dyn ProgressView, message: ControlMessage) {
        match message {
            ControlMessage::SetText(field) => {
                let info = self.state.snapshot();
                match field {
                    TextField::Caption => view.set_title(&info.caption),
                    TextField::Message => view.set_message(&info.message),
                    TextField::Note => view.set_note(info.note.as_str(), note_caret(&info)),
                }
            }
            ControlMessage::SetRange(..) => {
                let (lower, upper) = self.state.read(|s| (s.lower_bound, s.upper_bound));
                view.set_range(lower, upper);
            }
            ControlMessage::SetPos(_) => view.set_position(self.state.position()),
            ControlMessage::SetMarquee { .. } => {
                let (enabled, interval) = self.state.read(|s| (s.marquee(), s.marquee_interval));
                view.set_marquee(enabled, interval);
            }
            ControlMessage::SetBarColor(_) => view.set_bar_color(self.state.bar_color()),
            ControlMessage::ShowProgress(_) => {
                view.show_progress_bar(self.state.read(ProgressInfo::progress_bar_shown));
            }
            ControlMessage::Move(_) => self.apply_move(view),
            ControlMessage::SetVisible(_) => {
                let visible = self.state.visible();
                view.set_visible(visible);
                if visible {
                    view.bring_to_front();
                }
            }
            ControlMessage::EnableCancel(_) => {
                view.set_cancel_enabled(self.state.read(ProgressInfo::cancel_enabled));
            }
            ControlMessage::Destroy => {}
        }
    }

    fn apply_move(&self, view: &mut dyn ProgressView) {
        let request = self.state.move_request();
        if let Some((x, y)) = request.destination(view.screen_rect(), view.frame_rect()) {
            view.move_to(x, y);
        }
        if !self.state.complete_move(request) {
            tracing::debug!("Newer move request arrived while moving");
        }
    }

    /// Ask subscribers, latch the flag only if nobody vetoed. The view stays up
    /// until an explicit stop.
    fn handle_cancel(&self, view: &mut dyn ProgressView) {
        self.metrics.record_cancel_request();

        if !self.state.read(ProgressInfo::cancel_enabled) {
            tracing::debug!("Cancel request ignored, cancel is disabled");
            return;
        }

        if self.broker.fire_cancel() {
            self.state.mark_canceled();
            view.set_cancel_enabled(false);
            self.metrics.record_cancel_accepted();
            tracing::info!("Cancel accepted");
        } else {
            self.metrics.record_cancel_veto();
        }
    }
}

impl ThreadWorker for UiWorker {
    fn run(mut self, ready: &mut ReadySignal<'_>) -> Result<(), ResourceError> {
        let snapshot = self.state.snapshot();
        let mut view = self
            .factory
            .create(&snapshot, self.channel.event_sink())
            .map_err(|e| ResourceError::StartupFailed(e.to_string()))?;

        self.initialize(view.as_mut(), &snapshot);
        ready.signal(view.handle());

        self.run_loop(view.as_mut());

        view.set_visible(false);
        drop(view);
        self.state.set_visible(false);
        Ok(())
    }

    fn shutdown_hook(&self) -> Box<dyn FnOnce() + Send> {
        let channel = self.channel.clone();
        Box::new(move || {
            channel.post(ControlMessage::Destroy);
        })
    }
}

fn note_caret(info: &ProgressInfo) -> usize {
    if info.options.contains(StartOptions::APPEND_TO_NOTE) {
        info.note.last_entry_offset()
    } else {
        0
    }
}
