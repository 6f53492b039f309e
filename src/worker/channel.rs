// Control channel between caller threads and the UI worker
//
// Any number of producers post typed messages; the UI worker thread is the only
// consumer. Native UI events from the view travel on the same queue so the worker
// has a single blocking receive point.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::metrics::Metrics;
use crate::models::{BarColor, MoveRequest, RangeBound, TextField};

/// Commands from caller threads to the UI worker
///
/// Payloads tell the worker which field changed. Handlers re-read the current
/// shared state before touching the view, so a message that arrives after a newer
/// write still shows the newest value and duplicates are harmless.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SetText(TextField),
    SetRange(RangeBound, i32),
    SetPos(i32),
    SetMarquee { enabled: bool, interval: u32 },
    SetBarColor(BarColor),
    ShowProgress(bool),
    Move(MoveRequest),
    SetVisible(bool),
    EnableCancel(bool),
    /// Close the view and leave the worker loop
    Destroy,
}

/// Events raised by the view itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// The user pressed cancel or tried to close the box
    CancelRequested,
    /// The view went away on its own
    Closed,
}

/// Everything the UI worker consumes
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Control(ControlMessage),
    Ui(UiEvent),
}

/// Producer side of the worker queue
///
/// The queue is unbounded and FIFO: no coalescing, no priorities.
#[derive(Clone)]
pub struct ControlChannel {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    metrics: Arc<Metrics>,
}

impl ControlChannel {
    pub fn new(metrics: Arc<Metrics>) -> (Self, ControlReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, metrics }, ControlReceiver { rx })
    }

    /// Enqueue a command. Returns `false` if the worker is gone.
    pub fn post(&self, message: ControlMessage) -> bool {
        tracing::debug!("Posting {:?}", message);
        match self.tx.send(WorkerMessage::Control(message)) {
            Ok(()) => {
                self.metrics.record_message_posted();
                true
            }
            Err(mpsc::error::SendError(message)) => {
                self.metrics.record_message_dropped();
                tracing::debug!("UI worker gone, dropped {:?}", message);
                false
            }
        }
    }

    /// Handle the view uses to report native events.
    pub fn event_sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the UI worker thread
pub struct ControlReceiver {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl ControlReceiver {
    /// Block until the next message. Must not be called from an async context.
    pub fn recv_blocking(&mut self) -> Option<WorkerMessage> {
        self.rx.blocking_recv()
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.rx.try_recv().ok()
    }
}

/// Cloneable handle for posting [`UiEvent`]s into the worker queue
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl EventSink {
    /// Returns `false` if the worker is gone.
    pub fn post(&self, event: UiEvent) -> bool {
        self.tx.send(WorkerMessage::Ui(event)).is_ok()
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_fifo_order() {
        let metrics = Arc::new(Metrics::new());
        let (channel, mut rx) = ControlChannel::new(Arc::clone(&metrics));

        channel.post(ControlMessage::SetPos(1));
        channel.post(ControlMessage::SetText(TextField::Caption));
        channel.event_sink().post(UiEvent::CancelRequested);
        channel.post(ControlMessage::Destroy);

        assert_eq!(
            rx.try_recv(),
            Some(WorkerMessage::Control(ControlMessage::SetPos(1)))
        );
        assert_eq!(
            rx.try_recv(),
            Some(WorkerMessage::Control(ControlMessage::SetText(TextField::Caption)))
        );
        assert_eq!(rx.try_recv(), Some(WorkerMessage::Ui(UiEvent::CancelRequested)));
        assert_eq!(
            rx.try_recv(),
            Some(WorkerMessage::Control(ControlMessage::Destroy))
        );
        assert_eq!(rx.try_recv(), None);
        assert_eq!(metrics.messages_posted.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let metrics = Arc::new(Metrics::new());
        let (channel, rx) = ControlChannel::new(Arc::clone(&metrics));
        drop(rx);

        assert!(channel.is_closed());
        assert!(!channel.post(ControlMessage::SetPos(3)));
        assert!(!channel.event_sink().post(UiEvent::Closed));
        assert_eq!(metrics.messages_dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_blocking_receive_from_worker_thread() {
        let (channel, mut rx) = ControlChannel::new(Arc::new(Metrics::new()));

        let consumer = std::thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(message) = rx.recv_blocking() {
                let done = message == WorkerMessage::Control(ControlMessage::Destroy);
                seen.push(message);
                if done {
                    break;
                }
            }
            seen
        });

        for pos in 0..10 {
            channel.post(ControlMessage::SetPos(pos));
        }
        channel.post(ControlMessage::Destroy);

        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), 11);
        assert_eq!(seen[9], WorkerMessage::Control(ControlMessage::SetPos(9)));
    }
}
