//! The dedicated UI thread and everything that talks to it.
//!
//! - [`WorkerThreadManager`]: spawns and joins the thread, runs the startup
//!   handshake and the lifetime hooks
//! - [`ControlChannel`]: typed FIFO queue from caller threads to the worker
//! - [`UiWorker`]: the loop that owns the view and applies messages to it

pub mod channel;
pub mod controller;
pub mod ui_worker;

pub use channel::{ControlChannel, ControlMessage, ControlReceiver, EventSink, UiEvent, WorkerMessage};
pub use controller::{
    ReadySignal, RunHooks, StartOutcome, StopOutcome, ThreadWorker, WindowHandle,
    WorkerThreadManager,
};
pub use ui_worker::UiWorker;
