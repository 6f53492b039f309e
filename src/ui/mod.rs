// UI module - views driven by the UI worker
//
// This module contains:
// - ProgressView / ViewFactory: the seam between the worker and a toolkit
// - HeadlessView: in-memory view with a probe for hosts and tests
// - ConsoleView: plain-text rendition on any writer

pub mod console;
pub mod headless;
pub mod view;

pub use console::{ConsoleView, ConsoleViewFactory};
pub use headless::{HeadlessProbe, HeadlessView, HeadlessViewFactory};
pub use view::{ProgressView, ViewFactory, ViewModel};
