//! Data models for the progress box.
//!
//! - [`ProgressInfo`]: the fields shared between caller threads and the UI worker
//! - [`NoteBuffer`]: note text with replace and append-line modes
//! - [`StartOptions`], [`BarColor`], [`MoveRequest`]: option bits and display parameters
//! - [`BoxConfig`]: defaults and settings loaded from `ProgressBox.yaml`
//!
//! `ProgressInfo` is never shared directly; it lives behind
//! [`SharedState`](crate::state::SharedState), which owns the one mutex guarding it.

pub mod config;
pub mod geometry;
pub mod progress_info;

pub use self::config::{BoxConfig, BoxDefaults, CancelFanOut, LoggingSettings};
pub use geometry::{MoveFlag, MoveRequest, Rect};
pub use progress_info::{
    BarColor, Fingerprint, NoteBuffer, ProgressInfo, RangeBound, StartOptions, TextField,
};
