// ProgressBox - modeless progress box driven from any thread
//
// This is the library crate: the facade, its UI worker thread, shared state,
// control channel and cancel broker. The binary crate (main.rs) is a console demo.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod progress_box;
pub mod registry;
pub mod state;
pub mod ui;
pub mod worker;

// Re-export commonly used types for convenience
pub use self::config::ConfigManager;
pub use error::{LifecycleError, ProgressBoxError, ResourceError, SubscriptionError, ViewError};
pub use events::{CancelSink, CancelVote, ConnectionPoint, Cookie, EventBroker, EventKind};
pub use metrics::Metrics;
pub use models::{BarColor, BoxConfig, CancelFanOut, MoveFlag, ProgressInfo, StartOptions};
pub use progress_box::ProgressBox;
pub use registry::ObjectRegistry;
pub use state::{SharedState, StateChange};
pub use worker::{StartOutcome, StopOutcome, WindowHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
