//! Error taxonomy for the progress box.
//!
//! Every fallible operation maps to exactly one of the three families below;
//! nothing surfaces an untyped error. Races such as a double `stop` are not
//! errors at all: the loser gets [`StopOutcome::AlreadyStopped`](crate::StopOutcome).

use std::io;
use thiserror::Error;

use crate::events::Cookie;

/// Operations invoked in the wrong lifecycle phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("progress box is not running")]
    NotRunning,

    /// Start or stop called from the UI worker thread itself, which would have
    /// to join itself.
    #[error("start/stop cannot be called from the UI worker thread")]
    WorkerThreadReentry,
}

/// Connection point bookkeeping failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("connection point already has a subscriber")]
    AlreadyAdvised,

    #[error("no subscription with cookie {0}")]
    NoSuchSubscription(Cookie),
}

/// Failure to bring up the worker thread or its UI entity. Nothing created
/// during the attempt survives it.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("failed to spawn UI worker thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    #[error("UI worker failed to start: {0}")]
    StartupFailed(String),
}

/// A view could not create its on-screen entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("view creation failed: {0}")]
pub struct ViewError(pub String);

/// Umbrella error returned by [`ProgressBox`](crate::ProgressBox) operations.
#[derive(Error, Debug)]
pub enum ProgressBoxError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

pub type Result<T, E = ProgressBoxError> = std::result::Result<T, E>;
