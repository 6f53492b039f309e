// Instrumentation counters
//
// Lock-free counters for the worker lifecycle, control traffic and cancel voting

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle and traffic counters for one progress box
///
/// Uses atomic operations so the UI worker thread and caller threads can record
/// without locks. Tests read the counters to verify that a second `start` spawned
/// nothing and a second `stop` joined nothing.
#[derive(Debug)]
pub struct Metrics {
    /// UI worker threads spawned
    pub workers_spawned: AtomicU64,

    /// UI worker threads joined
    pub workers_joined: AtomicU64,

    /// Starts that ended with the worker closing before it was ready
    pub startup_failures: AtomicU64,

    /// Control messages enqueued for the UI worker
    pub messages_posted: AtomicU64,

    /// Control messages the UI worker applied
    pub messages_applied: AtomicU64,

    /// Control messages that could not be enqueued (worker gone)
    pub messages_dropped: AtomicU64,

    /// User cancel requests seen by the UI worker
    pub cancel_requests: AtomicU64,

    /// Cancel requests vetoed by a subscriber
    pub cancel_vetoes: AtomicU64,

    /// Cancel requests that latched the canceled flag
    pub cancels_accepted: AtomicU64,

    /// Panics caught around the worker loop
    pub worker_panics: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            workers_spawned: AtomicU64::new(0),
            workers_joined: AtomicU64::new(0),
            startup_failures: AtomicU64::new(0),
            messages_posted: AtomicU64::new(0),
            messages_applied: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            cancel_requests: AtomicU64::new(0),
            cancel_vetoes: AtomicU64::new(0),
            cancels_accepted: AtomicU64::new(0),
            worker_panics: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_worker_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_joined(&self) {
        self.workers_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_startup_failure(&self) {
        self.startup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_posted(&self) {
        self.messages_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_applied(&self) {
        self.messages_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancel_request(&self) {
        self.cancel_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancel_veto(&self) {
        self.cancel_vetoes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancel_accepted(&self) {
        self.cancels_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Worker threads spawned but not yet joined
    pub fn live_workers(&self) -> u64 {
        let spawned = self.workers_spawned.load(Ordering::Relaxed);
        spawned.saturating_sub(self.workers_joined.load(Ordering::Relaxed))
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Progress Box Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Workers: {} spawned, {} joined, {} startup failures, {} panics",
            self.workers_spawned.load(Ordering::Relaxed),
            self.workers_joined.load(Ordering::Relaxed),
            self.startup_failures.load(Ordering::Relaxed),
            self.worker_panics.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Control messages: {} posted, {} applied, {} dropped",
            self.messages_posted.load(Ordering::Relaxed),
            self.messages_applied.load(Ordering::Relaxed),
            self.messages_dropped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Cancel: {} requests, {} vetoed, {} accepted",
            self.cancel_requests.load(Ordering::Relaxed),
            self.cancel_vetoes.load(Ordering::Relaxed),
            self.cancels_accepted.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
