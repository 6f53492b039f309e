//! ProgressBox console demo
//!
//! Drives a progress box from the main thread while its UI worker renders to the
//! terminal:
//! - Loads `ProgressBox Data/ProgressBox.yaml` (defaults if missing)
//! - Sets up logging from the config's `logging` section
//! - Runs a tokio runtime whose Ctrl+C task plays the role of the cancel button
//! - Subscribes a cancel sink, runs a simulated job, stops, logs metrics
//!
//! # Execution Flow
//!
//! 1. Load configuration and initialize logging
//! 2. Create the object registry, console view factory and progress box
//! 3. Start the box with append-to-note mode and a visible progress bar
//! 4. Increment progress until done, canceled, or the view goes away
//! 5. Stop the box, unadvise, log the metrics summary

use anyhow::Result;
use progressbox::ui::ConsoleViewFactory;
use progressbox::worker::UiEvent;
use progressbox::{
    APP_NAME, CancelVote, ConfigManager, EventKind, ObjectRegistry, ProgressBox, StartOptions,
    VERSION,
};
use std::sync::Arc;
use std::time::Duration;

const TOTAL_ITEMS: i32 = 40;
const ITEM_DURATION: Duration = Duration::from_millis(150);

fn main() -> Result<()> {
    let config_manager = ConfigManager::new("ProgressBox Data")?;
    let config = config_manager.load()?;

    let _log_guard = progressbox::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    // Runtime for signal handling only; the progress box itself needs none
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .thread_name("progressbox-signals")
        .build()?;

    let registry = ObjectRegistry::new();
    let factory = Arc::new(ConsoleViewFactory::stdout());
    let progress = ProgressBox::new(factory.clone(), config, &registry);

    {
        let factory = Arc::clone(&factory);
        runtime.spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match factory.event_sink() {
                    Some(sink) if sink.post(UiEvent::CancelRequested) => {
                        tracing::info!("Cancel requested from the console");
                    }
                    _ => tracing::warn!("Ctrl+C received with no live progress box"),
                }
            }
        });
    }

    let point = progress.find_connection_point(EventKind::Cancel);
    let cookie = point.advise(Arc::new(|_vote: &mut CancelVote| {
        tracing::info!("Cancel subscriber notified, allowing cancel");
    }))?;

    progress.set_caption("ProgressBox demo")?;
    progress.set_message("Processing items, press Ctrl+C to cancel")?;
    progress.set_upper_bound(TOTAL_ITEMS)?;
    progress.start(StartOptions::APPEND_TO_NOTE | StartOptions::SHOW_PROGRESSBAR, 0)?;

    let mut completed = progress.position();
    while completed < TOTAL_ITEMS {
        if progress.canceled() {
            tracing::warn!("Job canceled after {} items", completed);
            break;
        }
        if !progress.is_running() {
            tracing::warn!("Progress box closed, abandoning job");
            break;
        }

        std::thread::sleep(ITEM_DURATION);
        completed = progress.increment(None)?;
        progress.set_note(&format!("item {} done", completed))?;
    }

    let outcome = progress.stop()?;
    point.unadvise(cookie)?;
    tracing::info!(
        "Progress box {:?} at {}/{} (canceled: {})",
        outcome,
        progress.position(),
        progress.upper_bound(),
        progress.canceled()
    );

    progress.metrics().log_summary();
    drop(progress);
    tracing::info!("All objects released: {}", registry.can_unload());

    runtime.shutdown_timeout(Duration::from_secs(1));
    tracing::info!("Application shutdown complete");
    Ok(())
}
