//! Integration tests for the ProgressBox facade driving a headless view
//!
//! These tests verify:
//! - Start/stop lifecycle, including repeated and racing calls
//! - Values reaching the view through the UI worker
//! - Cancel requests, vetoes and the canceled flag
//! - Sessions after stop and object lifetime

use progressbox::models::Rect;
use progressbox::ui::{HeadlessProbe, HeadlessViewFactory};
use progressbox::{
    BoxConfig, CancelFanOut, CancelVote, EventKind, LifecycleError, MoveFlag, ObjectRegistry,
    ProgressBox, ProgressBoxError, ResourceError, StartOptions, StartOutcome, StopOutcome,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    progress: ProgressBox,
    probe: HeadlessProbe,
    factory: Arc<HeadlessViewFactory>,
    registry: Arc<ObjectRegistry>,
}

fn harness_with(config: BoxConfig, factory: HeadlessViewFactory) -> Harness {
    let registry = ObjectRegistry::new();
    let factory = Arc::new(factory);
    let probe = factory.probe();
    let progress = ProgressBox::new(factory.clone(), config, &registry);
    Harness {
        progress,
        probe,
        factory,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(BoxConfig::default(), HeadlessViewFactory::new())
}

fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_start_twice_spawns_one_worker() {
    let h = harness();

    assert_eq!(
        h.progress.start(StartOptions::empty(), 0).unwrap(),
        StartOutcome::Started
    );
    assert_eq!(
        h.progress.start(StartOptions::empty(), 0).unwrap(),
        StartOutcome::AlreadyRunning
    );

    assert!(h.progress.is_running());
    assert!(h.probe.is_alive());
    assert_eq!(h.probe.views_created(), 1);
    assert_eq!(h.progress.metrics().workers_spawned.load(Ordering::Relaxed), 1);

    h.progress.stop().unwrap();
}

#[test]
fn test_stop_twice_joins_once() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    assert_eq!(h.progress.stop().unwrap(), StopOutcome::Stopped);
    assert_eq!(h.progress.stop().unwrap(), StopOutcome::AlreadyStopped);

    assert!(!h.progress.is_running());
    assert!(!h.probe.is_alive());
    assert_eq!(h.progress.metrics().workers_joined.load(Ordering::Relaxed), 1);
}

#[test]
fn test_concurrent_stops_have_one_winner() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let progress = h.progress.clone();
            thread::spawn(move || progress.stop().unwrap())
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();

    let stopped = outcomes
        .iter()
        .filter(|o| **o == StopOutcome::Stopped)
        .count();
    assert_eq!(stopped, 1);
    assert_eq!(h.progress.metrics().workers_joined.load(Ordering::Relaxed), 1);
}

#[test]
fn test_staged_values_shown_on_start() {
    let h = harness();
    h.progress.set_caption("Copying files").unwrap();
    h.progress.set_message("Please wait").unwrap();
    h.progress.set_upper_bound(50).unwrap();
    h.progress.set_position(10).unwrap();

    h.progress.start(StartOptions::empty(), 0).unwrap();

    let model = h.probe.snapshot();
    assert_eq!(model.title, "Copying files");
    assert_eq!(model.message, "Please wait");
    assert_eq!((model.lower, model.upper, model.position), (0, 50, 10));
    assert!(model.progress_bar_shown);
    assert!(model.cancel_enabled);
    assert!(model.visible);
    assert!(h.progress.visible());

    h.progress.stop().unwrap();
}

#[test]
fn test_setters_reach_view() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    h.progress.set_message("Step 2").unwrap();
    assert_eq!(h.progress.increment(Some(5)).unwrap(), 5);
    assert_eq!(h.progress.increment(None).unwrap(), 6);

    assert!(h.probe.wait_for(WAIT, |m| m.message == "Step 2" && m.position == 6));
    h.progress.stop().unwrap();
}

#[test]
fn test_snapshot_survives_stop() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();
    h.progress.set_position(57).unwrap();
    h.progress.set_message("almost").unwrap();
    h.progress.stop().unwrap();

    assert_eq!(h.progress.position(), 57);
    assert_eq!(h.progress.message(), "almost");
    assert!(!h.progress.visible());
}

#[test]
fn test_disable_cancel_option() {
    let h = harness();
    h.progress.start(StartOptions::DISABLE_CANCEL, 0).unwrap();
    assert!(!h.probe.snapshot().cancel_enabled);

    assert!(h.probe.click_cancel());
    assert!(eventually(|| {
        h.progress.metrics().cancel_requests.load(Ordering::Relaxed) == 1
    }));
    assert!(!h.progress.canceled());

    h.progress.stop().unwrap();
}

#[test]
fn test_cancel_sets_flag_and_keeps_view() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    assert!(h.probe.click_cancel());
    assert!(h.probe.wait_for(WAIT, |m| !m.cancel_enabled));

    assert!(h.progress.canceled());
    assert!(h.progress.is_running());
    assert!(h.probe.is_alive());
    assert_eq!(h.progress.metrics().cancels_accepted.load(Ordering::Relaxed), 1);

    // Restarting with options clears the flag
    h.progress.start(StartOptions::SHOW_PROGRESSBAR, 0).unwrap();
    assert!(!h.progress.canceled());

    h.progress.stop().unwrap();
}

#[test]
fn test_canceled_flag_polled_during_cancel() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let poller = {
        let progress = h.progress.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seen = Vec::new();
            while !done.load(Ordering::SeqCst) {
                seen.push(progress.canceled());
            }
            seen.push(progress.canceled());
            seen
        })
    };

    assert!(h.probe.click_cancel());
    assert!(h.probe.wait_for(WAIT, |m| !m.cancel_enabled));
    // The flag is latched before the button is disabled
    assert!(h.progress.canceled());

    done.store(true, Ordering::SeqCst);
    let seen = poller.join().unwrap();

    let first_true = seen.iter().position(|c| *c).unwrap();
    assert!(seen[first_true..].iter().all(|c| *c), "flag went back to false");
    assert!(seen[..first_true].iter().all(|c| !*c));

    h.progress.stop().unwrap();
}

#[test]
fn test_veto_notifies_all_in_advise_order() {
    let config = BoxConfig {
        cancel_fan_out: CancelFanOut::NotifyAll,
        ..BoxConfig::default()
    };
    let h = harness_with(config, HeadlessViewFactory::new());
    let (tx, rx) = mpsc::channel();

    let first = h.progress.find_connection_point(EventKind::Cancel);
    let tx_first = tx.clone();
    first
        .advise(Arc::new(move |vote: &mut CancelVote| {
            vote.veto();
            tx_first.send("first").unwrap();
        }))
        .unwrap();

    let second = h.progress.find_connection_point(EventKind::Cancel);
    second
        .advise(Arc::new(move |vote: &mut CancelVote| {
            tx.send(if vote.is_allowed() { "second-allowed" } else { "second-vetoed" })
                .unwrap();
        }))
        .unwrap();

    h.progress.start(StartOptions::empty(), 0).unwrap();
    assert!(h.probe.click_cancel());

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "first");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "second-vetoed");
    assert!(eventually(|| {
        h.progress.metrics().cancel_vetoes.load(Ordering::Relaxed) == 1
    }));
    assert!(!h.progress.canceled());
    assert!(h.probe.snapshot().cancel_enabled);

    h.progress.stop().unwrap();
}

#[test]
fn test_veto_stops_fan_out_by_default() {
    let h = harness();
    let (tx, rx) = mpsc::channel::<&str>();

    let first = h.progress.find_connection_point(EventKind::Cancel);
    first
        .advise(Arc::new(|vote: &mut CancelVote| vote.veto()))
        .unwrap();
    let second = h.progress.find_connection_point(EventKind::Cancel);
    second
        .advise(Arc::new(move |_vote: &mut CancelVote| {
            tx.send("second").unwrap();
        }))
        .unwrap();

    h.progress.start(StartOptions::empty(), 0).unwrap();
    assert!(h.probe.click_cancel());

    assert!(eventually(|| {
        h.progress.metrics().cancel_vetoes.load(Ordering::Relaxed) == 1
    }));
    assert!(rx.try_recv().is_err());
    assert!(!h.progress.canceled());

    h.progress.stop().unwrap();
}

#[test]
fn test_concurrent_setters_on_distinct_fields() {
    let h = harness();
    h.progress.set_upper_bound(1000).unwrap();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    let counter = {
        let progress = h.progress.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                progress.increment(None).unwrap();
            }
        })
    };
    let writer = {
        let progress = h.progress.clone();
        thread::spawn(move || {
            for i in 0..200 {
                progress.set_message(&format!("message {}", i)).unwrap();
            }
        })
    };
    counter.join().unwrap();
    writer.join().unwrap();

    assert_eq!(h.progress.position(), 200);
    assert_eq!(h.progress.message(), "message 199");
    assert!(h
        .probe
        .wait_for(WAIT, |m| m.position == 200 && m.message == "message 199"));

    h.progress.stop().unwrap();
}

#[test]
fn test_append_to_note() {
    let h = harness();
    h.progress
        .start(StartOptions::APPEND_TO_NOTE | StartOptions::SHOW_PROGRESSBAR, 0)
        .unwrap();

    h.progress.set_note("A").unwrap();
    h.progress.set_note("B").unwrap();
    assert_eq!(h.progress.note(), "A\nB\n");
    assert!(h.probe.wait_for(WAIT, |m| m.note == "A\nB\n" && m.caret == 2));

    // Dropping the append bit switches back to replace mode
    h.progress.start(StartOptions::SHOW_PROGRESSBAR, 0).unwrap();
    h.progress.set_note("C").unwrap();
    assert_eq!(h.progress.note(), "C");
    assert!(h.probe.wait_for(WAIT, |m| m.note == "C"));

    h.progress.stop().unwrap();
}

#[test]
fn test_marquee_mode() {
    let h = harness();
    h.progress.start(StartOptions::MARQUEE, 40).unwrap();

    let model = h.probe.snapshot();
    assert_eq!(model.marquee, Some(40));
    assert!(model.progress_bar_shown);

    h.progress.start(StartOptions::SHOW_PROGRESSBAR, 0).unwrap();
    assert!(h.probe.wait_for(WAIT, |m| m.marquee.is_none()));

    h.progress.stop().unwrap();
}

#[test]
fn test_move_to_extreme_coordinates_keeps_view() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    h.progress.move_window(MoveFlag::XY, i32::MAX, i32::MAX).unwrap();
    assert!(h
        .probe
        .wait_for(WAIT, |m| m.frame.left == i32::MAX && m.frame.top == i32::MAX));

    h.progress.move_window(MoveFlag::XY, i32::MIN, i32::MIN).unwrap();
    assert!(h.probe.wait_for(WAIT, |m| m.frame.left == i32::MIN));

    assert!(h.progress.is_running());
    assert!(h.probe.is_alive());
    assert_eq!(h.progress.metrics().worker_panics.load(Ordering::Relaxed), 0);
    assert_eq!(h.progress.stop().unwrap(), StopOutcome::Stopped);
}

#[test]
fn test_move_and_move_none() {
    let factory =
        HeadlessViewFactory::with_geometry(Rect::new(0, 0, 1000, 800), Rect::new(0, 0, 200, 100));
    let h = harness_with(BoxConfig::default(), factory);
    h.progress.start(StartOptions::empty(), 0).unwrap();

    h.progress.move_window(MoveFlag::Center, 0, 0).unwrap();
    assert!(h
        .probe
        .wait_for(WAIT, |m| m.frame == Rect::new(400, 350, 600, 450)));

    h.progress.move_window(MoveFlag::None, 5, 5).unwrap();
    h.progress.set_position(3).unwrap();
    assert!(h.probe.wait_for(WAIT, |m| m.position == 3));
    assert_eq!(h.probe.snapshot().frame, Rect::new(400, 350, 600, 450));

    h.progress.move_window(MoveFlag::XY, 10, 20).unwrap();
    assert!(h
        .probe
        .wait_for(WAIT, |m| m.frame == Rect::new(10, 20, 210, 120)));

    h.progress.stop().unwrap();
}

#[test]
fn test_visibility_toggle() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    h.progress.set_visible(false).unwrap();
    assert!(h.probe.wait_for(WAIT, |m| !m.visible));
    assert!(h.progress.is_running());

    h.progress.set_visible(true).unwrap();
    assert!(h.probe.wait_for(WAIT, |m| m.visible));

    h.progress.stop().unwrap();
}

#[test]
fn test_startup_failure_leaves_box_stopped() {
    let h = harness();
    h.factory.fail_next_create("no display");

    let err = h.progress.start(StartOptions::empty(), 0).unwrap_err();
    assert!(matches!(
        err,
        ProgressBoxError::Resource(ResourceError::StartupFailed(_))
    ));
    assert!(!h.progress.is_running());
    assert!(h.progress.window_handle().is_none());
    assert_eq!(h.progress.metrics().startup_failures.load(Ordering::Relaxed), 1);

    // The next attempt is unaffected
    assert_eq!(
        h.progress.start(StartOptions::empty(), 0).unwrap(),
        StartOutcome::Started
    );
    h.progress.stop().unwrap();
}

#[test]
fn test_self_close_then_stop() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    assert!(h.probe.close());
    assert!(h.probe.wait_closed(WAIT));
    assert!(eventually(|| !h.progress.is_running()));

    assert_eq!(h.progress.stop().unwrap(), StopOutcome::Stopped);
    assert_eq!(h.progress.stop().unwrap(), StopOutcome::AlreadyStopped);
}

#[test]
fn test_setters_after_self_close_post_nothing() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();

    assert!(h.probe.close());
    assert!(eventually(|| !h.progress.is_running()));

    h.progress.set_position(5).unwrap();
    h.progress.set_message("after close").unwrap();

    assert_eq!(h.progress.position(), 5);
    assert_eq!(h.progress.message(), "after close");
    assert_eq!(h.progress.metrics().messages_dropped.load(Ordering::Relaxed), 0);

    // A restart picks the values up from shared state
    h.progress.start(StartOptions::empty(), 0).unwrap();
    let model = h.probe.snapshot();
    assert_eq!(model.position, 5);
    assert_eq!(model.message, "after close");
    h.progress.stop().unwrap();
}

#[test]
fn test_session_after_stop() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();
    h.progress.set_position(40).unwrap();
    h.progress.stop().unwrap();

    let err = h.progress.set_position(41).unwrap_err();
    assert!(matches!(
        err,
        ProgressBoxError::Lifecycle(LifecycleError::NotRunning)
    ));
    let err = h.progress.move_window(MoveFlag::None, 0, 0).unwrap_err();
    assert!(matches!(
        err,
        ProgressBoxError::Lifecycle(LifecycleError::NotRunning)
    ));
    assert_eq!(h.progress.position(), 40);

    // Setting the caption opens a fresh session from defaults
    h.progress.set_caption("Second run").unwrap();
    assert_eq!(h.progress.caption(), "Second run");
    assert_eq!(h.progress.position(), 0);
    h.progress.set_position(5).unwrap();

    h.progress.start(StartOptions::empty(), 0).unwrap();
    assert_eq!(h.probe.snapshot().title, "Second run");
    assert_eq!(h.probe.views_created(), 2);
    h.progress.stop().unwrap();
}

#[test]
fn test_window_handle_while_running() {
    let h = harness();
    assert!(h.progress.window_handle().is_none());

    h.progress.start(StartOptions::empty(), 0).unwrap();
    assert!(h.progress.window_handle().is_some());

    h.progress.stop().unwrap();
    assert!(h.progress.window_handle().is_none());
}

#[test]
fn test_registry_tracks_lifetime() {
    let h = harness();
    assert_eq!(h.registry.live_objects(), 1);
    assert!(!h.registry.can_unload());

    h.progress.start(StartOptions::empty(), 0).unwrap();
    h.progress.stop().unwrap();
    drop(h.progress);

    assert!(h.registry.can_unload());
}

#[test]
fn test_view_keeps_box_alive_after_last_handle() {
    let h = harness();
    h.progress.start(StartOptions::empty(), 0).unwrap();
    drop(h.progress);

    // Still on screen, still registered
    assert!(h.probe.is_alive());
    assert_eq!(h.registry.live_objects(), 1);

    assert!(h.probe.close());
    assert!(h.probe.wait_closed(WAIT));
    assert!(eventually(|| h.registry.can_unload()));
}

#[test]
fn test_state_changes_from_caller_threads() {
    let h = harness();
    let mut rx = h.progress.subscribe_state();

    h.progress.set_position(9).unwrap();
    let change = rx.try_recv().unwrap();
    assert_eq!(change, progressbox::StateChange::PositionChanged(9));

    // Unchanged writes are silent
    h.progress.set_position(9).unwrap();
    assert!(rx.try_recv().is_err());
}
