use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use face_unlock::common::{ManualClock, RuntimeConfig, StaticConfigProvider};
use face_unlock::core::{Guardian, GuardianParts, GuardianTiming, Phase, Presence, Template, TickAction};
use face_unlock::process::{Feedback, FeedbackSink, ProcessKind, SessionEnvResolver, UiFeedback};
use face_unlock::testing::{CountingLock, RecordingFeedback, ScriptedPresence};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn guarded() -> RuntimeConfig {
    RuntimeConfig {
        guard_enabled: true,
        warning_delay: Duration::from_secs(5),
        lock_delay: Duration::from_secs(30),
        ..RuntimeConfig::default()
    }
}

fn at(clock: &ManualClock, secs: u64) {
    clock.set_elapsed(Duration::from_secs(secs));
}

fn parts(
    config: &StaticConfigProvider,
    sensor: &ScriptedPresence,
    lock: &CountingLock,
    feedback: Box<dyn FeedbackSink>,
) -> GuardianParts {
    GuardianParts {
        config: Box::new(config.clone()),
        templates: Box::new(Template::new(vec![vec![0.1, 0.2, 0.3]])),
        sensor: Box::new(sensor.clone()),
        lock: Box::new(lock.clone()),
        feedback,
    }
}

#[test]
fn absent_user_is_warned_then_locked() {
    let clock = ManualClock::new();
    let config = StaticConfigProvider::new(guarded());
    let sensor = ScriptedPresence::new(Presence::Absent);
    let lock = CountingLock::default();
    let feedback = RecordingFeedback::default();
    let mut guardian = Guardian::new(
        "alice",
        GuardianTiming::default(),
        parts(&config, &sensor, &lock, Box::new(feedback.clone())),
        &clock,
    );

    for t in [0, 2, 4] {
        at(&clock, t);
        assert_eq!(guardian.tick().action, TickAction::Away);
    }
    assert!(feedback.shown().is_empty());

    at(&clock, 5);
    let tick = guardian.tick();
    assert_eq!(tick.action, TickAction::Warned);
    assert_eq!(tick.phase, Phase::Warning);
    assert_eq!(feedback.shown(), vec![Feedback::Warning { remaining: 25 }]);
    let warning = guardian.warning().unwrap();

    for t in (7..30).step_by(2) {
        at(&clock, t);
        assert_eq!(guardian.tick().action, TickAction::Away);
    }
    assert_eq!(feedback.shown().len(), 1);
    assert_eq!(lock.locks(), 0);

    at(&clock, 30);
    let tick = guardian.tick();
    assert_eq!(tick.action, TickAction::Locked);
    assert_eq!(tick.phase, Phase::LockPending);
    assert_eq!(lock.locks(), 1);
    assert_eq!(feedback.dismissed(), vec![warning]);
    assert!(feedback.live().is_empty());

    sensor.set(Presence::Authorized);
    at(&clock, 31);
    let tick = guardian.tick();
    assert_eq!(tick.action, TickAction::Seen);
    assert_eq!(tick.phase, Phase::Monitoring);
    assert_eq!(guardian.absent_for(), Duration::ZERO);
    assert_eq!(lock.locks(), 1);
}

#[test]
fn returning_user_cancels_the_warning() {
    let clock = ManualClock::new();
    let config = StaticConfigProvider::new(guarded());
    let sensor = ScriptedPresence::new(Presence::Absent);
    let lock = CountingLock::default();
    let feedback = RecordingFeedback::default();
    let mut guardian = Guardian::new(
        "alice",
        GuardianTiming::default(),
        parts(&config, &sensor, &lock, Box::new(feedback.clone())),
        &clock,
    );

    at(&clock, 0);
    guardian.tick();
    at(&clock, 12);
    assert_eq!(guardian.tick().action, TickAction::Warned);

    sensor.set(Presence::Authorized);
    at(&clock, 14);
    guardian.tick();
    assert!(feedback.live().is_empty());
    assert_eq!(guardian.phase(), Phase::Monitoring);

    // A fresh absence window starts from the last sighting.
    sensor.set(Presence::Absent);
    at(&clock, 43);
    assert_eq!(guardian.tick().action, TickAction::Warned);
    assert_eq!(lock.locks(), 0);
}

#[test]
fn disabling_the_guard_mid_warning_dismisses_it() {
    let clock = ManualClock::new();
    let config = StaticConfigProvider::new(guarded());
    let sensor = ScriptedPresence::new(Presence::Absent);
    let lock = CountingLock::default();
    let feedback = RecordingFeedback::default();
    let mut guardian = Guardian::new(
        "alice",
        GuardianTiming::default(),
        parts(&config, &sensor, &lock, Box::new(feedback.clone())),
        &clock,
    );

    at(&clock, 0);
    guardian.tick();
    at(&clock, 6);
    assert_eq!(guardian.tick().action, TickAction::Warned);

    config.set(RuntimeConfig::default());
    at(&clock, 40);
    assert_eq!(guardian.tick().action, TickAction::Idle);
    assert!(feedback.live().is_empty());
    assert_eq!(lock.locks(), 0);
}

fn fake_ui(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("face-unlock-ui");
    fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn pid_exists(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[test]
fn warning_process_is_terminated_on_lock() {
    let dir = TempDir::new().unwrap();
    let inherited: HashMap<String, String> = [("DISPLAY".to_string(), ":0".to_string())].into();
    let resolver = SessionEnvResolver::new(dir.path().join("run"), dir.path().join("x11"), inherited);
    let ui = UiFeedback::new(fake_ui(&dir), resolver, 1000);

    let clock = ManualClock::new();
    let config = StaticConfigProvider::new(guarded());
    let sensor = ScriptedPresence::new(Presence::Absent);
    let lock = CountingLock::default();
    let mut guardian = Guardian::new(
        "alice",
        GuardianTiming::default(),
        parts(&config, &sensor, &lock, Box::new(ui)),
        &clock,
    );

    at(&clock, 0);
    guardian.tick();
    at(&clock, 5);
    assert_eq!(guardian.tick().action, TickAction::Warned);
    let warning = guardian.warning().expect("warning process launched");
    assert_eq!(warning.kind(), ProcessKind::Warning);
    assert!(pid_exists(warning.pid()));

    at(&clock, 30);
    assert_eq!(guardian.tick().action, TickAction::Locked);
    assert!(guardian.warning().is_none());
    assert!(!pid_exists(warning.pid()));
    assert_eq!(lock.locks(), 1);
}
