use std::path::PathBuf;
use std::time::{Duration, Instant};

use face_unlock::process::{ProcessKind, ProcessManager, SpawnError};

const NO_ENV: &[(&str, &str)] = &[];

fn pid_exists(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[test]
fn one_process_at_a_time() {
    let mut manager = ProcessManager::new(PathBuf::from("sleep"));
    let first = manager
        .spawn(ProcessKind::Warning, &["30".to_string()], NO_ENV)
        .unwrap();

    match manager.spawn(ProcessKind::Warning, &["30".to_string()], NO_ENV) {
        Err(SpawnError::AlreadyRunning(existing)) => assert_eq!(existing, first),
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }

    manager.terminate(first);
    assert!(!pid_exists(first.pid()));

    let second = manager
        .spawn(ProcessKind::Warning, &["30".to_string()], NO_ENV)
        .unwrap();
    assert!(second.id() > first.id());
    manager.shutdown();
    assert!(!pid_exists(second.pid()));
}

#[test]
fn stubborn_child_is_killed_after_grace() {
    let mut manager =
        ProcessManager::new(PathBuf::from("sh")).with_terminate_grace(Duration::from_millis(300));
    let args = ["-c".to_string(), "trap '' TERM; while :; do sleep 1; done".to_string()];
    let handle = manager.spawn(ProcessKind::Status, &args, NO_ENV).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    manager.terminate(handle);
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!pid_exists(handle.pid()));
    assert!(!manager.is_alive(handle));
}

#[test]
fn terminating_unknown_or_finished_handles_is_harmless() {
    let mut manager = ProcessManager::new(PathBuf::from("true"));
    let handle = manager.spawn(ProcessKind::Status, &[], NO_ENV).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    manager.terminate(handle);
    manager.terminate(handle);
    assert!(manager.current().is_none());
}

#[test]
fn environment_reaches_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let mut manager = ProcessManager::new(PathBuf::from("sh"));
    let args = ["-c".to_string(), "printf %s \"$FACE_UNLOCK_TEST\" > \"$MARKER\"".to_string()];
    let env = [
        ("FACE_UNLOCK_TEST", "present".to_string()),
        ("MARKER", marker.display().to_string()),
    ];
    let handle = manager.spawn(ProcessKind::Status, &args, &env).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.is_alive(handle) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "present");
}
