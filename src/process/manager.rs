//! Lifecycle of the auxiliary feedback process.
//!
//! At most one child is tracked at a time. Spawning while it is alive is
//! rejected, terminating an unknown or already-dead handle does nothing.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    /// Absence countdown shown by the guardian.
    Warning,
    /// Scanning / success / failure display around an authentication attempt.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    id: u64,
    pid: u32,
    kind: ProcessKind,
}

impl ProcessHandle {
    pub fn new(id: u64, pid: u32, kind: ProcessKind) -> Self {
        Self { id, pid, kind }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn kind(&self) -> ProcessKind {
        self.kind
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("a {:?} process is already running (pid {})", .0.kind, .0.pid)]
    AlreadyRunning(ProcessHandle),

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

struct Tracked {
    handle: ProcessHandle,
    child: Child,
}

pub struct ProcessManager {
    program: PathBuf,
    terminate_grace: Duration,
    tracked: Option<Tracked>,
    next_id: u64,
}

impl ProcessManager {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            terminate_grace: Duration::from_millis(500),
            tracked: None,
            next_id: 1,
        }
    }

    /// How long a child gets to exit after SIGTERM before it is killed.
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn spawn<K, V>(
        &mut self,
        kind: ProcessKind,
        args: &[String],
        env: &[(K, V)],
    ) -> Result<ProcessHandle, SpawnError>
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        if let Some(handle) = self.current() {
            if self.is_alive(handle) {
                return Err(SpawnError::AlreadyRunning(handle));
            }
        }
        // Whatever was tracked has exited and been reaped by `is_alive`.
        self.tracked = None;

        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null());
        for (key, value) in env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|source| SpawnError::Launch {
            program: self.program.display().to_string(),
            source,
        })?;

        let handle = ProcessHandle {
            id: self.next_id,
            pid: child.id(),
            kind,
        };
        self.next_id += 1;

        tracing::info!(
            "Launched {:?} process {} (pid {}): {} {}",
            kind,
            handle.id,
            handle.pid,
            self.program.display(),
            args.join(" ")
        );
        self.tracked = Some(Tracked { handle, child });
        Ok(handle)
    }

    /// The tracked handle, alive or not.
    pub fn current(&self) -> Option<ProcessHandle> {
        self.tracked.as_ref().map(|t| t.handle)
    }

    pub fn is_alive(&mut self, handle: ProcessHandle) -> bool {
        match self.tracked.as_mut() {
            Some(tracked) if tracked.handle == handle => {
                matches!(tracked.child.try_wait(), Ok(None))
            }
            _ => false,
        }
    }

    /// SIGTERM, bounded wait, then SIGKILL. The child is always reaped.
    pub fn terminate(&mut self, handle: ProcessHandle) {
        let matches = self
            .tracked
            .as_ref()
            .map(|t| t.handle == handle)
            .unwrap_or(false);
        if !matches {
            tracing::debug!("Ignoring terminate for untracked process {}", handle.id);
            return;
        }
        let Some(mut tracked) = self.tracked.take() else {
            return;
        };

        if let Ok(Some(_)) = tracked.child.try_wait() {
            tracing::debug!("Process {} had already exited", handle.id);
            return;
        }

        // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
        let rc = unsafe { libc::kill(handle.pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            tracing::debug!("SIGTERM to pid {} failed: {}", handle.pid, std::io::Error::last_os_error());
        }

        let deadline = Instant::now() + self.terminate_grace;
        loop {
            match tracked.child.try_wait() {
                Ok(Some(_)) => {
                    tracing::debug!("Process {} terminated", handle.id);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                _ => break,
            }
        }

        tracing::warn!("Process {} ignored SIGTERM, killing it", handle.id);
        let _ = tracked.child.kill();
        let _ = tracked.child.wait();
    }

    /// Stop tracking the current child and let it run to completion.
    /// A background thread waits on it so no zombie is left behind in a
    /// long-lived host process.
    pub fn detach(&mut self) -> Option<ProcessHandle> {
        let Tracked { handle, mut child } = self.tracked.take()?;
        let spawned = std::thread::Builder::new()
            .name(format!("reap-{}", handle.pid))
            .spawn(move || {
                let _ = child.wait();
            });
        if let Err(e) = spawned {
            tracing::warn!("Could not start reaper for pid {}: {}", handle.pid, e);
        }
        tracing::debug!("Detached process {} (pid {})", handle.id, handle.pid);
        Some(handle)
    }

    /// Terminate whatever is tracked.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.current() {
            self.terminate(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ENV: &[(&str, &str)] = &[];

    fn sleeper() -> ProcessManager {
        ProcessManager::new(PathBuf::from("sleep")).with_terminate_grace(Duration::from_millis(200))
    }

    #[test]
    fn test_second_spawn_is_rejected_while_alive() {
        let mut manager = sleeper();
        let first = manager.spawn(ProcessKind::Warning, &["30".to_string()], NO_ENV).unwrap();

        match manager.spawn(ProcessKind::Warning, &["30".to_string()], NO_ENV) {
            Err(SpawnError::AlreadyRunning(existing)) => assert_eq!(existing, first),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        assert!(manager.is_alive(first));

        manager.terminate(first);
        assert!(!manager.is_alive(first));
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut manager = sleeper();
        let handle = manager.spawn(ProcessKind::Status, &["30".to_string()], NO_ENV).unwrap();
        manager.terminate(handle);
        manager.terminate(handle);
        assert!(!manager.is_alive(handle));
    }

    #[test]
    fn test_exited_child_frees_the_slot() {
        let mut manager = ProcessManager::new(PathBuf::from("true"));
        let first = manager.spawn(ProcessKind::Status, &[], NO_ENV).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.is_alive(first) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let second = manager.spawn(ProcessKind::Status, &[], NO_ENV).unwrap();
        assert_ne!(first.id(), second.id());
        manager.shutdown();
    }

    #[test]
    fn test_detached_child_is_reaped() {
        let mut manager = ProcessManager::new(PathBuf::from("true"));
        let handle = manager.spawn(ProcessKind::Status, &[], NO_ENV).unwrap();
        assert_eq!(manager.detach(), Some(handle));
        assert!(manager.current().is_none());
        assert_eq!(manager.detach(), None);

        // An unreaped zombie still answers signal 0.
        let deadline = Instant::now() + Duration::from_secs(5);
        let pid = handle.pid() as libc::pid_t;
        // SAFETY: signal 0 only checks for existence.
        while unsafe { libc::kill(pid, 0) } == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_ne!(unsafe { libc::kill(pid, 0) }, 0);
    }

    #[test]
    fn test_launch_failure_is_reported() {
        let mut manager = ProcessManager::new(PathBuf::from("/nonexistent/face-unlock-ui"));
        assert!(matches!(
            manager.spawn(ProcessKind::Warning, &[], NO_ENV),
            Err(SpawnError::Launch { .. })
        ));
        assert!(manager.current().is_none());
    }
}
