//! State signals for the on-screen helper.
//!
//! The core only emits transitions; rendering is someone else's problem.

use std::path::PathBuf;

use crate::process::manager::{ProcessHandle, ProcessKind, ProcessManager, SpawnError};
use crate::process::session_env::SessionEnvResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Scanning { timeout: u64 },
    Success,
    Failed,
    Warning { remaining: u64 },
    Idle,
}

impl Feedback {
    pub fn mode(&self) -> &'static str {
        match self {
            Feedback::Scanning { .. } => "scanning",
            Feedback::Success => "success",
            Feedback::Failed => "failed",
            Feedback::Warning { .. } => "warning",
            Feedback::Idle => "idle",
        }
    }

    pub fn kind(&self) -> ProcessKind {
        match self {
            Feedback::Warning { .. } => ProcessKind::Warning,
            _ => ProcessKind::Status,
        }
    }

    /// Command line understood by the helper: `--mode <mode> [--timeout N]`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--mode".to_string(), self.mode().to_string()];
        match self {
            Feedback::Scanning { timeout } => {
                args.push("--timeout".to_string());
                args.push(timeout.to_string());
            }
            Feedback::Warning { remaining } => {
                args.push("--timeout".to_string());
                args.push(remaining.to_string());
            }
            _ => {}
        }
        args
    }
}

pub trait FeedbackSink {
    /// Display `feedback`. `None` means nothing is on screen; this is never
    /// an error for the caller.
    fn show(&mut self, feedback: Feedback) -> Option<ProcessHandle>;

    fn dismiss(&mut self, handle: ProcessHandle);

    fn is_live(&mut self, handle: ProcessHandle) -> bool;
}

/// Used when the helper is disabled.
pub struct NullFeedback;

impl FeedbackSink for NullFeedback {
    fn show(&mut self, feedback: Feedback) -> Option<ProcessHandle> {
        tracing::debug!("Feedback disabled, not showing {}", feedback.mode());
        None
    }

    fn dismiss(&mut self, _handle: ProcessHandle) {}

    fn is_live(&mut self, _handle: ProcessHandle) -> bool {
        false
    }
}

/// Launches the helper program into the user's graphical session.
pub struct UiFeedback {
    manager: ProcessManager,
    resolver: SessionEnvResolver,
    uid: u32,
    extra_env: Vec<(String, String)>,
}

impl UiFeedback {
    pub fn new(program: PathBuf, resolver: SessionEnvResolver, uid: u32) -> Self {
        Self::with_manager(ProcessManager::new(program), resolver, uid)
    }

    pub fn with_manager(manager: ProcessManager, resolver: SessionEnvResolver, uid: u32) -> Self {
        Self {
            manager,
            resolver,
            uid,
            extra_env: Vec::new(),
        }
    }

    /// Extra variable handed to every launch (the helper reads `SUDO_USER`
    /// to find whose session it is drawing on).
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.extra_env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn shutdown(&mut self) {
        self.manager.shutdown();
    }

    /// Leave the current display running on its own, reaped in the background.
    pub fn detach(&mut self) {
        self.manager.detach();
    }
}

impl FeedbackSink for UiFeedback {
    fn show(&mut self, feedback: Feedback) -> Option<ProcessHandle> {
        if !self.manager.program().exists() {
            tracing::debug!(
                "Feedback program {} not installed",
                self.manager.program().display()
            );
            return None;
        }

        let Some(session) = self.resolver.resolve(self.uid) else {
            tracing::info!(
                "No graphical session for uid {}, skipping {} feedback",
                self.uid,
                feedback.mode()
            );
            return None;
        };

        let mut env: Vec<(String, String)> = session.vars().to_vec();
        env.extend(self.extra_env.iter().cloned());

        match self.manager.spawn(feedback.kind(), &feedback.to_args(), &env) {
            Ok(handle) => Some(handle),
            Err(SpawnError::AlreadyRunning(existing)) => {
                tracing::debug!("Feedback process {} still running", existing.id());
                Some(existing)
            }
            Err(e) => {
                tracing::warn!("Could not show {} feedback: {}", feedback.mode(), e);
                None
            }
        }
    }

    fn dismiss(&mut self, handle: ProcessHandle) {
        self.manager.terminate(handle);
    }

    fn is_live(&mut self, handle: ProcessHandle) -> bool {
        self.manager.is_alive(handle)
    }
}
