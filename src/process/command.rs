use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::common::{FaceUnlockError, Result};

const POLL_STEP: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct CommandOutput {
    /// `None` when the command was killed for running past its limit.
    pub status: Option<ExitStatus>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }
}

/// Run `cmd` to completion, killing it once `limit` has passed.
/// Stdout is captured, stdin and stderr are detached.
pub fn run_bounded(cmd: &mut Command, limit: Duration) -> Result<CommandOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| FaceUnlockError::Process(format!("Failed to spawn {:?}: {}", cmd.get_program(), e)))?;

    // Drain stdout on the side so a chatty child cannot block on a full pipe.
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        })
    });

    // A limit past the representable range means no deadline.
    let deadline = Instant::now().checked_add(limit);
    let status = loop {
        match child.try_wait()? {
            Some(status) => break Some(status),
            None if deadline.is_some_and(|d| Instant::now() >= d) => {
                tracing::warn!("{:?} exceeded {:?}, killing it", cmd.get_program(), limit);
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            None => std::thread::sleep(POLL_STEP),
        }
    };

    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    Ok(CommandOutput { status, stdout })
}
