//! The authentication boundary: one attempt in, one result out.
//!
//! The child side (`face-unlock-auth --json`) prints a single [`AuthReport`]
//! line. The parent side ([`IsolatedAuthenticator`]) runs it with a hard
//! deadline so a hung camera can never hold up a login.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::session::SessionOutcome;
use crate::core::types::AuthResult;
use crate::process::run_bounded;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthReport {
    pub result: AuthResult,
    pub best_distance: Option<f32>,
    pub frames: u64,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl AuthReport {
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        Self {
            result: outcome.result,
            best_distance: outcome.best_distance.filter(|d| d.is_finite()),
            frames: outcome.frames,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// A report for attempts that ended before a session ran.
    pub fn bare(result: AuthResult) -> Self {
        Self {
            result,
            best_distance: None,
            frames: 0,
            elapsed_ms: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"result\":\"{}\"}}", self.result))
    }

    /// The last line of `stdout` that parses as a report.
    pub fn parse_last(stdout: &str) -> Option<Self> {
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .find_map(|line| serde_json::from_str(line).ok())
    }
}

/// Runs the authentication binary as a time-boxed child.
pub struct IsolatedAuthenticator {
    program: PathBuf,
    timeout: Duration,
    grace: Duration,
}

impl IsolatedAuthenticator {
    pub fn new(program: PathBuf, timeout: Duration, grace: Duration) -> Self {
        Self {
            program,
            timeout,
            grace,
        }
    }

    pub fn run(&self, username: &str) -> AuthResult {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--user", username, "--json"]);

        let limit = self.timeout.saturating_add(self.grace);
        let output = match run_bounded(&mut cmd, limit) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Failed to start authentication: {}", e);
                return AuthResult::CameraError;
            }
        };

        if output.timed_out() {
            tracing::warn!("Authentication exceeded {:?}, child killed", limit);
            return AuthResult::Timeout;
        }

        if let Some(report) = AuthReport::parse_last(&output.stdout) {
            tracing::debug!(
                "Attempt finished: {} after {} frames in {}ms",
                report.result,
                report.frames,
                report.elapsed_ms
            );
            return report.result;
        }

        // No report: trust only the exit status, and only a clean zero.
        if output.success() {
            AuthResult::Match
        } else {
            tracing::warn!("Authentication exited with {:?} and no report", output.status);
            AuthResult::NoMatch
        }
    }
}
