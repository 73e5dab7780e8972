//! Screen locking through the desktop's own tools.
//!
//! Every step is bounded and best-effort. Failures are logged, never raised.

use std::process::Command;
use std::time::Duration;

use crate::process::command::run_bounded;
use crate::process::session_env::{SessionEnv, SessionEnvResolver};

const SCREENSAVER_DEST: &str = "org.gnome.ScreenSaver";
const SCREENSAVER_PATH: &str = "/org/gnome/ScreenSaver";

pub trait SessionLock {
    /// Whether the user's screen is already locked. Unknown counts as
    /// unlocked.
    fn is_locked(&self) -> bool;

    fn lock(&self);
}

pub struct DesktopLocker {
    username: String,
    uid: u32,
    resolver: SessionEnvResolver,
    command_timeout: Duration,
    settle: Duration,
}

impl DesktopLocker {
    pub fn new(username: &str, uid: u32, resolver: SessionEnvResolver) -> Self {
        Self {
            username: username.to_string(),
            uid,
            resolver,
            command_timeout: Duration::from_secs(3),
            settle: Duration::from_millis(500),
        }
    }

    fn gdbus(&self, method: &str, env: &SessionEnv) -> Option<String> {
        let mut cmd = Command::new("gdbus");
        cmd.args([
            "call",
            "--session",
            "--dest",
            SCREENSAVER_DEST,
            "--object-path",
            SCREENSAVER_PATH,
            "--method",
            &format!("{}.{}", SCREENSAVER_DEST, method),
        ]);
        for (key, value) in env.vars() {
            cmd.env(key, value);
        }

        match run_bounded(&mut cmd, self.command_timeout) {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(out) => {
                tracing::debug!("gdbus {} failed (status {:?})", method, out.status);
                None
            }
            Err(e) => {
                tracing::debug!("gdbus {} unavailable: {}", method, e);
                None
            }
        }
    }

    fn lock_sessions(&self) -> bool {
        let listing = match run_bounded(
            Command::new("loginctl").args(["list-sessions", "--no-legend"]),
            self.command_timeout,
        ) {
            Ok(out) if out.success() => out.stdout,
            Ok(out) => {
                tracing::warn!("loginctl list-sessions failed (status {:?})", out.status);
                return false;
            }
            Err(e) => {
                tracing::warn!("loginctl unavailable: {}", e);
                return false;
            }
        };

        let sessions = parse_user_sessions(&listing, &self.username);
        if sessions.is_empty() {
            tracing::warn!("No login session found for {}", self.username);
            return false;
        }

        let mut requested = false;
        for id in sessions {
            tracing::info!("Locking session {} for {}", id, self.username);
            match run_bounded(
                Command::new("loginctl").args(["lock-session", id.as_str()]),
                self.command_timeout,
            ) {
                Ok(out) if out.success() => requested = true,
                Ok(out) => tracing::warn!("loginctl lock-session {} failed (status {:?})", id, out.status),
                Err(e) => tracing::warn!("loginctl lock-session {} failed: {}", id, e),
            }
        }
        requested
    }
}

impl SessionLock for DesktopLocker {
    fn is_locked(&self) -> bool {
        let env = self.resolver.fallback(self.uid);
        self.gdbus("GetActive", &env)
            .map(|out| parse_screensaver_active(&out))
            .unwrap_or(false)
    }

    fn lock(&self) {
        if self.lock_sessions() {
            std::thread::sleep(self.settle);
            if self.is_locked() {
                tracing::info!("Screen locked via loginctl");
                return;
            }
            tracing::info!("Session lock requested but screen not reported locked");
        }

        let env = self.resolver.fallback(self.uid);
        if self.gdbus("Lock", &env).is_some() {
            tracing::info!("Screen locked via ScreenSaver interface");
        } else {
            tracing::error!("All lock methods failed for {}", self.username);
        }
    }
}

/// Session ids from `loginctl list-sessions --no-legend` owned by `username`.
///
/// Rows look like `SESSION UID USER SEAT TTY ...`; the user is matched
/// against whole columns, never substrings.
pub fn parse_user_sessions(listing: &str, username: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let id = columns.next()?;
            columns.any(|c| c == username).then(|| id.to_string())
        })
        .collect()
}

/// `gdbus` prints the reply tuple, e.g. `(true,)`.
pub fn parse_screensaver_active(reply: &str) -> bool {
    reply
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .next()
        .map(|v| v.trim() == "true")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_sessions_matches_user_column() {
        let listing = "\
     2 1000 alice seat0 tty2
     5 1001 alicia seat0 tty3
    c1  120 gdm   seat0 tty1
     7 1000 alice       pts/0
";
        assert_eq!(parse_user_sessions(listing, "alice"), vec!["2", "7"]);
        assert_eq!(parse_user_sessions(listing, "gdm"), vec!["c1"]);
        assert!(parse_user_sessions(listing, "ali").is_empty());
        assert!(parse_user_sessions("", "alice").is_empty());
    }

    #[test]
    fn test_parse_screensaver_reply() {
        assert!(parse_screensaver_active("(true,)\n"));
        assert!(!parse_screensaver_active("(false,)\n"));
        assert!(!parse_screensaver_active(""));
    }
}
