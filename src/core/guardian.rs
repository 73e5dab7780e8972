//! Presence guardian: locks the session once the enrolled user has been
//! away for too long.
//!
//! One sequential loop owns all state. Each cycle refreshes the runtime
//! settings, polls the camera once through a [`PresenceSensor`], and moves
//! between `Monitoring`, `Warning` and `LockPending`. Sensor failures count
//! as the user being present, so an unreadable camera never locks anyone out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::common::config::GuardianConfig;
use crate::common::{Clock, ConfigProvider, RuntimeConfig};
use crate::core::perception::PresenceSensor;
use crate::core::types::Presence;
use crate::process::{Feedback, FeedbackSink, ProcessHandle, SessionLock};
use crate::storage::TemplateSource;

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Monitoring,
    Warning,
    LockPending,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Guarding disabled or the screen already locked.
    Idle,
    /// Nothing enrolled for the user.
    Paused,
    Seen,
    Away,
    Warned,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub phase: Phase,
    pub action: TickAction,
    /// `None` when no poll happened this cycle.
    pub presence: Option<Presence>,
    pub sleep: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct GuardianTiming {
    pub poll: Duration,
    pub idle: Duration,
    pub paused: Duration,
}

impl GuardianTiming {
    pub fn from_config(config: &GuardianConfig) -> Self {
        Self {
            poll: Duration::from_millis(config.poll_interval_ms),
            idle: Duration::from_millis(config.idle_sleep_ms),
            paused: Duration::from_millis(config.paused_sleep_ms),
        }
    }
}

impl Default for GuardianTiming {
    fn default() -> Self {
        Self::from_config(&GuardianConfig::default())
    }
}

/// Capabilities the guardian drives.
pub struct GuardianParts {
    pub config: Box<dyn ConfigProvider>,
    pub templates: Box<dyn TemplateSource>,
    pub sensor: Box<dyn PresenceSensor>,
    pub lock: Box<dyn SessionLock>,
    pub feedback: Box<dyn FeedbackSink>,
}

#[derive(Debug)]
struct GuardianState {
    phase: Phase,
    last_seen_at: Instant,
    warning: Option<ProcessHandle>,
}

pub struct Guardian<C: Clock> {
    username: String,
    timing: GuardianTiming,
    parts: GuardianParts,
    clock: C,
    state: GuardianState,
}

impl<C: Clock> Guardian<C> {
    pub fn new(username: &str, timing: GuardianTiming, parts: GuardianParts, clock: C) -> Self {
        let now = clock.now();
        Self {
            username: username.to_string(),
            timing,
            parts,
            clock,
            state: GuardianState {
                phase: Phase::Monitoring,
                last_seen_at: now,
                warning: None,
            },
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn warning(&self) -> Option<ProcessHandle> {
        self.state.warning
    }

    pub fn absent_for(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.state.last_seen_at)
    }

    /// One guardian cycle. Never fails.
    pub fn tick(&mut self) -> Tick {
        let runtime = self.parts.config.refresh();

        if !runtime.guard_enabled || self.parts.lock.is_locked() {
            if runtime.guard_enabled {
                tracing::debug!("Screen already locked, standing by");
            }
            self.reset_to_monitoring();
            return self.finish(TickAction::Idle, None, self.timing.idle);
        }

        let template = self.parts.templates.load_or_empty(&self.username);
        if template.is_empty() {
            tracing::debug!("No face enrolled for {}, guardian paused", self.username);
            self.reset_to_monitoring();
            return self.finish(TickAction::Paused, None, self.timing.paused);
        }

        let presence = match self.parts.sensor.check(&template, runtime.threshold) {
            Ok(presence) => presence,
            Err(e) => {
                tracing::warn!("Presence check failed, assuming user present: {}", e);
                Presence::Authorized
            }
        };

        let action = match presence {
            Presence::Authorized => {
                self.reset_to_monitoring();
                TickAction::Seen
            }
            Presence::PresentUnauthorized | Presence::Absent => self.on_away(presence, &runtime),
        };
        self.finish(action, Some(presence), self.timing.poll)
    }

    fn on_away(&mut self, presence: Presence, runtime: &RuntimeConfig) -> TickAction {
        let now = self.clock.now();
        let absent = now.saturating_duration_since(self.state.last_seen_at);
        tracing::debug!("{:?} for {:.1}s", presence, absent.as_secs_f32());

        if absent >= runtime.lock_delay {
            tracing::info!(
                "User away for {}s (lock delay {}s), locking",
                absent.as_secs(),
                runtime.lock_delay.as_secs()
            );
            self.dismiss_warning();
            self.parts.lock.lock();
            self.state.last_seen_at = now;
            self.state.phase = Phase::LockPending;
            return TickAction::Locked;
        }

        if self.state.phase == Phase::LockPending {
            self.state.phase = Phase::Monitoring;
        }

        if absent >= runtime.warning_delay && self.state.warning.is_none() {
            let remaining = (runtime.lock_delay - absent).as_secs().max(1);
            match self.parts.feedback.show(Feedback::Warning { remaining }) {
                Some(handle) => {
                    tracing::info!("User away, locking in {}s unless they return", remaining);
                    self.state.warning = Some(handle);
                    self.state.phase = Phase::Warning;
                    return TickAction::Warned;
                }
                None => tracing::debug!("Warning not shown, retrying next poll"),
            }
        }

        TickAction::Away
    }

    fn reset_to_monitoring(&mut self) {
        self.state.last_seen_at = self.clock.now();
        self.dismiss_warning();
        self.state.phase = Phase::Monitoring;
    }

    fn dismiss_warning(&mut self) {
        if let Some(handle) = self.state.warning.take() {
            self.parts.feedback.dismiss(handle);
        }
    }

    fn finish(&self, action: TickAction, presence: Option<Presence>, sleep: Duration) -> Tick {
        Tick {
            phase: self.state.phase,
            action,
            presence,
            sleep,
        }
    }

    /// Cycle until `shutdown` is raised, then clean up.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        tracing::info!("Guardian started for {}", self.username);
        while !shutdown.load(Ordering::SeqCst) {
            let tick = self.tick();
            self.sleep_unless(shutdown, tick.sleep);
        }
        self.shutdown();
        tracing::info!("Guardian stopped");
    }

    fn sleep_unless(&self, shutdown: &AtomicBool, total: Duration) {
        let mut left = total;
        while !left.is_zero() && !shutdown.load(Ordering::SeqCst) {
            let step = left.min(SHUTDOWN_POLL);
            self.clock.sleep(step);
            left -= step;
        }
    }

    /// Takes down any warning still on screen.
    pub fn shutdown(&mut self) {
        self.dismiss_warning();
    }
}
