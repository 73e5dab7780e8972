//! Bounded-time authentication attempt.
//!
//! `Starting -> Scanning -> {Matched, NotMatched, NoFaceTimeout, CameraFailed,
//! NoEncodingsAvailable, Aborted}`. The first matching frame wins; a mismatch
//! never ends the attempt, only the timeout or an abort does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::config::AuthConfig;
use crate::common::{Clock, RuntimeConfig};
use crate::core::aggregator::SampleAggregator;
use crate::core::matcher::Matcher;
use crate::core::observer::{AuthEvent, AuthObserver};
use crate::core::perception::Perception;
use crate::core::types::{AuthResult, FrameVerdict, Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Scanning,
    Matched,
    NotMatched,
    NoFaceTimeout,
    CameraFailed,
    NoEncodingsAvailable,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Starting | SessionState::Scanning)
    }
}

/// Shared abort flag, checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timeout: Duration,
    pub process_every_nth: u32,
    pub warmup_ticks: u32,
    pub frame_retry_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default(), &RuntimeConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(auth: &AuthConfig, runtime: &RuntimeConfig) -> Self {
        Self {
            timeout: runtime.timeout,
            process_every_nth: auth.process_every_nth.max(1),
            warmup_ticks: auth.warmup_ticks,
            frame_retry_delay: auth.frame_retry_delay(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub result: AuthResult,
    pub state: SessionState,
    /// Closest distance seen over the attempt, if any face was compared.
    pub best_distance: Option<f32>,
    /// Frames analysed (skipped and unreadable frames excluded).
    pub frames: u64,
    pub elapsed: Duration,
}

impl SessionOutcome {
    fn immediate(result: AuthResult, state: SessionState) -> Self {
        Self {
            result,
            state,
            best_distance: None,
            frames: 0,
            elapsed: Duration::ZERO,
        }
    }
}

pub struct AuthSession<'a, C: Clock> {
    settings: SessionSettings,
    matcher: &'a dyn Matcher,
    clock: C,
    cancel: CancelToken,
    state: SessionState,
}

impl<'a, C: Clock> AuthSession<'a, C> {
    pub fn new(settings: SessionSettings, matcher: &'a dyn Matcher, clock: C) -> Self {
        Self {
            settings,
            matcher,
            clock,
            cancel: CancelToken::new(),
            state: SessionState::Starting,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the attempt to its terminal state. Consumes the session: an
    /// attempt produces exactly one result.
    pub fn run(
        mut self,
        perception: &mut dyn Perception,
        template: &Template,
        observer: &mut dyn AuthObserver,
    ) -> SessionOutcome {
        if template.is_empty() {
            tracing::info!("No reference encodings, skipping camera");
            self.state = SessionState::NoEncodingsAvailable;
            return SessionOutcome::immediate(AuthResult::NoEncodings, self.state);
        }

        let mut stream = match perception.open() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Cannot open camera: {}", e);
                self.state = SessionState::CameraFailed;
                return SessionOutcome::immediate(AuthResult::CameraError, self.state);
            }
        };

        self.state = SessionState::Scanning;
        observer.on_event(&AuthEvent::Scanning);

        let start = self.clock.now();
        let mut aggregator = SampleAggregator::unthrottled(self.settings.warmup_ticks);
        let mut tick: u64 = 0;
        let mut frames: u64 = 0;
        let mut best_distance: Option<f32> = None;

        let result = loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Authentication aborted");
                self.state = SessionState::Aborted;
                break AuthResult::Aborted;
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed > self.settings.timeout {
                self.state = if best_distance.is_some() {
                    SessionState::NotMatched
                } else {
                    SessionState::NoFaceTimeout
                };
                tracing::info!("Face unlock timed out after {} frames", frames);
                break AuthResult::Timeout;
            }

            tick += 1;
            if tick % u64::from(self.settings.process_every_nth) != 0 {
                if let Err(e) = stream.grab() {
                    tracing::debug!("Skipped frame unreadable: {}", e);
                    self.clock.sleep(self.settings.frame_retry_delay);
                }
                continue;
            }

            let verdict = match stream.next_verdict() {
                Ok(verdict) => verdict,
                Err(e) => {
                    tracing::warn!("Failed to read camera frame: {}", e);
                    self.clock.sleep(self.settings.frame_retry_delay);
                    continue;
                }
            };
            frames += 1;

            let sample = aggregator.consider(&verdict, self.clock.now());
            if aggregator.in_warmup() {
                continue;
            }

            match (&verdict, sample) {
                (FrameVerdict::OneFace(_), Some(encoding)) => {
                    let outcome = self.matcher.compare(&encoding, &template.encodings);
                    best_distance = Some(
                        best_distance.map_or(outcome.distance, |d| d.min(outcome.distance)),
                    );
                    tracing::debug!("Min distance: {:.3}", outcome.distance);

                    if outcome.matched {
                        observer.on_event(&AuthEvent::Success {
                            confidence: outcome.confidence(),
                        });
                        self.state = SessionState::Matched;
                        break AuthResult::Match;
                    }
                    observer.on_event(&AuthEvent::NoMatch {
                        distance: outcome.distance,
                    });
                }
                (FrameVerdict::NoFace, _) => {
                    observer.on_event(&AuthEvent::NoFace { elapsed });
                }
                (FrameVerdict::MultipleFaces, _) => {
                    tracing::debug!("Multiple faces in frame, ignoring");
                }
                (FrameVerdict::OneFace(_), None) => {}
            }
        };

        drop(stream);

        SessionOutcome {
            result,
            state: self.state,
            best_distance,
            frames,
            elapsed: self.clock.now().saturating_duration_since(start),
        }
    }
}
