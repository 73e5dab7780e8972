//! In-memory stand-ins for the camera, screen lock and feedback helper.
//!
//! Each double is a cheap clone over shared state, so a test can hand one
//! copy to the code under test and inspect another afterwards.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{FaceUnlockError, ManualClock, Result};
use crate::core::perception::{Perception, PresenceSensor, VerdictStream};
use crate::core::types::{FrameVerdict, Presence, Template};
use crate::process::{Feedback, FeedbackSink, ProcessHandle, SessionLock};

#[derive(Default)]
struct PresenceScript {
    current: Option<Presence>,
    pending_error: Option<FaceUnlockError>,
    checks: usize,
    raise: Option<(usize, Arc<AtomicBool>)>,
}

/// Presence sensor answering with whatever the test last set.
#[derive(Clone)]
pub struct ScriptedPresence {
    inner: Rc<RefCell<PresenceScript>>,
}

impl ScriptedPresence {
    pub fn new(initial: Presence) -> Self {
        let script = PresenceScript {
            current: Some(initial),
            ..Default::default()
        };
        Self {
            inner: Rc::new(RefCell::new(script)),
        }
    }

    pub fn set(&self, presence: Presence) {
        self.inner.borrow_mut().current = Some(presence);
    }

    /// The next check fails with `error`.
    pub fn fail(&self, error: FaceUnlockError) {
        self.inner.borrow_mut().pending_error = Some(error);
    }

    /// Raise `flag` once `checks` polls have happened.
    pub fn raise_after(&self, checks: usize, flag: Arc<AtomicBool>) {
        self.inner.borrow_mut().raise = Some((checks, flag));
    }

    pub fn checks(&self) -> usize {
        self.inner.borrow().checks
    }
}

impl PresenceSensor for ScriptedPresence {
    fn check(&mut self, _template: &Template, _threshold: f32) -> Result<Presence> {
        let mut script = self.inner.borrow_mut();
        script.checks += 1;
        if let Some((after, flag)) = &script.raise {
            if script.checks >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if let Some(error) = script.pending_error.take() {
            return Err(error);
        }
        Ok(script.current.unwrap_or(Presence::Absent))
    }
}

#[derive(Default)]
struct LockState {
    locks: usize,
    locked: bool,
}

#[derive(Clone, Default)]
pub struct CountingLock {
    inner: Rc<RefCell<LockState>>,
}

impl CountingLock {
    pub fn locks(&self) -> usize {
        self.inner.borrow().locks
    }

    pub fn set_locked(&self, locked: bool) {
        self.inner.borrow_mut().locked = locked;
    }
}

impl SessionLock for CountingLock {
    fn is_locked(&self) -> bool {
        self.inner.borrow().locked
    }

    /// Counts the request but leaves the screen "unlocked", like a desktop
    /// that ignored it.
    fn lock(&self) {
        self.inner.borrow_mut().locks += 1;
    }
}

#[derive(Default)]
struct FeedbackLog {
    shown: Vec<Feedback>,
    dismissed: Vec<ProcessHandle>,
    live: Vec<ProcessHandle>,
    next_id: u64,
    refusals: usize,
}

/// Feedback sink that pretends to launch a helper for every `show`.
#[derive(Clone, Default)]
pub struct RecordingFeedback {
    inner: Rc<RefCell<FeedbackLog>>,
}

impl RecordingFeedback {
    pub fn shown(&self) -> Vec<Feedback> {
        self.inner.borrow().shown.clone()
    }

    pub fn dismissed(&self) -> Vec<ProcessHandle> {
        self.inner.borrow().dismissed.clone()
    }

    pub fn live(&self) -> Vec<ProcessHandle> {
        self.inner.borrow().live.clone()
    }

    /// The next `count` shows launch nothing, like a helper that is missing
    /// or has no session to draw on.
    pub fn refuse(&self, count: usize) {
        self.inner.borrow_mut().refusals = count;
    }
}

impl FeedbackSink for RecordingFeedback {
    fn show(&mut self, feedback: Feedback) -> Option<ProcessHandle> {
        let mut log = self.inner.borrow_mut();
        if log.refusals > 0 {
            log.refusals -= 1;
            return None;
        }
        log.next_id += 1;
        let handle = ProcessHandle::new(log.next_id, 10_000 + log.next_id as u32, feedback.kind());
        log.shown.push(feedback);
        log.live.push(handle);
        Some(handle)
    }

    fn dismiss(&mut self, handle: ProcessHandle) {
        let mut log = self.inner.borrow_mut();
        if let Some(pos) = log.live.iter().position(|h| *h == handle) {
            log.live.remove(pos);
            log.dismissed.push(handle);
        }
    }

    fn is_live(&mut self, handle: ProcessHandle) -> bool {
        self.inner.borrow().live.contains(&handle)
    }
}

/// Frames a [`ScriptedPerception`] hands out, in order.
pub enum ScriptedFrame {
    Verdict(FrameVerdict),
    Unreadable,
}

/// Replays a fixed list of frames, advancing a manual clock per frame.
/// Once the script runs out every frame is the fallback (`NoFace` unless
/// changed).
pub struct ScriptedPerception<'c> {
    frames: VecDeque<ScriptedFrame>,
    clock: &'c ManualClock,
    frame_time: Duration,
    fallback: FrameVerdict,
    open_error: Option<FaceUnlockError>,
    opened: usize,
    released: usize,
}

impl<'c> ScriptedPerception<'c> {
    pub fn new(clock: &'c ManualClock, frames: Vec<ScriptedFrame>) -> Self {
        Self {
            frames: frames.into(),
            clock,
            frame_time: Duration::from_millis(100),
            fallback: FrameVerdict::NoFace,
            open_error: None,
            opened: 0,
            released: 0,
        }
    }

    pub fn verdicts(clock: &'c ManualClock, verdicts: Vec<FrameVerdict>) -> Self {
        Self::new(clock, verdicts.into_iter().map(ScriptedFrame::Verdict).collect())
    }

    pub fn with_frame_time(mut self, frame_time: Duration) -> Self {
        self.frame_time = frame_time;
        self
    }

    pub fn with_fallback(mut self, fallback: FrameVerdict) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn failing(clock: &'c ManualClock, error: FaceUnlockError) -> Self {
        let mut perception = Self::new(clock, Vec::new());
        perception.open_error = Some(error);
        perception
    }

    pub fn opened(&self) -> usize {
        self.opened
    }

    pub fn released(&self) -> usize {
        self.released
    }
}

struct ScriptedStream<'s, 'c> {
    owner: &'s mut ScriptedPerception<'c>,
}

impl Perception for ScriptedPerception<'_> {
    fn open(&mut self) -> Result<Box<dyn VerdictStream + '_>> {
        if let Some(error) = self.open_error.take() {
            return Err(error);
        }
        self.opened += 1;
        Ok(Box::new(ScriptedStream { owner: self }))
    }
}

impl VerdictStream for ScriptedStream<'_, '_> {
    fn next_verdict(&mut self) -> Result<FrameVerdict> {
        self.owner.clock.advance(self.owner.frame_time);
        match self.owner.frames.pop_front() {
            Some(ScriptedFrame::Verdict(verdict)) => Ok(verdict),
            Some(ScriptedFrame::Unreadable) => {
                Err(FaceUnlockError::SensorUnavailable("frame dropped".into()))
            }
            None => Ok(self.owner.fallback.clone()),
        }
    }
}

impl Drop for ScriptedStream<'_, '_> {
    fn drop(&mut self) {
        self.owner.released += 1;
    }
}
