use crate::common::Result;
use crate::core::types::{FrameVerdict, Presence, Template};

/// Opens the capture device for one attempt.
///
/// The device is held by the returned stream; dropping it releases the
/// camera, so every exit path of an attempt gives the device back.
pub trait Perception {
    fn open(&mut self) -> Result<Box<dyn VerdictStream + '_>>;
}

pub trait VerdictStream {
    /// Classify the next frame. An error means this frame was unreadable;
    /// callers may keep pulling.
    fn next_verdict(&mut self) -> Result<FrameVerdict>;

    /// Pull a frame without analysing it.
    fn grab(&mut self) -> Result<()> {
        self.next_verdict().map(|_| ())
    }
}

/// One-shot presence poll used by the guardian.
///
/// Implementations acquire the camera, sample briefly and release it before
/// returning, so the guardian never holds the device across a sleep.
pub trait PresenceSensor {
    fn check(&mut self, template: &Template, threshold: f32) -> Result<Presence>;
}
