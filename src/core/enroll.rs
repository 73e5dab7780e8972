use std::time::Duration;

use crate::common::{Clock, FaceUnlockError, Result};
use crate::core::aggregator::SampleAggregator;
use crate::core::perception::Perception;
use crate::core::types::{FrameVerdict, Template};

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Collect `samples` reference encodings from the camera.
///
/// Frames go through `aggregator`, so only single-face frames after warm-up
/// and spaced by its minimum interval are kept. Passing `deadline` without
/// enough samples fails and nothing is returned. `on_sample` is called with
/// (collected, wanted) after each accepted sample.
pub fn capture_template<C: Clock>(
    perception: &mut dyn Perception,
    aggregator: &mut SampleAggregator,
    samples: usize,
    deadline: Duration,
    clock: C,
    on_sample: &mut dyn FnMut(usize, usize),
) -> Result<Template> {
    if samples == 0 {
        return Err(FaceUnlockError::Config("Enrollment needs at least one sample".into()));
    }

    let mut stream = perception.open()?;
    let start = clock.now();
    let mut encodings = Vec::with_capacity(samples);
    let mut crowded_frames = 0u32;

    while encodings.len() < samples {
        if clock.now().saturating_duration_since(start) > deadline {
            tracing::warn!(
                "Enrollment deadline passed with {}/{} samples",
                encodings.len(),
                samples
            );
            if crowded_frames > 0 {
                tracing::info!("{} frames had more than one face", crowded_frames);
            }
            return Err(FaceUnlockError::NoFaceTimeout);
        }

        let verdict = match stream.next_verdict() {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::debug!("Frame read failed during enrollment: {}", e);
                clock.sleep(RETRY_DELAY);
                continue;
            }
        };
        if verdict == FrameVerdict::MultipleFaces {
            crowded_frames += 1;
        }

        if let Some(encoding) = aggregator.consider(&verdict, clock.now()) {
            encodings.push(encoding);
            tracing::debug!("Captured sample {}/{}", encodings.len(), samples);
            on_sample(encodings.len(), samples);
        }
    }

    Ok(Template::new(encodings))
}
