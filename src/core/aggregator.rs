//! Sample aggregation policy shared by enrollment and authentication.
//!
//! A frame is usable when it holds exactly one face, the warm-up ticks have
//! passed (auto exposure settles during the first frames) and at least
//! `min_interval` has gone by since the last accepted sample.

use std::time::{Duration, Instant};

use crate::core::types::{Encoding, FrameVerdict};

#[derive(Debug, Clone)]
pub struct SampleAggregator {
    min_interval: Duration,
    warmup_ticks: u32,
    ticks: u64,
    last_accepted_at: Option<Instant>,
    accepted: usize,
}

impl SampleAggregator {
    pub fn new(min_interval: Duration, warmup_ticks: u32) -> Self {
        Self {
            min_interval,
            warmup_ticks,
            ticks: 0,
            last_accepted_at: None,
            accepted: 0,
        }
    }

    /// Warm-up gate only, every single-face frame after it is usable.
    pub fn unthrottled(warmup_ticks: u32) -> Self {
        Self::new(Duration::ZERO, warmup_ticks)
    }

    pub fn consider(&mut self, verdict: &FrameVerdict, now: Instant) -> Option<Encoding> {
        self.ticks += 1;

        let FrameVerdict::OneFace(encoding) = verdict else {
            return None;
        };
        if self.ticks <= u64::from(self.warmup_ticks) {
            return None;
        }
        if let Some(last) = self.last_accepted_at {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }

        self.last_accepted_at = Some(now);
        self.accepted += 1;
        Some(encoding.clone())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn in_warmup(&self) -> bool {
        self.ticks <= u64::from(self.warmup_ticks)
    }
}
