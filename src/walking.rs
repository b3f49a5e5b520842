//! Walking detection
//!
//! A two-state machine over gravity-compensated acceleration magnitude. A
//! single sample above the threshold starts a walking episode; the episode ends
//! only when a full trailing window contains no such sample.

use crate::buffer::SampleBuffer;
use crate::config::MotionConfig;
use crate::types::{MotionSample, WalkingState};
use log::debug;

/// Gravity-compensated acceleration magnitude `| ‖a‖ − g |`
pub fn motion_magnitude(sample: &MotionSample, gravity: f64) -> f64 {
    (sample.magnitude() - gravity).abs()
}

/// State change reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkingTransition {
    Started { at: i64 },
    Stopped { started_at: i64, stopped_at: i64 },
}

impl WalkingTransition {
    /// Episode length for a stop transition
    pub fn duration_ms(&self) -> Option<i64> {
        match self {
            WalkingTransition::Started { .. } => None,
            WalkingTransition::Stopped {
                started_at,
                stopped_at,
            } => Some(stopped_at - started_at),
        }
    }
}

/// Idle/Walking state machine
#[derive(Debug, Clone)]
pub struct WalkingDetector {
    threshold: f64,
    window_size: usize,
    gravity: f64,
    state: WalkingState,
}

impl WalkingDetector {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            threshold: config.walking_accel_threshold,
            window_size: config.walking_window_size,
            gravity: config.gravity,
            state: WalkingState::Idle,
        }
    }

    pub fn state(&self) -> WalkingState {
        self.state
    }

    pub fn is_walking(&self) -> bool {
        self.state.is_walking()
    }

    /// Feed the newest accelerometer sample.
    ///
    /// `window` must already contain `sample` as its last entry.
    pub fn update(
        &mut self,
        sample: &MotionSample,
        window: &SampleBuffer,
    ) -> Option<WalkingTransition> {
        if self.exceeds_threshold(sample) {
            if let WalkingState::Idle = self.state {
                self.state = WalkingState::Walking {
                    started_at: sample.timestamp,
                };
                debug!("Walking detected at {}", sample.timestamp);
                return Some(WalkingTransition::Started {
                    at: sample.timestamp,
                });
            }
            return None;
        }

        let WalkingState::Walking { started_at } = self.state else {
            return None;
        };

        if window.len() <= self.window_size {
            return None;
        }

        let still_walking = window
            .trailing(self.window_size)
            .any(|s| self.exceeds_threshold(s));
        if still_walking {
            return None;
        }

        self.state = WalkingState::Idle;
        debug!(
            "Walking stopped at {} after {} ms",
            sample.timestamp,
            sample.timestamp - started_at
        );
        Some(WalkingTransition::Stopped {
            started_at,
            stopped_at: sample.timestamp,
        })
    }

    /// Force the detector back to idle (used when the window is discarded)
    pub fn reset(&mut self) {
        self.state = WalkingState::Idle;
    }

    fn exceeds_threshold(&self, sample: &MotionSample) -> bool {
        motion_magnitude(sample, self.gravity) > self.threshold
    }
}
