//! Bounded sample storage
//!
//! `SampleBuffer` is a fixed-capacity, time-ordered ring of motion samples.
//! `GaitWindow` holds one buffer per sensor channel for the current walking
//! episode and fuses them by timestamp on demand.

use crate::types::{Axes, MotionSample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity buffer of the most recent samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleBuffer {
    samples: VecDeque<MotionSample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Store a sample, keeping timestamp order and evicting the oldest when full.
    ///
    /// Out-of-order samples are inserted at their sorted position.
    pub fn append(&mut self, sample: MotionSample) {
        match self.samples.back() {
            Some(last) if sample.timestamp < last.timestamp => {
                let index = self
                    .samples
                    .partition_point(|s| s.timestamp <= sample.timestamp);
                self.samples.insert(index, sample);
            }
            _ => self.samples.push_back(sample),
        }
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Keep only the last `n` samples
    pub fn trim_to(&mut self, n: usize) {
        while self.samples.len() > n {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MotionSample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// The last `n` samples (fewer if the buffer is shorter), oldest first
    pub fn trailing(&self, n: usize) -> impl Iterator<Item = &MotionSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    pub fn get(&self, index: usize) -> Option<&MotionSample> {
        self.samples.get(index)
    }

    /// Sample whose timestamp is closest to `timestamp`, within `tolerance_ms`
    pub fn nearest(&self, timestamp: i64, tolerance_ms: i64) -> Option<&MotionSample> {
        let index = self.samples.partition_point(|s| s.timestamp < timestamp);
        let after = self.samples.get(index);
        let before = index.checked_sub(1).and_then(|i| self.samples.get(i));

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp - b.timestamp <= a.timestamp - timestamp {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        };

        best.filter(|s| (s.timestamp - timestamp).abs() <= tolerance_ms)
    }

    pub fn to_vec(&self) -> Vec<MotionSample> {
        self.samples.iter().copied().collect()
    }
}

/// Accelerometer sample with its timestamp-matched gyroscope reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairedSample {
    pub timestamp: i64,
    pub accel: Axes,
    /// Nearest gyroscope reading within the pairing tolerance
    pub gyro: Option<Axes>,
}

/// Samples buffered for the current walking episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaitWindow {
    accel: SampleBuffer,
    gyro: SampleBuffer,
}

impl GaitWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            accel: SampleBuffer::new(capacity),
            gyro: SampleBuffer::new(capacity),
        }
    }

    pub fn push_accel(&mut self, sample: MotionSample) {
        self.accel.append(sample);
    }

    pub fn push_gyro(&mut self, sample: MotionSample) {
        self.gyro.append(sample);
    }

    pub fn accel(&self) -> &SampleBuffer {
        &self.accel
    }

    pub fn gyro(&self) -> &SampleBuffer {
        &self.gyro
    }

    pub fn accel_len(&self) -> usize {
        self.accel.len()
    }

    pub fn gyro_len(&self) -> usize {
        self.gyro.len()
    }

    /// Trim both channels to their last `n` samples
    pub fn trim_to(&mut self, n: usize) {
        self.accel.trim_to(n);
        self.gyro.trim_to(n);
    }

    pub fn clear(&mut self) {
        self.accel.clear();
        self.gyro.clear();
    }

    /// Fuse the two channels keyed by accelerometer timestamp
    pub fn paired(&self, tolerance_ms: i64) -> Vec<PairedSample> {
        self.accel
            .iter()
            .map(|a| PairedSample {
                timestamp: a.timestamp,
                accel: a.axes,
                gyro: self.gyro.nearest(a.timestamp, tolerance_ms).map(|g| g.axes),
            })
            .collect()
    }
}
