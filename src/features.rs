//! Gait feature extraction
//!
//! This module turns one walking window into gait features:
//! - Step detection by peak/valley alternation on the vertical axis
//! - Cadence with outlier correction and a hard ceiling
//! - Step-interval variability and alternating-interval symmetry
//! - A cadence-banded step length estimate

use crate::buffer::{GaitWindow, PairedSample};
use crate::config::MotionConfig;
use crate::types::GaitFeatures;
use log::debug;

/// Minimum detected steps for each feature
const MIN_STEPS_FOR_CADENCE: usize = 2;
const MIN_STEPS_FOR_VARIABILITY: usize = 3;
const MIN_STEPS_FOR_SYMMETRY: usize = 4;

/// Feature extractor for buffered walking windows
#[derive(Debug, Clone)]
pub struct GaitFeatureExtractor {
    min_samples: usize,
    peak_threshold: f64,
    min_peak_gap_ms: i64,
    pairing_tolerance_ms: i64,
    cadence_ceiling: f64,
    cadence_outlier_trigger: f64,
}

impl Default for GaitFeatureExtractor {
    fn default() -> Self {
        Self::new(&MotionConfig::default())
    }
}

impl GaitFeatureExtractor {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            min_samples: config.walking_window_size,
            peak_threshold: config.peak_threshold,
            min_peak_gap_ms: config.min_peak_gap_ms,
            pairing_tolerance_ms: config.gyro_pairing_tolerance_ms,
            cadence_ceiling: config.cadence_ceiling,
            cadence_outlier_trigger: config.cadence_outlier_trigger,
        }
    }

    /// Derive features from a walking window.
    ///
    /// Returns `None` when either channel holds fewer samples than the
    /// walking window size.
    pub fn extract(&self, window: &GaitWindow) -> Option<GaitFeatures> {
        if window.accel_len() < self.min_samples || window.gyro_len() < self.min_samples {
            debug!(
                "Skipping gait extraction: {} accel / {} gyro samples",
                window.accel_len(),
                window.gyro_len()
            );
            return None;
        }

        let paired = window.paired(self.pairing_tolerance_ms);
        let step_times = self.detect_steps(&paired);

        let raw_cadence = compute_raw_cadence(&step_times);
        let cadence =
            correct_cadence_outlier(raw_cadence, self.cadence_outlier_trigger, self.cadence_ceiling);

        let features = GaitFeatures {
            cadence,
            step_variability: compute_step_variability(&step_times),
            symmetry_index: compute_symmetry_index(&step_times),
            step_length: estimate_step_length(cadence),
        };

        debug!(
            "Extracted {} steps from {} samples ({} gyro-paired): cadence {:.1} (raw {:.1})",
            step_times.len(),
            paired.len(),
            paired.iter().filter(|p| p.gyro.is_some()).count(),
            cadence,
            raw_cadence
        );
        Some(features)
    }

    /// Timestamps of detected steps.
    ///
    /// A step is a vertical-axis local maximum strictly above both neighbours
    /// and the peak threshold, at least `min_peak_gap_ms` after the previous
    /// step. Once a peak is accepted, a local minimum must be seen before the
    /// next one.
    pub fn detect_steps(&self, samples: &[PairedSample]) -> Vec<i64> {
        let mut steps: Vec<i64> = Vec::new();
        let mut looking_for_peak = true;

        for triple in samples.windows(3) {
            let (prev, curr, next) = (triple[0].accel.y, triple[1].accel.y, triple[2].accel.y);
            let timestamp = triple[1].timestamp;

            if looking_for_peak {
                let is_peak = curr > prev && curr > next && curr > self.peak_threshold;
                let spaced = steps
                    .last()
                    .map_or(true, |last| timestamp - last >= self.min_peak_gap_ms);
                if is_peak && spaced {
                    steps.push(timestamp);
                    looking_for_peak = false;
                }
            } else if curr < prev && curr < next {
                looking_for_peak = true;
            }
        }

        steps
    }
}

/// Outlier correction for implausible cadence values.
///
/// Raw cadence above `trigger` is folded into `100 + (raw mod 30)`; anything
/// else is capped at `ceiling`.
pub fn correct_cadence_outlier(raw: f64, trigger: f64, ceiling: f64) -> f64 {
    if raw > trigger {
        100.0 + raw % 30.0
    } else {
        raw.min(ceiling)
    }
}

/// Steps per minute between the first and last detected step.
///
/// Uses `n - 1` step intervals over the spanned time, not `n` steps: `n`
/// peaks only delimit `n - 1` intervals, so dividing `n` by the span
/// overstates cadence on short windows.
fn compute_raw_cadence(step_times: &[i64]) -> f64 {
    if step_times.len() < MIN_STEPS_FOR_CADENCE {
        return 0.0;
    }
    let (first, last) = (step_times[0], step_times[step_times.len() - 1]);
    let elapsed_ms = last - first;
    if elapsed_ms <= 0 {
        return 0.0;
    }
    60_000.0 * (step_times.len() - 1) as f64 / elapsed_ms as f64
}

fn step_intervals(step_times: &[i64]) -> Vec<f64> {
    step_times.windows(2).map(|w| (w[1] - w[0]) as f64).collect()
}

/// Population standard deviation of step intervals (ms)
fn compute_step_variability(step_times: &[i64]) -> f64 {
    if step_times.len() < MIN_STEPS_FOR_VARIABILITY {
        return 0.0;
    }
    let intervals = step_intervals(step_times);
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let variance =
        intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    variance.sqrt()
}

/// Percentage deviation between even- and odd-position interval means.
///
/// Intervals are numbered from 1, so the first interval is odd.
fn compute_symmetry_index(step_times: &[i64]) -> f64 {
    if step_times.len() < MIN_STEPS_FOR_SYMMETRY {
        return 0.0;
    }
    let intervals = step_intervals(step_times);
    let (mut even, mut odd) = (Vec::new(), Vec::new());
    for (index, interval) in intervals.into_iter().enumerate() {
        if (index + 1) % 2 == 0 {
            even.push(interval);
        } else {
            odd.push(interval);
        }
    }

    let even_mean = mean(&even);
    let odd_mean = mean(&odd);
    let midpoint = (even_mean + odd_mean) / 2.0;
    if midpoint <= 0.0 {
        return 0.0;
    }
    (even_mean - odd_mean).abs() / midpoint * 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Step length (m) banded by cadence
fn estimate_step_length(cadence: f64) -> f64 {
    if cadence <= 0.0 {
        0.0
    } else if cadence < 90.0 {
        0.4
    } else if cadence > 120.0 {
        0.6
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MotionSample;
    use approx::assert_relative_eq;

    const SAMPLE_PERIOD_MS: i64 = 20;

    /// Window with a vertical peak at each of `step_times` and a valley halfway between
    fn window_with_steps(step_times: &[i64]) -> GaitWindow {
        let end = step_times.last().copied().unwrap_or(0) + 400;
        let mut window = GaitWindow::new(10_000);
        let valleys: Vec<i64> = step_times
            .windows(2)
            .map(|w| (w[0] + w[1]) / 2 / SAMPLE_PERIOD_MS * SAMPLE_PERIOD_MS)
            .collect();

        let mut ts = 0;
        while ts <= end {
            let y = if step_times.contains(&ts) {
                2.5
            } else if valleys.contains(&ts) {
                -1.0
            } else {
                0.0
            };
            window.push_accel(MotionSample::new(ts, 0.0, y, 0.0));
            window.push_gyro(MotionSample::new(ts, 0.1, 0.0, 0.0));
            ts += SAMPLE_PERIOD_MS;
        }
        window
    }

    fn regular_steps(count: i64, interval_ms: i64) -> Vec<i64> {
        (0..count).map(|i| 200 + i * interval_ms).collect()
    }

    #[test]
    fn test_regular_walk_features() {
        let steps = regular_steps(12, 500);
        let window = window_with_steps(&steps);
        let extractor = GaitFeatureExtractor::default();

        let paired = window.paired(20);
        assert_eq!(extractor.detect_steps(&paired), steps);

        let features = extractor.extract(&window).unwrap();
        // 11 intervals over 5.5 s
        assert_relative_eq!(features.cadence, 120.0, epsilon = 1e-9);
        assert_eq!(features.step_variability, 0.0);
        assert_eq!(features.symmetry_index, 0.0);
        assert_eq!(features.step_length, 0.5);
    }

    #[test]
    fn test_cadence_formula_before_clamp() {
        // 12 steps, 600 ms apart: 60000 * 11 / 6600 = 100
        assert_relative_eq!(compute_raw_cadence(&regular_steps(12, 600)), 100.0, epsilon = 1e-9);
        assert_eq!(compute_raw_cadence(&[1_000]), 0.0);
        assert_eq!(compute_raw_cadence(&[1_000, 1_000]), 0.0);
    }

    #[test]
    fn test_cadence_never_exceeds_ceiling() {
        // Peaks every 300 ms give the fastest accepted cadence (200/min)
        let steps = regular_steps(20, 300);
        let window = window_with_steps(&steps);
        let features = GaitFeatureExtractor::default().extract(&window).unwrap();
        assert_eq!(features.cadence, 130.0);
        assert_eq!(features.step_length, 0.6);

        for raw in [0.0, 75.0, 130.0, 150.0, 199.9, 200.0, 210.0, 500.0] {
            assert!(correct_cadence_outlier(raw, 200.0, 130.0) <= 130.0);
        }
    }

    #[test]
    fn test_outlier_correction_heuristic() {
        assert_eq!(correct_cadence_outlier(150.0, 200.0, 130.0), 130.0);
        assert_eq!(correct_cadence_outlier(230.0, 200.0, 130.0), 120.0);
        assert_eq!(correct_cadence_outlier(200.0, 200.0, 130.0), 130.0);
        assert_eq!(correct_cadence_outlier(95.0, 200.0, 130.0), 95.0);
    }

    #[test]
    fn test_peaks_closer_than_gap_rejected() {
        // Second peak only 200 ms after the first
        let window = window_with_steps(&[200, 400, 1_000, 1_500]);
        let steps = GaitFeatureExtractor::default().detect_steps(&window.paired(20));
        assert_eq!(steps, vec![200, 1_000, 1_500]);
    }

    #[test]
    fn test_peak_without_valley_not_counted() {
        let mut window = GaitWindow::new(1_000);
        // Two peaks with only a flat stretch between them
        let ys = [0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        for (i, y) in ys.iter().enumerate() {
            window.push_accel(MotionSample::new(i as i64 * 50, 0.0, *y, 0.0));
        }
        let steps = GaitFeatureExtractor::default().detect_steps(&window.paired(20));
        assert_eq!(steps, vec![50]);
    }

    #[test]
    fn test_variability_and_symmetry_minimums() {
        assert_eq!(compute_step_variability(&[0, 500]), 0.0);
        assert_eq!(compute_symmetry_index(&[0, 400, 1_000]), 0.0);
    }

    #[test]
    fn test_alternating_intervals_are_asymmetric() {
        // Intervals 400, 600, 400, 600, 400, 600
        let steps = [0, 400, 1_000, 1_400, 2_000, 2_400, 3_000];
        assert_relative_eq!(compute_symmetry_index(&steps), 40.0, epsilon = 1e-9);
        assert_relative_eq!(compute_step_variability(&steps), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_insufficient_samples_skipped() {
        let mut window = window_with_steps(&regular_steps(12, 500));
        window.trim_to(49);
        assert!(GaitFeatureExtractor::default().extract(&window).is_none());

        // Plenty of accelerometer data but no gyroscope
        let mut accel_only = GaitWindow::new(1_000);
        for i in 0..200 {
            accel_only.push_accel(MotionSample::new(i * 20, 0.0, 0.0, 0.0));
        }
        assert!(GaitFeatureExtractor::default().extract(&accel_only).is_none());
    }

    #[test]
    fn test_step_length_bands() {
        assert_eq!(estimate_step_length(0.0), 0.0);
        assert_eq!(estimate_step_length(85.0), 0.4);
        assert_eq!(estimate_step_length(90.0), 0.5);
        assert_eq!(estimate_step_length(120.0), 0.5);
        assert_eq!(estimate_step_length(121.0), 0.6);
    }
}
