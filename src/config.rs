//! Pipeline configuration
//!
//! All thresholds used by the walking detector, step counter, and gait feature
//! extractor live here. Every field has a default, so a partial JSON document
//! only needs to name the values it overrides.

use crate::error::MotionError;
use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²)
pub const GRAVITY_EARTH: f64 = 9.80665;

/// How the pipeline picks its step counting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSelection {
    /// Hardware counter when the host reports one, accelerometer otherwise
    #[default]
    Auto,
    HardwareCounter,
    Accelerometer,
}

/// How the `duration` of a step record is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationBasis {
    /// One minute per 100 steps
    #[default]
    StepEstimate,
    /// Active (unpaused) wall-clock time since the session started
    WallClock,
}

/// Tunable pipeline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    /// Gravity-compensated magnitude (m/s²) that counts as walking motion
    pub walking_accel_threshold: f64,
    /// Trailing sample window scanned before leaving the walking state
    pub walking_window_size: usize,
    /// A walking episode longer than this (ms) is analyzed when it ends
    pub min_walk_duration_ms: i64,
    /// Buffered accelerometer samples that trigger a mid-walk analysis
    pub analysis_trigger_samples: usize,
    /// Samples retained after a mid-walk analysis
    pub analysis_keep_samples: usize,
    /// Hard capacity of each gait window channel
    pub max_window_samples: usize,
    /// Gravity constant removed from the magnitude (m/s²)
    pub gravity: f64,
    /// Minimum time between accelerometer-detected steps (ms)
    pub step_debounce_ms: i64,
    /// Vertical-axis peak threshold for gait step detection
    pub peak_threshold: f64,
    /// Minimum time between accepted gait peaks (ms)
    pub min_peak_gap_ms: i64,
    /// Maximum distance (ms) between paired accelerometer and gyroscope samples
    pub gyro_pairing_tolerance_ms: i64,
    /// Cadence ceiling applied after outlier correction (steps/min)
    pub cadence_ceiling: f64,
    /// Raw cadence above which the outlier correction applies (steps/min)
    pub cadence_outlier_trigger: f64,
    /// Step counting strategy selection
    pub counting_mode: ModeSelection,
    /// Step record duration derivation
    pub duration_basis: DurationBasis,
    /// Scale calories by the profile gender factor
    pub apply_gender_factor: bool,
    /// Local time offset from UTC (minutes) used for day boundaries
    pub utc_offset_minutes: i32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            walking_accel_threshold: 1.5,
            walking_window_size: 50,
            min_walk_duration_ms: 10_000,
            analysis_trigger_samples: 500,
            analysis_keep_samples: 100,
            max_window_samples: 1_000,
            gravity: GRAVITY_EARTH,
            step_debounce_ms: 250,
            peak_threshold: 1.0,
            min_peak_gap_ms: 300,
            gyro_pairing_tolerance_ms: 20,
            cadence_ceiling: 130.0,
            cadence_outlier_trigger: 200.0,
            counting_mode: ModeSelection::Auto,
            duration_basis: DurationBasis::StepEstimate,
            apply_gender_factor: false,
            utc_offset_minutes: 0,
        }
    }
}

impl MotionConfig {
    /// Load configuration from JSON, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self, MotionError> {
        let config: MotionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, MotionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that thresholds are positive and window sizes consistent
    pub fn validate(&self) -> Result<(), MotionError> {
        let positive = [
            ("walking_accel_threshold", self.walking_accel_threshold),
            ("gravity", self.gravity),
            ("peak_threshold", self.peak_threshold),
            ("cadence_ceiling", self.cadence_ceiling),
            ("cadence_outlier_trigger", self.cadence_outlier_trigger),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MotionError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.walking_window_size == 0 {
            return Err(MotionError::InvalidConfig(
                "walking_window_size must be at least 1".to_string(),
            ));
        }
        if self.analysis_keep_samples >= self.analysis_trigger_samples {
            return Err(MotionError::InvalidConfig(format!(
                "analysis_keep_samples ({}) must be smaller than analysis_trigger_samples ({})",
                self.analysis_keep_samples, self.analysis_trigger_samples
            )));
        }
        if self.max_window_samples < self.analysis_trigger_samples {
            return Err(MotionError::InvalidConfig(format!(
                "max_window_samples ({}) must be at least analysis_trigger_samples ({})",
                self.max_window_samples, self.analysis_trigger_samples
            )));
        }
        if self.step_debounce_ms < 0 || self.min_peak_gap_ms < 0 || self.gyro_pairing_tolerance_ms < 0 {
            return Err(MotionError::InvalidConfig(
                "time intervals must not be negative".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(MotionError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }
}
