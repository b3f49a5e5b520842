//! Core types for the MobiGait motion pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw sensor samples, walking state, gait features and results, and
//! the per-day step records handed to persistence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Three-axis sensor reading (m/s² for the accelerometer, rad/s for the gyroscope)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the three axes
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A single timestamped motion sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Sample time (Unix epoch milliseconds)
    pub timestamp: i64,
    /// Sensor axes
    pub axes: Axes,
}

impl MotionSample {
    pub fn new(timestamp: i64, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp,
            axes: Axes::new(x, y, z),
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.axes.magnitude()
    }
}

/// Sensor event delivered by the host sensor subsystem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum SensorEvent {
    Accelerometer {
        timestamp: i64,
        x: f64,
        y: f64,
        z: f64,
    },
    Gyroscope {
        timestamp: i64,
        x: f64,
        y: f64,
        z: f64,
    },
    /// Lifetime cumulative hardware step count
    StepCounter { timestamp: i64, value: u64 },
}

impl SensorEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            SensorEvent::Accelerometer { timestamp, .. }
            | SensorEvent::Gyroscope { timestamp, .. }
            | SensorEvent::StepCounter { timestamp, .. } => *timestamp,
        }
    }

    pub fn accelerometer(sample: MotionSample) -> Self {
        SensorEvent::Accelerometer {
            timestamp: sample.timestamp,
            x: sample.axes.x,
            y: sample.axes.y,
            z: sample.axes.z,
        }
    }

    pub fn gyroscope(sample: MotionSample) -> Self {
        SensorEvent::Gyroscope {
            timestamp: sample.timestamp,
            x: sample.axes.x,
            y: sample.axes.y,
            z: sample.axes.z,
        }
    }
}

/// Walking detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkingState {
    Idle,
    Walking {
        /// When the current walking episode began (epoch ms)
        started_at: i64,
    },
}

impl WalkingState {
    pub fn is_walking(&self) -> bool {
        matches!(self, WalkingState::Walking { .. })
    }
}

/// Gait features derived from one analysis window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GaitFeatures {
    /// Steps per minute (after outlier correction and ceiling)
    pub cadence: f64,
    /// Population standard deviation of step intervals (ms)
    pub step_variability: f64,
    /// Percentage deviation between alternating interval means
    pub symmetry_index: f64,
    /// Estimated step length (meters)
    pub step_length: f64,
}

/// Gait classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaitStatus {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Abnormal Cadence")]
    AbnormalCadence,
    #[serde(rename = "Inconsistent Steps")]
    InconsistentSteps,
    #[serde(rename = "Asymmetric Gait")]
    AsymmetricGait,
}

impl GaitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GaitStatus::Normal => "Normal",
            GaitStatus::AbnormalCadence => "Abnormal Cadence",
            GaitStatus::InconsistentSteps => "Inconsistent Steps",
            GaitStatus::AsymmetricGait => "Asymmetric Gait",
        }
    }
}

impl std::fmt::Display for GaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed gait analysis (keyed by timestamp)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaitResult {
    pub timestamp: i64,
    pub status: GaitStatus,
    #[serde(flatten)]
    pub features: GaitFeatures,
}

/// Daily step summary, upserted once per local day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Record time (epoch ms)
    pub timestamp: i64,
    pub step_count: u32,
    /// Distance (km)
    pub distance: f64,
    /// Energy estimate (kcal)
    pub calories: f64,
    /// Walking duration (ms)
    pub duration: i64,
}

/// Step counting strategy, fixed once at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Hardware cumulative step counter
    HardwareCounter,
    /// Threshold-crossing peaks of the accelerometer magnitude
    Accelerometer,
}

/// Snapshot of the live step session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSession {
    pub session_id: String,
    pub step_count: u32,
    /// Present only in hardware-counter mode once a raw value has been seen
    pub initial_counter_offset: Option<i64>,
    pub start_time: i64,
    pub paused: bool,
    pub current_day: NaiveDate,
}

/// Host-visible tracking lifecycle flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackingState {
    pub tracking: bool,
    pub paused: bool,
}

/// Events emitted by the pipeline for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MotionEvent {
    WalkingStarted {
        timestamp: i64,
    },
    WalkingStopped {
        timestamp: i64,
        duration_ms: i64,
    },
    AnalysisCompleted {
        result: GaitResult,
    },
    StepUpdated {
        record: StepRecord,
    },
    DayRolledOver {
        previous_day: NaiveDate,
        /// Final record persisted for the outgoing day, if it had any steps
        final_record: Option<StepRecord>,
    },
    /// Ask the host scheduler for an exact wake-up at the given time
    WakeRequested {
        at_ms: i64,
    },
}

/// User gender as stored in the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

/// Accelerometer step sensitivity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Magnitude threshold (m/s²) a sample must cross to register a step
    pub fn step_threshold(&self) -> f64 {
        match self {
            Sensitivity::Low => 15.0,
            Sensitivity::Medium => 12.0,
            Sensitivity::High => 9.0,
        }
    }
}
