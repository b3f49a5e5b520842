//! User profile access
//!
//! The pipeline reads biometrics through `ProfileProvider` so hosts can back it
//! with whatever preference storage they use. Unset values are reported as
//! `None` (or non-positive numbers) and resolved to defaults by the consumers.

use crate::types::{Gender, Sensitivity};
use serde::{Deserialize, Serialize};

/// Default daily step goal
pub const DEFAULT_STEP_GOAL: u32 = 10_000;

/// Read-only view of the user's profile
pub trait ProfileProvider: Send + Sync {
    fn height_cm(&self) -> Option<f64>;
    fn weight_kg(&self) -> Option<f64>;
    fn gender(&self) -> Gender;
    fn step_goal(&self) -> u32;
    fn sensor_sensitivity(&self) -> Sensitivity;
}

/// Plain profile record, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub gender: Gender,
    pub age: Option<u32>,
    pub step_goal: u32,
    pub sensitivity: Sensitivity,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            height_cm: None,
            weight_kg: None,
            gender: Gender::Unspecified,
            age: None,
            step_goal: DEFAULT_STEP_GOAL,
            sensitivity: Sensitivity::Medium,
        }
    }
}

impl UserProfile {
    pub fn with_biometrics(height_cm: f64, weight_kg: f64) -> Self {
        Self {
            height_cm: Some(height_cm),
            weight_kg: Some(weight_kg),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether onboarding captured every biometric field
    pub fn is_complete(&self) -> bool {
        self.gender != Gender::Unspecified
            && self.height_cm.is_some_and(|h| h > 0.0)
            && self.weight_kg.is_some_and(|w| w > 0.0)
            && self.age.is_some_and(|a| a > 0)
    }
}

impl ProfileProvider for UserProfile {
    fn height_cm(&self) -> Option<f64> {
        self.height_cm
    }

    fn weight_kg(&self) -> Option<f64> {
        self.weight_kg
    }

    fn gender(&self) -> Gender {
        self.gender
    }

    fn step_goal(&self) -> u32 {
        if self.step_goal == 0 {
            DEFAULT_STEP_GOAL
        } else {
            self.step_goal
        }
    }

    fn sensor_sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }
}
