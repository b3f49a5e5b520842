//! Step metrics aggregation
//!
//! Combines a step count with the user's biometrics to estimate distance,
//! energy, and goal progress, and derives body-mass index for the health view.

use crate::profile::ProfileProvider;
use crate::types::{Gender, StepRecord};
use serde::{Deserialize, Serialize};

/// Average step length as a fraction of body height
pub const STEP_LENGTH_FACTOR: f64 = 0.415;

/// Height used when the profile has none (cm)
pub const DEFAULT_HEIGHT_CM: f64 = 170.0;

/// Weight used when the profile has none (kg)
pub const DEFAULT_WEIGHT_KG: f64 = 70.0;

/// Step-estimated duration: 100 steps per minute, i.e. 600 ms per step
const ESTIMATED_MS_PER_STEP: i64 = 600;

/// Distance/energy summary for one step count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step_count: u32,
    pub step_length_m: f64,
    pub distance_km: f64,
    pub calories: f64,
    pub duration_ms: i64,
    /// Fraction of the daily goal reached (0-1)
    pub goal_progress: f64,
}

impl StepMetrics {
    pub fn to_record(&self, timestamp: i64) -> StepRecord {
        StepRecord {
            timestamp,
            step_count: self.step_count,
            distance: self.distance_km,
            calories: self.calories,
            duration: self.duration_ms,
        }
    }
}

/// Derives `StepMetrics` from counts and profile data
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAggregator {
    apply_gender_factor: bool,
}

impl MetricsAggregator {
    pub fn new(apply_gender_factor: bool) -> Self {
        Self {
            apply_gender_factor,
        }
    }

    pub fn compute(
        &self,
        step_count: u32,
        duration_ms: i64,
        profile: &dyn ProfileProvider,
    ) -> StepMetrics {
        let height = resolve(profile.height_cm(), DEFAULT_HEIGHT_CM);
        let weight = resolve(profile.weight_kg(), DEFAULT_WEIGHT_KG);

        let step_length_m = step_length_m(height);
        let distance_km = distance_km(step_count, step_length_m);
        let mut calories = weight * distance_km;
        if self.apply_gender_factor {
            calories *= gender_factor(profile.gender());
        }

        StepMetrics {
            step_count,
            step_length_m,
            distance_km,
            calories,
            duration_ms,
            goal_progress: goal_progress(step_count, profile.step_goal()),
        }
    }
}

/// Use `value` when it is a positive number, else `default`
fn resolve(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => default,
    }
}

/// Step length (m) from body height (cm)
pub fn step_length_m(height_cm: f64) -> f64 {
    STEP_LENGTH_FACTOR * height_cm / 100.0
}

/// Distance (km) covered by `steps` of `step_length_m`
pub fn distance_km(steps: u32, step_length_m: f64) -> f64 {
    steps as f64 * step_length_m / 1000.0
}

/// Calorie scaling by gender: women ~0.9, everyone else 1.0
pub fn gender_factor(gender: Gender) -> f64 {
    match gender {
        Gender::Female => 0.9,
        Gender::Male | Gender::Unspecified => 1.0,
    }
}

/// Duration estimate assuming 100 steps per minute
pub fn estimated_duration_ms(steps: u32) -> i64 {
    steps as i64 * ESTIMATED_MS_PER_STEP
}

/// Fraction of `goal` reached, clamped to 0-1
pub fn goal_progress(steps: u32, goal: u32) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    (steps as f64 / goal as f64).clamp(0.0, 1.0)
}

/// Body-mass index bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
    #[serde(rename = "Severely Obese")]
    SeverelyObese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else if bmi < 35.0 {
            BmiCategory::Obese
        } else {
            BmiCategory::SeverelyObese
        }
    }
}

/// Body-mass index with its category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyMassIndex {
    pub value: f64,
    pub category: BmiCategory,
}

impl BodyMassIndex {
    /// `weight / height_m²`; `None` unless both values are positive
    pub fn compute(weight_kg: f64, height_cm: f64) -> Option<Self> {
        if !(weight_kg > 0.0 && height_cm > 0.0) {
            return None;
        }
        let height_m = height_cm / 100.0;
        let value = weight_kg / (height_m * height_m);
        Some(Self {
            value,
            category: BmiCategory::from_bmi(value),
        })
    }

    pub fn from_profile(profile: &dyn ProfileProvider) -> Option<Self> {
        Self::compute(profile.weight_kg()?, profile.height_cm()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserProfile;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_scenario() {
        let profile = UserProfile::with_biometrics(170.0, 70.0);
        let metrics = MetricsAggregator::default().compute(1000, 0, &profile);

        assert_relative_eq!(metrics.step_length_m, 0.7055, epsilon = 1e-9);
        assert_relative_eq!(metrics.distance_km, 0.7055, epsilon = 1e-9);
        assert_relative_eq!(metrics.calories, 49.385, epsilon = 1e-9);
        assert_relative_eq!(metrics.goal_progress, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_unset_biometrics_use_defaults() {
        let unset = UserProfile::default();
        let non_positive = UserProfile::with_biometrics(0.0, -5.0);
        let reference = UserProfile::with_biometrics(170.0, 70.0);

        let aggregator = MetricsAggregator::default();
        let expected = aggregator.compute(2500, 0, &reference);
        assert_eq!(aggregator.compute(2500, 0, &unset), expected);
        assert_eq!(aggregator.compute(2500, 0, &non_positive), expected);
    }

    #[test]
    fn test_gender_factor_only_when_enabled() {
        let mut profile = UserProfile::with_biometrics(170.0, 70.0);
        profile.gender = Gender::Female;

        let plain = MetricsAggregator::new(false).compute(1000, 0, &profile);
        let scaled = MetricsAggregator::new(true).compute(1000, 0, &profile);
        assert_relative_eq!(plain.calories, 49.385, epsilon = 1e-9);
        assert_relative_eq!(scaled.calories, 49.385 * 0.9, epsilon = 1e-9);

        profile.gender = Gender::Male;
        let male = MetricsAggregator::new(true).compute(1000, 0, &profile);
        assert_relative_eq!(male.calories, 49.385, epsilon = 1e-9);
    }

    #[test]
    fn test_estimated_duration() {
        assert_eq!(estimated_duration_ms(0), 0);
        assert_eq!(estimated_duration_ms(100), 60_000);
        assert_eq!(estimated_duration_ms(1234), 740_400);
    }

    #[test]
    fn test_goal_progress_clamped() {
        assert_eq!(goal_progress(15_000, 10_000), 1.0);
        assert_eq!(goal_progress(0, 10_000), 0.0);
        assert_eq!(goal_progress(10, 0), 0.0);
    }

    #[test]
    fn test_bmi_categories() {
        let bmi = BodyMassIndex::compute(70.0, 175.0).unwrap();
        assert_relative_eq!(bmi.value, 22.857, epsilon = 1e-3);
        assert_eq!(bmi.category, BmiCategory::Normal);

        assert_eq!(BmiCategory::from_bmi(18.4), BmiCategory::Underweight);
        assert_eq!(BmiCategory::from_bmi(25.0), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(34.9), BmiCategory::Obese);
        assert_eq!(BmiCategory::from_bmi(35.0), BmiCategory::SeverelyObese);

        assert!(BodyMassIndex::compute(70.0, 0.0).is_none());
        assert!(BodyMassIndex::from_profile(&UserProfile::default()).is_none());
    }
}
