//! Rule-based gait classification
//!
//! Rules are checked in order and the first match wins.

use crate::types::{GaitFeatures, GaitResult, GaitStatus};

/// Normal cadence band (steps/min, inclusive)
pub const CADENCE_RANGE: (f64, f64) = (70.0, 140.0);

/// Step-interval standard deviation above which steps are inconsistent (ms)
pub const MAX_STEP_VARIABILITY_MS: f64 = 200.0;

/// Symmetry index above which gait is asymmetric (%)
pub const MAX_SYMMETRY_INDEX: f64 = 20.0;

/// Gait classifier over extracted features
pub struct GaitClassifier;

impl GaitClassifier {
    pub fn classify(features: &GaitFeatures) -> GaitStatus {
        let (min_cadence, max_cadence) = CADENCE_RANGE;
        if features.cadence < min_cadence || features.cadence > max_cadence {
            GaitStatus::AbnormalCadence
        } else if features.step_variability > MAX_STEP_VARIABILITY_MS {
            GaitStatus::InconsistentSteps
        } else if features.symmetry_index > MAX_SYMMETRY_INDEX {
            GaitStatus::AsymmetricGait
        } else {
            GaitStatus::Normal
        }
    }

    /// Classify and package as a result stamped at `timestamp`
    pub fn evaluate(features: GaitFeatures, timestamp: i64) -> GaitResult {
        GaitResult {
            timestamp,
            status: Self::classify(&features),
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::correct_cadence_outlier;

    fn features(cadence: f64, step_variability: f64, symmetry_index: f64) -> GaitFeatures {
        GaitFeatures {
            cadence,
            step_variability,
            symmetry_index,
            ..GaitFeatures::default()
        }
    }

    #[test]
    fn test_normal_gait() {
        assert_eq!(GaitClassifier::classify(&features(75.0, 50.0, 5.0)), GaitStatus::Normal);
    }

    #[test]
    fn test_rule_order() {
        // Everything abnormal: cadence wins
        assert_eq!(
            GaitClassifier::classify(&features(40.0, 500.0, 50.0)),
            GaitStatus::AbnormalCadence
        );
        assert_eq!(
            GaitClassifier::classify(&features(100.0, 500.0, 50.0)),
            GaitStatus::InconsistentSteps
        );
        assert_eq!(
            GaitClassifier::classify(&features(100.0, 100.0, 50.0)),
            GaitStatus::AsymmetricGait
        );
    }

    #[test]
    fn test_cadence_boundaries_inclusive() {
        assert_eq!(GaitClassifier::classify(&features(70.0, 0.0, 0.0)), GaitStatus::Normal);
        assert_eq!(GaitClassifier::classify(&features(140.0, 0.0, 0.0)), GaitStatus::Normal);
        assert_eq!(
            GaitClassifier::classify(&features(69.9, 0.0, 0.0)),
            GaitStatus::AbnormalCadence
        );
        assert_eq!(
            GaitClassifier::classify(&features(0.0, 0.0, 0.0)),
            GaitStatus::AbnormalCadence
        );
    }

    #[test]
    fn test_clamped_fast_cadence_is_normal() {
        // A raw 150 is capped to 130 before classification
        let cadence = correct_cadence_outlier(150.0, 200.0, 130.0);
        assert_eq!(cadence, 130.0);
        assert_eq!(GaitClassifier::classify(&features(cadence, 0.0, 0.0)), GaitStatus::Normal);
    }

    #[test]
    fn test_evaluate_stamps_result() {
        let result = GaitClassifier::evaluate(features(110.0, 250.0, 0.0), 42);
        assert_eq!(result.timestamp, 42);
        assert_eq!(result.status, GaitStatus::InconsistentSteps);
        assert_eq!(result.features.cadence, 110.0);
    }
}
