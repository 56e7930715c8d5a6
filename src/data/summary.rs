//! Workout summary data structures.
//!
//! Contains the partially-filled summary built during a read sequence and the
//! completed workout handed to the health record sink.

use crate::ble::characteristics::{DecodedValue, WorkoutCharacteristic};
use crate::error::{Error, Result};

/// Workout metrics read from the treadmill. Any field may be unset.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkoutSummary {
    /// Elapsed workout time in seconds.
    pub elapsed_seconds: Option<i64>,
    /// Average heart rate in bpm.
    pub avg_heart_rate: Option<f64>,
    /// Total distance in meters.
    pub total_distance: Option<f64>,
    /// Calories burned in kcal.
    pub calories_burned: Option<f64>,
    /// Workout title.
    pub title: Option<String>,
}

impl WorkoutSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the fields that are still unset, in canonical order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        WorkoutCharacteristic::CANONICAL_ORDER
            .into_iter()
            .filter(|c| !self.is_set(*c))
            .map(|c| c.field_name())
            .collect()
    }

    /// Check if the field filled by `characteristic` is set.
    pub fn is_set(&self, characteristic: WorkoutCharacteristic) -> bool {
        match characteristic {
            WorkoutCharacteristic::ElapsedTime => self.elapsed_seconds.is_some(),
            WorkoutCharacteristic::AvgHeartRate => self.avg_heart_rate.is_some(),
            WorkoutCharacteristic::TotalDistance => self.total_distance.is_some(),
            WorkoutCharacteristic::CaloriesBurned => self.calories_burned.is_some(),
            WorkoutCharacteristic::Title => self.title.is_some(),
        }
    }

    /// Check if all five fields are set.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Convert into a completed workout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteSummary`] naming every unset field.
    pub fn complete(self) -> Result<CompletedWorkout> {
        match self {
            Self {
                elapsed_seconds: Some(elapsed_s),
                avg_heart_rate: Some(avg_hr),
                total_distance: Some(distance_m),
                calories_burned: Some(calories_kcal),
                title: Some(title),
            } => Ok(CompletedWorkout {
                distance_m,
                calories_kcal,
                elapsed_s,
                avg_hr,
                title,
            }),
            partial => Err(Error::IncompleteSummary {
                missing: partial.missing_fields(),
            }),
        }
    }
}

/// A workout with every field present, ready to persist.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompletedWorkout {
    /// Total distance in meters.
    pub distance_m: f64,
    /// Calories burned in kcal.
    pub calories_kcal: f64,
    /// Elapsed workout time in seconds.
    pub elapsed_s: i64,
    /// Average heart rate in bpm.
    pub avg_hr: f64,
    /// Workout title.
    pub title: String,
}

impl CompletedWorkout {
    /// Get the elapsed time as a duration. Negative values clamp to zero.
    pub fn elapsed(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.elapsed_s.max(0) as u64)
    }
}

/// Decodes characteristic payloads into a fresh [`WorkoutSummary`].
#[derive(Debug, Default)]
pub struct SummaryAssembler {
    summary: WorkoutSummary,
}

impl SummaryAssembler {
    /// Create an assembler with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `payload` and store it in the field for `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeFailed`] and leaves the field unset if the
    /// payload does not match the characteristic's decode rule.
    pub fn apply(&mut self, characteristic: WorkoutCharacteristic, payload: &[u8]) -> Result<()> {
        let value = characteristic.decode(payload)?;

        match (characteristic, value) {
            (WorkoutCharacteristic::ElapsedTime, DecodedValue::Seconds(s)) => {
                tracing::debug!("Time Elapsed: {}s", s);
                self.summary.elapsed_seconds = Some(s);
            }
            (WorkoutCharacteristic::AvgHeartRate, DecodedValue::Real(v)) => {
                tracing::debug!("Avg Heart Rate: {} bpm", v);
                self.summary.avg_heart_rate = Some(v);
            }
            (WorkoutCharacteristic::TotalDistance, DecodedValue::Real(v)) => {
                tracing::debug!("Total Distance: {} m", v);
                self.summary.total_distance = Some(v);
            }
            (WorkoutCharacteristic::CaloriesBurned, DecodedValue::Real(v)) => {
                tracing::debug!("Calories Burned: {}", v);
                self.summary.calories_burned = Some(v);
            }
            (WorkoutCharacteristic::Title, DecodedValue::Text(t)) => {
                tracing::debug!("Workout Title: {}", t);
                self.summary.title = Some(t);
            }
            (c, v) => {
                return Err(Error::Internal(format!(
                    "decode rule for {} produced {:?}",
                    c, v
                )))
            }
        }

        Ok(())
    }

    /// The summary assembled so far.
    pub fn summary(&self) -> &WorkoutSummary {
        &self.summary
    }

    /// Hand over the assembled summary.
    pub fn finish(self) -> WorkoutSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn morning_run() -> SummaryAssembler {
        let mut assembler = SummaryAssembler::new();
        assembler
            .apply(WorkoutCharacteristic::ElapsedTime, &1800i32.to_be_bytes())
            .unwrap();
        assembler
            .apply(WorkoutCharacteristic::AvgHeartRate, &142u16.to_be_bytes())
            .unwrap();
        assembler
            .apply(WorkoutCharacteristic::TotalDistance, &5000f32.to_be_bytes())
            .unwrap();
        assembler
            .apply(WorkoutCharacteristic::CaloriesBurned, &320u16.to_be_bytes())
            .unwrap();
        assembler
            .apply(WorkoutCharacteristic::Title, b"Morning Run")
            .unwrap();
        assembler
    }

    #[test]
    fn test_complete_summary_keeps_field_labels() {
        let workout = morning_run().finish().complete().unwrap();
        assert_eq!(
            workout,
            CompletedWorkout {
                distance_m: 5000.0,
                calories_kcal: 320.0,
                elapsed_s: 1800,
                avg_hr: 142.0,
                title: "Morning Run".to_string(),
            }
        );
        assert_eq!(workout.elapsed().as_secs(), 1800);
    }

    #[test]
    fn test_missing_field_is_incomplete() {
        let mut summary = morning_run().finish();
        summary.avg_heart_rate = None;
        assert!(!summary.is_complete());

        match summary.complete() {
            Err(Error::IncompleteSummary { missing }) => {
                assert_eq!(missing, vec!["avg_heart_rate"])
            }
            other => panic!("expected IncompleteSummary, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_summary_lists_all_fields() {
        assert_eq!(
            WorkoutSummary::new().missing_fields(),
            vec![
                "elapsed_seconds",
                "avg_heart_rate",
                "total_distance",
                "calories_burned",
                "title"
            ]
        );
    }

    #[test]
    fn test_decode_failure_leaves_field_unset() {
        let mut assembler = SummaryAssembler::new();
        let result = assembler.apply(WorkoutCharacteristic::ElapsedTime, &[0x00, 0x01, 0x02]);
        assert!(matches!(result, Err(Error::DecodeFailed { .. })));
        assert_eq!(assembler.summary().elapsed_seconds, None);
    }

    #[test]
    fn test_elapsed_widens_sign() {
        let mut assembler = SummaryAssembler::new();
        assembler
            .apply(WorkoutCharacteristic::ElapsedTime, &(-5i32).to_be_bytes())
            .unwrap();
        assert_eq!(assembler.summary().elapsed_seconds, Some(-5));
    }
}
