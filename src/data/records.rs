//! Health record structures.
//!
//! Expands a completed workout into the records a health-data store keeps:
//! distance, total calories, heart rate and the exercise session itself.

use chrono::{DateTime, Duration, Utc};

use super::summary::CompletedWorkout;

/// Kind of exercise recorded for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExerciseType {
    /// Running (treadmill sessions are always recorded as running).
    #[default]
    Running,
}

/// Time span shared by every record of one workout (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordWindow {
    /// Session start.
    pub start: DateTime<Utc>,
    /// Session end.
    pub end: DateTime<Utc>,
}

impl RecordWindow {
    /// Window ending at `end` and lasting `elapsed_s` seconds.
    pub fn ending_at(end: DateTime<Utc>, elapsed_s: i64) -> Self {
        Self {
            start: end - Duration::seconds(elapsed_s),
            end,
        }
    }

    /// Midpoint of the window.
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + (self.end - self.start) / 2
    }
}

/// Distance covered during a workout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceRecord {
    /// Record window.
    pub window: RecordWindow,
    /// Distance in meters.
    pub meters: f64,
}

/// Total energy burned during a workout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaloriesRecord {
    /// Record window.
    pub window: RecordWindow,
    /// Energy in kilocalories.
    pub kilocalories: f64,
}

/// A single heart-rate sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateSample {
    /// Sample time.
    pub time: DateTime<Utc>,
    /// Heart rate in whole beats per minute.
    pub beats_per_minute: i64,
}

/// Heart-rate series for a workout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateRecord {
    /// Record window.
    pub window: RecordWindow,
    /// Samples inside the window.
    pub samples: Vec<HeartRateSample>,
}

/// The exercise session itself.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExerciseSessionRecord {
    /// Record window.
    pub window: RecordWindow,
    /// Session title.
    pub title: String,
    /// Exercise type.
    pub exercise_type: ExerciseType,
}

/// Every record written for one workout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthRecords {
    /// Distance record.
    pub distance: DistanceRecord,
    /// Calories record.
    pub calories: CaloriesRecord,
    /// Heart-rate record.
    pub heart_rate: HeartRateRecord,
    /// Session record.
    pub session: ExerciseSessionRecord,
}

impl HealthRecords {
    /// Build the records for `workout`, treating `end` as the end of the session.
    ///
    /// The average heart rate becomes a single sample at the session midpoint.
    pub fn from_workout(workout: &CompletedWorkout, end: DateTime<Utc>) -> Self {
        let window = RecordWindow::ending_at(end, workout.elapsed_s);

        Self {
            distance: DistanceRecord {
                window,
                meters: workout.distance_m,
            },
            calories: CaloriesRecord {
                window,
                kilocalories: workout.calories_kcal,
            },
            heart_rate: HeartRateRecord {
                window,
                samples: vec![HeartRateSample {
                    time: window.start + Duration::seconds(workout.elapsed_s / 2),
                    beats_per_minute: workout.avg_hr as i64,
                }],
            },
            session: ExerciseSessionRecord {
                window,
                title: workout.title.clone(),
                exercise_type: ExerciseType::Running,
            },
        }
    }

    /// The window shared by all records.
    pub fn window(&self) -> RecordWindow {
        self.session.window
    }
}
