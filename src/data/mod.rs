//! Data structures for workout data.
//!
//! This module contains the workout summary assembled from characteristic
//! reads and the health records derived from a completed workout.

pub mod records;
pub mod summary;

pub use records::{
    CaloriesRecord, DistanceRecord, ExerciseSessionRecord, ExerciseType, HealthRecords,
    HeartRateRecord, HeartRateSample, RecordWindow,
};
pub use summary::{CompletedWorkout, SummaryAssembler, WorkoutSummary};
