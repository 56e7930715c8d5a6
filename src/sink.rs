//! Health record sinks.
//!
//! A sink receives each completed workout at most once.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::data::records::HealthRecords;
use crate::data::summary::CompletedWorkout;
use crate::error::{Error, Result};

/// Persists completed workouts to an external health-data store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthRecordSink: Send + Sync {
    /// Persist one workout.
    async fn persist(&self, workout: &CompletedWorkout) -> Result<()>;
}

#[async_trait]
impl<T: HealthRecordSink + ?Sized> HealthRecordSink for Arc<T> {
    async fn persist(&self, workout: &CompletedWorkout) -> Result<()> {
        (**self).persist(workout).await
    }
}

/// Sink that only logs the records it would write.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl HealthRecordSink for LogSink {
    async fn persist(&self, workout: &CompletedWorkout) -> Result<()> {
        let records = HealthRecords::from_workout(workout, Utc::now());
        let window = records.window();

        info!(
            "{} workout: {} -> {}, {:.0} m, {:.0} kcal, {} bpm",
            records.session.title,
            window.start,
            window.end,
            records.distance.meters,
            records.calories.kilocalories,
            records
                .heart_rate
                .samples
                .first()
                .map(|s| s.beats_per_minute)
                .unwrap_or_default()
        );

        Ok(())
    }
}

/// Sink that keeps workouts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    saved: Arc<RwLock<Vec<CompletedWorkout>>>,
    failure: Option<String>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that rejects every workout with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            saved: Arc::default(),
            failure: Some(reason.into()),
        }
    }

    /// Workouts persisted so far.
    pub fn saved(&self) -> Vec<CompletedWorkout> {
        self.saved.read().clone()
    }
}

#[async_trait]
impl HealthRecordSink for MemorySink {
    async fn persist(&self, workout: &CompletedWorkout) -> Result<()> {
        if let Some(reason) = &self.failure {
            return Err(Error::PersistFailed {
                reason: reason.clone(),
            });
        }

        self.saved.write().push(workout.clone());
        Ok(())
    }
}
