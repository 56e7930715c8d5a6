//! GATT characteristic handling.
//!
//! Describes the five workout characteristics and sequences their reads one
//! at a time.

use bytes::Buf;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::platform::{DiscoveredService, GattStatus};
use crate::ble::uuids::*;
use crate::data::summary::{SummaryAssembler, WorkoutSummary};
use crate::error::{Error, Result};
use crate::status::SyncStatus;

/// How a characteristic payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeRule {
    /// 4-byte big-endian signed integer.
    I32,
    /// 2-byte big-endian unsigned integer.
    U16,
    /// 4-byte big-endian IEEE-754 float.
    F32,
    /// UTF-8 text of any length.
    Utf8,
}

/// A decoded characteristic value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Integer seconds, widened to 64 bits.
    Seconds(i64),
    /// A real-valued measurement.
    Real(f64),
    /// Text.
    Text(String),
}

impl DecodeRule {
    /// Exact payload length required, if fixed.
    pub fn expected_len(&self) -> Option<usize> {
        match self {
            Self::I32 | Self::F32 => Some(4),
            Self::U16 => Some(2),
            Self::Utf8 => None,
        }
    }

    /// Decode a payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeFailed`] on a length mismatch, a non-finite
    /// float or invalid UTF-8.
    pub fn decode(&self, characteristic: &'static str, payload: &[u8]) -> Result<DecodedValue> {
        if let Some(expected) = self.expected_len() {
            if payload.len() != expected {
                return Err(Error::DecodeFailed {
                    characteristic,
                    context: format!("expected {} bytes, got {}", expected, payload.len()),
                });
            }
        }

        let mut buf = payload;
        match self {
            Self::I32 => Ok(DecodedValue::Seconds(i64::from(buf.get_i32()))),
            Self::U16 => Ok(DecodedValue::Real(f64::from(buf.get_u16()))),
            Self::F32 => {
                let value = buf.get_f32();
                if !value.is_finite() {
                    return Err(Error::DecodeFailed {
                        characteristic,
                        context: format!("non-finite value {}", value),
                    });
                }
                Ok(DecodedValue::Real(f64::from(value)))
            }
            Self::Utf8 => String::from_utf8(payload.to_vec())
                .map(DecodedValue::Text)
                .map_err(|_| Error::DecodeFailed {
                    characteristic,
                    context: "invalid UTF-8".to_string(),
                }),
        }
    }
}

/// One of the five workout summary characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkoutCharacteristic {
    /// Elapsed workout time in seconds.
    ElapsedTime,
    /// Average heart rate in bpm.
    AvgHeartRate,
    /// Total distance in meters.
    TotalDistance,
    /// Calories burned in kcal.
    CaloriesBurned,
    /// Workout title.
    Title,
}

impl WorkoutCharacteristic {
    /// All characteristics in canonical read order.
    pub const CANONICAL_ORDER: [Self; 5] = [
        Self::ElapsedTime,
        Self::AvgHeartRate,
        Self::TotalDistance,
        Self::CaloriesBurned,
        Self::Title,
    ];

    /// Look up a characteristic by UUID.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|c| c.uuid() == *uuid)
    }

    /// The characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::ElapsedTime => ELAPSED_TIME_UUID,
            Self::AvgHeartRate => AVG_HEART_RATE_UUID,
            Self::TotalDistance => TOTAL_DISTANCE_UUID,
            Self::CaloriesBurned => CALORIES_BURNED_UUID,
            Self::Title => WORKOUT_TITLE_UUID,
        }
    }

    /// The decode rule for this characteristic's payload.
    pub fn decode_rule(&self) -> DecodeRule {
        match self {
            Self::ElapsedTime => DecodeRule::I32,
            Self::AvgHeartRate | Self::CaloriesBurned => DecodeRule::U16,
            Self::TotalDistance => DecodeRule::F32,
            Self::Title => DecodeRule::Utf8,
        }
    }

    /// Name of the summary field this characteristic fills.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::ElapsedTime => "elapsed_seconds",
            Self::AvgHeartRate => "avg_heart_rate",
            Self::TotalDistance => "total_distance",
            Self::CaloriesBurned => "calories_burned",
            Self::Title => "title",
        }
    }

    /// Decode a payload for this characteristic.
    pub fn decode(&self, payload: &[u8]) -> Result<DecodedValue> {
        self.decode_rule().decode(self.field_name(), payload)
    }
}

impl std::fmt::Display for WorkoutCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.field_name(), self.uuid())
    }
}

/// Result of driving the read sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadProgress {
    /// A read for this characteristic is now in flight.
    Issued(WorkoutCharacteristic),
    /// The queue drained; the assembled summary is handed over.
    Complete(WorkoutSummary),
    /// Nothing changed (stray callback, or the sequence already completed).
    Ignored,
}

/// FIFO queue issuing one characteristic read at a time.
///
/// Created fresh for every service discovery and never reused.
pub struct ReadSequencer {
    queue: VecDeque<WorkoutCharacteristic>,
    in_flight: Option<WorkoutCharacteristic>,
    assembler: Option<SummaryAssembler>,
    enqueued: usize,
    callbacks: usize,
    status_tx: broadcast::Sender<SyncStatus>,
}

impl ReadSequencer {
    /// Create an empty sequencer with a fresh summary.
    pub fn new(status_tx: broadcast::Sender<SyncStatus>) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            assembler: Some(SummaryAssembler::new()),
            enqueued: 0,
            callbacks: 0,
            status_tx,
        }
    }

    /// Queue every workout characteristic present on `service`, in canonical order.
    ///
    /// Returns the number of characteristics queued.
    pub fn enqueue_all(&mut self, service: &DiscoveredService) -> usize {
        self.queue.clear();

        for characteristic in WorkoutCharacteristic::CANONICAL_ORDER {
            if service.has_characteristic(&characteristic.uuid()) {
                debug!("Queued characteristic: {}", characteristic);
                self.queue.push_back(characteristic);
            } else {
                warn!(
                    "{}",
                    Error::CharacteristicMissing {
                        uuid: characteristic.uuid().to_string(),
                    }
                );
            }
        }

        self.enqueued = self.queue.len();
        self.enqueued
    }

    /// Characteristics still waiting to be read, front first.
    pub fn pending(&self) -> Vec<WorkoutCharacteristic> {
        self.queue.iter().copied().collect()
    }

    /// The characteristic whose read is in flight.
    pub fn in_flight(&self) -> Option<WorkoutCharacteristic> {
        self.in_flight
    }

    /// Number of characteristics queued by [`enqueue_all`](Self::enqueue_all).
    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    /// Number of read callbacks consumed.
    pub fn callbacks(&self) -> usize {
        self.callbacks
    }

    /// Check if the sequence has signalled completion.
    pub fn is_complete(&self) -> bool {
        self.assembler.is_none()
    }

    /// Pop the head of the queue and issue its read through `issue`.
    ///
    /// A read that cannot be issued is skipped, not retried. When the queue
    /// is empty the summary is returned exactly once.
    pub fn read_next<F>(&mut self, mut issue: F) -> ReadProgress
    where
        F: FnMut(Uuid) -> Result<()>,
    {
        if self.in_flight.is_some() || self.is_complete() {
            return ReadProgress::Ignored;
        }

        while let Some(next) = self.queue.pop_front() {
            debug!(
                "Reading next characteristic: {}, queue size: {}",
                next,
                self.queue.len()
            );

            match issue(next.uuid()) {
                Ok(()) => {
                    self.in_flight = Some(next);
                    return ReadProgress::Issued(next);
                }
                Err(e) => {
                    warn!("Failed to initiate read for {}: {}", next, e);
                }
            }
        }

        info!("All characteristics read");
        match self.assembler.take() {
            Some(assembler) => ReadProgress::Complete(assembler.finish()),
            None => ReadProgress::Ignored,
        }
    }

    /// Consume the result of the in-flight read, then issue the next one.
    ///
    /// Failed reads and undecodable payloads leave their field unset.
    pub fn on_read_complete<F>(
        &mut self,
        uuid: Uuid,
        status: GattStatus,
        payload: &[u8],
        issue: F,
    ) -> ReadProgress
    where
        F: FnMut(Uuid) -> Result<()>,
    {
        let characteristic = match self.in_flight {
            Some(c) if c.uuid() == uuid => c,
            _ => {
                warn!("Unexpected read callback for {}, ignoring", uuid);
                return ReadProgress::Ignored;
            }
        };

        self.in_flight = None;
        self.callbacks += 1;

        if status.is_success() {
            if let Some(assembler) = self.assembler.as_mut() {
                if let Err(e) = assembler.apply(characteristic, payload) {
                    warn!("{}", e);
                    let _ = self.status_tx.send(SyncStatus::DecodeFailed {
                        characteristic: characteristic.field_name(),
                    });
                }
            }
        } else {
            warn!(
                "{}",
                Error::ReadFailed {
                    uuid: uuid.to_string(),
                    status: status.0,
                }
            );
        }

        self.read_next(issue)
    }
}
