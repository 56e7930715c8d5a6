//! Error types for the treadmill-workout-ble crate.

use thiserror::Error;

use crate::ble::scanner::ScanFailureReason;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Required Bluetooth/location permissions are not granted.
    #[error("Bluetooth permissions not granted")]
    PermissionDenied,

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    AdapterUnavailable,

    /// The platform reported a scan failure.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Why the scan failed.
        reason: ScanFailureReason,
    },

    /// A connection is already owned and not yet released.
    #[error("Connection already in progress")]
    AlreadyConnecting,

    /// Failed to establish or keep a connection to the treadmill.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Operation requires a connection but none is owned.
    #[error("Treadmill not connected")]
    NotConnected,

    /// The workout service was not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// A workout characteristic is absent from the discovered service.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicMissing {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// A characteristic read completed with a failure status.
    #[error("Read of {uuid} failed with status {status}")]
    ReadFailed {
        /// The UUID of the characteristic.
        uuid: String,
        /// The GATT status reported by the platform.
        status: u8,
    },

    /// A characteristic payload could not be decoded.
    #[error("Failed to decode {characteristic}: {context}")]
    DecodeFailed {
        /// Name of the characteristic.
        characteristic: &'static str,
        /// Description of what was wrong with the payload.
        context: String,
    },

    /// The read sequence drained with at least one summary field unset.
    #[error("Workout incomplete, missing: {}", missing.join(", "))]
    IncompleteSummary {
        /// Names of the fields that were never set.
        missing: Vec<&'static str>,
    },

    /// The health record sink rejected the workout.
    #[error("Failed to persist workout: {reason}")]
    PersistFailed {
        /// Description from the sink.
        reason: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error only degrades a single summary field.
    ///
    /// These are absorbed by the read sequencer and never abort an attempt.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::CharacteristicMissing { .. } | Self::ReadFailed { .. } | Self::DecodeFailed { .. }
        )
    }

    /// Check if this error aborts the current scan/connection attempt.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::AdapterUnavailable
                | Self::ScanFailed { .. }
                | Self::ConnectionFailed { .. }
                | Self::ServiceNotFound { .. }
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
