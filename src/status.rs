//! Status events for the UI presentation layer.

use crate::ble::scanner::ScanFailureReason;

/// A user-facing status emitted by the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Scanning for the treadmill has started.
    Scanning,
    /// The treadmill was found and a connection is being attempted.
    DeviceFound {
        /// Address of the matched device.
        address: String,
    },
    /// The scan timed out without a match.
    DeviceNotFound,
    /// Bluetooth is off or missing.
    AdapterUnavailable,
    /// Required permissions are missing.
    PermissionDenied,
    /// The platform aborted the scan.
    ScanFailed {
        /// Mapped platform reason.
        reason: ScanFailureReason,
    },
    /// The connection could not be established or was lost.
    ConnectionFailed,
    /// The connected device does not expose the workout service.
    ServiceNotFound,
    /// A characteristic payload could not be decoded.
    DecodeFailed {
        /// Name of the characteristic.
        characteristic: &'static str,
    },
    /// The read sequence finished with fields missing; nothing was saved.
    WorkoutIncomplete {
        /// Names of the unset fields.
        missing: Vec<&'static str>,
    },
    /// The workout was handed to the sink successfully.
    WorkoutSaved {
        /// Workout title.
        title: String,
    },
    /// The sink rejected the workout.
    SaveFailed {
        /// Description from the sink.
        reason: String,
    },
}

impl SyncStatus {
    /// Check if this status ends the current attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Scanning | Self::DeviceFound { .. } | Self::DecodeFailed { .. }
        )
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scanning => write!(f, "Scanning for treadmill"),
            Self::DeviceFound { address } => write!(f, "Treadmill found: {}", address),
            Self::DeviceNotFound => write!(f, "Treadmill not found"),
            Self::AdapterUnavailable => write!(f, "Bluetooth is disabled. Please enable it."),
            Self::PermissionDenied => write!(f, "Bluetooth permissions not granted"),
            Self::ScanFailed { reason } => write!(f, "Scan failed: {}", reason),
            Self::ConnectionFailed => write!(f, "Failed to connect to treadmill"),
            Self::ServiceNotFound => write!(f, "Workout service not found"),
            Self::DecodeFailed { characteristic } => {
                write!(f, "Could not decode {}", characteristic)
            }
            Self::WorkoutIncomplete { missing } => {
                write!(f, "Workout incomplete, not saved (missing {})", missing.join(", "))
            }
            Self::WorkoutSaved { title } => write!(f, "{} workout saved successfully!", title),
            Self::SaveFailed { .. } => write!(f, "Failed to save workout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!SyncStatus::Scanning.is_terminal());
        assert!(!SyncStatus::DecodeFailed {
            characteristic: "title"
        }
        .is_terminal());
        assert!(SyncStatus::DeviceNotFound.is_terminal());
        assert!(SyncStatus::WorkoutSaved {
            title: "Morning Run".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_status_display() {
        let saved = SyncStatus::WorkoutSaved {
            title: "Morning Run".to_string(),
        };
        assert_eq!(saved.to_string(), "Morning Run workout saved successfully!");

        let incomplete = SyncStatus::WorkoutIncomplete {
            missing: vec!["avg_heart_rate"],
        };
        assert!(incomplete.to_string().contains("avg_heart_rate"));
    }
}
