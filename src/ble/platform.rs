//! Platform seam between the sync state machine and a BLE stack.
//!
//! Every operation here is fire-and-forget: a method returning `Ok(())` only
//! means the request was issued. Its result arrives later as a [`BleEvent`]
//! on the single sequential event stream owned by the caller.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::advertising::{Advertisement, DeviceIdentity};
use crate::error::Result;

/// Status code attached to GATT callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(pub u8);

impl GattStatus {
    /// The operation succeeded.
    pub const SUCCESS: Self = Self(0x00);
    /// Generic failure reported by the stack.
    pub const FAILURE: Self = Self(0x85);

    /// Check if this status reports success.
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A service found during service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    /// Service UUID.
    pub uuid: Uuid,
    /// UUIDs of the characteristics exposed by the service.
    pub characteristics: Vec<Uuid>,
}

impl DiscoveredService {
    /// Create a new discovered service.
    pub fn new(uuid: Uuid, characteristics: Vec<Uuid>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    /// Check if the service exposes a characteristic.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.contains(uuid)
    }
}

/// Tagged events delivered on the sequential event stream.
#[derive(Debug, Clone)]
pub enum BleEvent {
    /// A scan result was received.
    Advertisement(Advertisement),
    /// The scan timeout fired.
    ScanTimeout,
    /// The platform reported a scan failure with a raw error code.
    ScanFailed(i32),
    /// The connection state of the owned GATT handle changed.
    ConnectionStateChanged {
        /// Whether the link is now up.
        connected: bool,
    },
    /// Service discovery finished.
    ServicesDiscovered(std::result::Result<Vec<DiscoveredService>, GattStatus>),
    /// A characteristic read finished.
    CharacteristicRead {
        /// The characteristic that was read.
        uuid: Uuid,
        /// Status reported by the platform.
        status: GattStatus,
        /// Raw payload; empty on failure.
        value: Vec<u8>,
    },
}

/// Grants or denies OS-level Bluetooth (and location) permissions.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionGateway: Send + Sync {
    /// Check whether every permission required for scan/connect/read is granted.
    fn has_bluetooth_permissions(&self) -> bool;
}

/// Permission gateway for platforms without runtime permission prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionGateway for AlwaysGranted {
    fn has_bluetooth_permissions(&self) -> bool {
        true
    }
}

/// Controls the single scan session.
pub trait ScanControl: Send {
    /// Check whether the Bluetooth adapter is present and powered.
    fn is_adapter_enabled(&self) -> bool;

    /// Start scanning for `service`, delivering [`BleEvent::Advertisement`]s and
    /// a single [`BleEvent::ScanTimeout`] once `timeout` elapses.
    fn start_scan(&mut self, service: Uuid, timeout: Duration) -> Result<()>;

    /// Stop scanning and disarm the timeout.
    fn stop_scan(&mut self) -> Result<()>;
}

/// Opens GATT connections.
pub trait GattConnector: Send {
    /// The connection handle type produced by this connector.
    type Gatt: GattClient;

    /// Issue a connection request. The outcome arrives as
    /// [`BleEvent::ConnectionStateChanged`].
    fn connect(&mut self, device: &DeviceIdentity) -> Result<Self::Gatt>;
}

/// An owned GATT connection handle.
pub trait GattClient: Send {
    /// Issue service discovery. Completes with [`BleEvent::ServicesDiscovered`].
    fn discover_services(&mut self) -> Result<()>;

    /// Issue a read of one characteristic. Completes with
    /// [`BleEvent::CharacteristicRead`].
    fn read_characteristic(&mut self, uuid: Uuid) -> Result<()>;

    /// Drop the link.
    fn disconnect(&mut self);

    /// Release the handle and any resources it holds.
    fn close(self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;

    #[test]
    fn test_gatt_status() {
        assert!(GattStatus::SUCCESS.is_success());
        assert!(!GattStatus::FAILURE.is_success());
        assert_eq!(GattStatus(0x85).to_string(), "0x85");
    }

    #[test]
    fn test_discovered_service_lookup() {
        let service = DiscoveredService::new(
            WORKOUT_SERVICE_UUID,
            vec![ELAPSED_TIME_UUID, WORKOUT_TITLE_UUID],
        );
        assert!(service.has_characteristic(&ELAPSED_TIME_UUID));
        assert!(!service.has_characteristic(&AVG_HEART_RATE_UUID));
    }

    #[test]
    fn test_always_granted() {
        assert!(AlwaysGranted.has_bluetooth_permissions());
    }
}
