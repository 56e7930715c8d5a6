//! Advertisement data and target filtering.
//!
//! Decides whether a scan result comes from the treadmill.

use uuid::Uuid;

use crate::ble::uuids::WORKOUT_SERVICE_UUID;

/// Identity of a discovered peripheral.
///
/// Only valid for the lifetime of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Opaque platform handle used to look the peripheral up again.
    pub id: String,
    /// Stable address string (MAC address where the platform exposes one).
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl DeviceIdentity {
    /// Create a new device identity.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            name: None,
        }
    }

    /// Attach the advertised local name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Get a name suitable for display.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

/// A single scan result.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// The advertising peripheral.
    pub device: DeviceIdentity,
    /// Service UUIDs listed in the advertisement.
    pub service_uuids: Vec<Uuid>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Raw advertisement payload, if the platform exposes it.
    pub payload: Vec<u8>,
}

impl Advertisement {
    /// Create an advertisement without payload or signal strength.
    pub fn new(device: DeviceIdentity, service_uuids: Vec<Uuid>) -> Self {
        Self {
            device,
            service_uuids,
            rssi: None,
            payload: Vec::new(),
        }
    }

    /// Attach the signal strength.
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}

/// Matches advertisements against a single target service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisementFilter {
    service: Uuid,
}

impl AdvertisementFilter {
    /// Create a filter for `service`.
    pub fn new(service: Uuid) -> Self {
        Self { service }
    }

    /// The service this filter matches.
    pub fn service(&self) -> Uuid {
        self.service
    }

    /// Check whether an advertisement lists the target service.
    ///
    /// Only exact UUID equality matches.
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        advertisement.service_uuids.contains(&self.service)
    }
}

impl Default for AdvertisementFilter {
    fn default() -> Self {
        Self::new(WORKOUT_SERVICE_UUID)
    }
}
