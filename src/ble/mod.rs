//! BLE communication module.
//!
//! This module provides the treadmill discovery and GATT read flow, the
//! platform seams it runs against, and a btleplug implementation of them.

pub mod advertising;
pub mod btle;
pub mod characteristics;
pub mod connection;
pub mod platform;
pub mod scanner;
pub mod uuids;

pub use advertising::{Advertisement, AdvertisementFilter, DeviceIdentity};
pub use btle::{BtleConnector, BtleGatt, BtleScanner};
pub use characteristics::{ReadProgress, ReadSequencer, WorkoutCharacteristic};
pub use connection::{AttemptEnd, ConnectionManager, ConnectionState};
pub use platform::{
    AlwaysGranted, BleEvent, DiscoveredService, GattClient, GattConnector, GattStatus,
    PermissionGateway, ScanControl,
};
pub use scanner::{ScanFailureReason, ScanOrchestrator, ScanState};
pub use uuids::*;
