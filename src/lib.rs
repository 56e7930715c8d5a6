// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # treadmill-workout-ble
//!
//! A Rust library that pulls the summary of the last workout off a
//! Bluetooth Low Energy treadmill and hands it to a health-data store.
//!
//! One sync attempt scans for the treadmill's workout service, connects to
//! the first match, reads five summary characteristics strictly one at a
//! time, disconnects, and persists the workout only if every field decoded.
//!
//! ## Features
//!
//! - **Targeted Discovery**: Scan filtered on the workout service UUID, with a timeout
//! - **Serialized Reads**: Exactly one GATT read in flight at any moment
//! - **Strict Decoding**: Fixed-length big-endian payloads, UTF-8 title
//! - **All-or-nothing Persistence**: Partial workouts are never written
//! - **Status Events**: Broadcast progress for a UI to render
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use treadmill_workout_ble::{btle, AlwaysGranted, LogSink, Result, SyncConfig, WorkoutSync};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let (scanner, connector) = btle::open(tx).await?;
//!
//!     let mut sync = WorkoutSync::new(
//!         scanner,
//!         connector,
//!         LogSink,
//!         Arc::new(AlwaysGranted),
//!         SyncConfig::default(),
//!     );
//!
//!     let mut status = sync.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(s) = status.recv().await {
//!             println!("{}", s);
//!         }
//!     });
//!
//!     let outcome = sync.run(&mut rx).await?;
//!     println!("Sync finished: {:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod data;
pub mod error;
pub mod sink;
pub mod status;
pub mod workout_sync;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use error::{Error, Result};
pub use sink::{HealthRecordSink, LogSink, MemorySink};
pub use status::SyncStatus;
pub use workout_sync::{SyncConfig, SyncOutcome, WorkoutSync};

// Re-export commonly used types from submodules
pub use ble::btle;
pub use ble::{
    Advertisement, AlwaysGranted, BleEvent, ConnectionState, DeviceIdentity, DiscoveredService,
    GattClient, GattConnector, GattStatus, PermissionGateway, ScanControl, ScanFailureReason,
    ScanState, WorkoutCharacteristic,
};
pub use data::{CompletedWorkout, HealthRecords, WorkoutSummary};
