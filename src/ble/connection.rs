//! BLE connection management.
//!
//! Owns the GATT handle for one treadmill at a time and drives
//! connect -> discover services -> read characteristics -> disconnect.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::advertising::DeviceIdentity;
use crate::ble::characteristics::{ReadProgress, ReadSequencer};
use crate::ble::platform::{DiscoveredService, GattClient, GattConnector, GattStatus, PermissionGateway};
use crate::data::summary::WorkoutSummary;
use crate::error::{Error, Result};
use crate::status::SyncStatus;

/// Connection state for the treadmill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection requested yet.
    #[default]
    Idle,
    /// Waiting for the platform connect callback.
    Connecting,
    /// Link is up.
    Connected,
    /// Waiting for service discovery.
    DiscoveringServices,
    /// Reading the workout characteristics.
    ReadingCharacteristics,
    /// Terminal; the GATT handle has been released.
    Disconnected,
}

impl ConnectionState {
    /// Check if a connection attempt currently owns the GATT handle.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Disconnected)
    }

    /// Check if the link is up.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::DiscoveringServices | Self::ReadingCharacteristics
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::DiscoveringServices => write!(f, "DiscoveringServices"),
            Self::ReadingCharacteristics => write!(f, "ReadingCharacteristics"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// How a connection attempt ended.
#[derive(Debug)]
pub enum AttemptEnd {
    /// A structural failure aborted the attempt.
    Failed(Error),
    /// Every queued characteristic was read; the summary may still be partial.
    Drained(WorkoutSummary),
}

/// Manages the connection to the treadmill.
pub struct ConnectionManager<C: GattConnector> {
    /// Platform connector.
    connector: C,
    /// The owned GATT handle, if any.
    gatt: Option<C::Gatt>,
    /// The device of the current attempt.
    device: Option<DeviceIdentity>,
    /// Current connection state.
    state: ConnectionState,
    /// Service resolved after discovery.
    target_service: Uuid,
    /// Read sequencer for the current attempt.
    sequencer: Option<ReadSequencer>,
    /// Permission gateway queried before privileged calls.
    permissions: Arc<dyn PermissionGateway>,
    /// Status channel.
    status_tx: broadcast::Sender<SyncStatus>,
}

impl<C: GattConnector> ConnectionManager<C> {
    /// Create a new connection manager.
    pub fn new(
        connector: C,
        target_service: Uuid,
        permissions: Arc<dyn PermissionGateway>,
        status_tx: broadcast::Sender<SyncStatus>,
    ) -> Self {
        Self {
            connector,
            gatt: None,
            device: None,
            state: ConnectionState::Idle,
            target_service,
            sequencer: None,
            permissions,
            status_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if a GATT handle is currently owned.
    pub fn has_gatt(&self) -> bool {
        self.gatt.is_some()
    }

    /// The device of the current (or last) attempt.
    pub fn device(&self) -> Option<&DeviceIdentity> {
        self.device.as_ref()
    }

    /// The read sequencer of the current attempt.
    pub fn sequencer(&self) -> Option<&ReadSequencer> {
        self.sequencer.as_ref()
    }

    /// Get the platform connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Request a connection to `device`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConnecting`] if an attempt is in progress,
    /// [`Error::PermissionDenied`] if permissions are missing, or
    /// [`Error::ConnectionFailed`] if the request could not be issued.
    pub fn connect(&mut self, device: &DeviceIdentity) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::AlreadyConnecting);
        }

        if !self.permissions.has_bluetooth_permissions() {
            warn!("Missing permissions for connection");
            self.emit(SyncStatus::PermissionDenied);
            return Err(Error::PermissionDenied);
        }

        info!("Connecting to treadmill: {}", device);
        self.device = Some(device.clone());
        self.sequencer = None;

        match self.connector.connect(device) {
            Ok(gatt) => {
                self.gatt = Some(gatt);
                self.set_state(ConnectionState::Connecting);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to initiate connection: {}", e);
                self.set_state(ConnectionState::Disconnected);
                self.emit(SyncStatus::ConnectionFailed);
                Err(Error::ConnectionFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Handle a connection state callback.
    pub fn on_connection_state_changed(&mut self, connected: bool) -> Option<AttemptEnd> {
        match (self.state, connected) {
            (ConnectionState::Connecting, true) => {
                if let Some(device) = &self.device {
                    info!("Connected to treadmill: {}", device.address);
                }
                self.set_state(ConnectionState::Connected);
                self.discover_services()
            }
            (state, false) if state.is_active() => {
                let reason = if state == ConnectionState::Connecting {
                    "connect callback reported failure"
                } else {
                    "connection lost"
                };
                warn!("Disconnected from treadmill while {}: {}", state, reason);
                self.fail(
                    SyncStatus::ConnectionFailed,
                    Error::ConnectionFailed {
                        reason: reason.to_string(),
                    },
                )
            }
            (state, connected) => {
                debug!(
                    "Ignoring connection callback (connected: {}) in state {}",
                    connected, state
                );
                None
            }
        }
    }

    /// Handle the service discovery result.
    pub fn on_services_discovered(
        &mut self,
        result: std::result::Result<Vec<DiscoveredService>, GattStatus>,
    ) -> Option<AttemptEnd> {
        if self.state != ConnectionState::DiscoveringServices {
            debug!("Ignoring service discovery result in state {}", self.state);
            return None;
        }

        let services = match result {
            Ok(services) => services,
            Err(status) => {
                error!("Service discovery failed: {}", status);
                return self.fail(
                    SyncStatus::ConnectionFailed,
                    Error::ConnectionFailed {
                        reason: format!("service discovery failed with status {}", status),
                    },
                );
            }
        };

        debug!(
            "Services discovered: {:?}",
            services.iter().map(|s| s.uuid).collect::<Vec<_>>()
        );

        let service = match services.into_iter().find(|s| s.uuid == self.target_service) {
            Some(service) => service,
            None => {
                warn!("Service not found: {}", self.target_service);
                return self.fail(
                    SyncStatus::ServiceNotFound,
                    Error::ServiceNotFound {
                        uuid: self.target_service.to_string(),
                    },
                );
            }
        };

        let mut sequencer = ReadSequencer::new(self.status_tx.clone());
        sequencer.enqueue_all(&service);
        self.sequencer = Some(sequencer);
        self.set_state(ConnectionState::ReadingCharacteristics);

        self.advance(|sequencer, issue| sequencer.read_next(issue))
    }

    /// Handle a characteristic read result.
    pub fn on_characteristic_read(
        &mut self,
        uuid: Uuid,
        status: GattStatus,
        value: &[u8],
    ) -> Option<AttemptEnd> {
        if self.state != ConnectionState::ReadingCharacteristics {
            debug!("Ignoring read of {} in state {}", uuid, self.state);
            return None;
        }

        self.advance(|sequencer, issue| sequencer.on_read_complete(uuid, status, value, issue))
    }

    /// Release the connection from any state. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!("Tearing down connection in state {}", self.state);
        }
        self.sequencer = None;
        self.release();
        self.set_state(ConnectionState::Disconnected);
    }

    fn discover_services(&mut self) -> Option<AttemptEnd> {
        if !self.permissions.has_bluetooth_permissions() {
            warn!("Missing permissions, cannot discover services");
            self.emit(SyncStatus::PermissionDenied);
            return Some(AttemptEnd::Failed(Error::PermissionDenied));
        }

        let issued = match self.gatt.as_mut() {
            Some(gatt) => gatt.discover_services(),
            None => Err(Error::NotConnected),
        };

        match issued {
            Ok(()) => {
                self.set_state(ConnectionState::DiscoveringServices);
                None
            }
            Err(e) => {
                error!("Failed to start service discovery: {}", e);
                self.fail(
                    SyncStatus::ConnectionFailed,
                    Error::ConnectionFailed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Drive the sequencer with an issuer that reads through the owned handle.
    fn advance<F>(&mut self, step: F) -> Option<AttemptEnd>
    where
        F: FnOnce(&mut ReadSequencer, &mut dyn FnMut(Uuid) -> Result<()>) -> ReadProgress,
    {
        let sequencer = self.sequencer.as_mut()?;
        let gatt = &mut self.gatt;
        let permissions = &self.permissions;
        let status_tx = &self.status_tx;

        let mut issue = |uuid: Uuid| -> Result<()> {
            if !permissions.has_bluetooth_permissions() {
                let _ = status_tx.send(SyncStatus::PermissionDenied);
                return Err(Error::PermissionDenied);
            }
            match gatt.as_mut() {
                Some(gatt) => gatt.read_characteristic(uuid),
                None => Err(Error::NotConnected),
            }
        };

        match step(sequencer, &mut issue) {
            ReadProgress::Complete(summary) => {
                self.release();
                self.set_state(ConnectionState::Disconnected);
                Some(AttemptEnd::Drained(summary))
            }
            ReadProgress::Issued(_) | ReadProgress::Ignored => None,
        }
    }

    fn fail(&mut self, status: SyncStatus, error: Error) -> Option<AttemptEnd> {
        self.sequencer = None;
        self.release();
        self.set_state(ConnectionState::Disconnected);
        self.emit(status);
        Some(AttemptEnd::Failed(error))
    }

    /// Disconnect and close the GATT handle if one is owned.
    fn release(&mut self) {
        if let Some(mut gatt) = self.gatt.take() {
            gatt.disconnect();
            gatt.close();
            debug!("Released GATT connection");
        }
    }

    /// Update the connection state.
    fn set_state(&mut self, new_state: ConnectionState) {
        let old_state = self.state;
        self.state = new_state;

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }
    }

    fn emit(&self, status: SyncStatus) {
        let _ = self.status_tx.send(status);
    }
}

impl<C: GattConnector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.release();
    }
}
