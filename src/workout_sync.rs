//! Workout sync orchestration.
//!
//! [`WorkoutSync`] owns the scan session, the connection and the sink, and
//! consumes every platform callback through a single transition function.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::advertising::AdvertisementFilter;
use crate::ble::connection::{AttemptEnd, ConnectionManager, ConnectionState};
use crate::ble::platform::{BleEvent, GattConnector, PermissionGateway, ScanControl};
use crate::ble::scanner::{ScanFailureReason, ScanOrchestrator, ScanState};
use crate::ble::uuids::WORKOUT_SERVICE_UUID;
use crate::data::summary::{CompletedWorkout, WorkoutSummary};
use crate::error::{Error, Result};
use crate::sink::HealthRecordSink;
use crate::status::SyncStatus;

/// Sync configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// How long to scan before reporting the treadmill as not found.
    pub scan_timeout: Duration,
    /// Service the treadmill advertises and exposes.
    pub target_service: Uuid,
}

impl SyncConfig {
    /// Default scan timeout (20 seconds).
    pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(20);

    /// Set the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Self::DEFAULT_SCAN_TIMEOUT,
            target_service: WORKOUT_SERVICE_UUID,
        }
    }
}

/// How a sync attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The workout was persisted.
    Saved(CompletedWorkout),
    /// The scan timed out.
    DeviceNotFound,
    /// Bluetooth is off or missing.
    AdapterUnavailable,
    /// Required permissions are missing.
    PermissionDenied,
    /// The platform aborted the scan.
    ScanFailed(ScanFailureReason),
    /// Connecting failed or the link dropped.
    ConnectionFailed,
    /// The workout service is missing.
    ServiceNotFound,
    /// Some fields were never read; nothing was persisted.
    Incomplete {
        /// Names of the unset fields.
        missing: Vec<&'static str>,
    },
    /// The sink rejected the workout.
    SaveFailed {
        /// Description from the sink.
        reason: String,
    },
}

impl SyncOutcome {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::AdapterUnavailable => Self::AdapterUnavailable,
            Error::PermissionDenied => Self::PermissionDenied,
            Error::ScanFailed { reason } => Self::ScanFailed(*reason),
            Error::ServiceNotFound { .. } => Self::ServiceNotFound,
            Error::IncompleteSummary { missing } => Self::Incomplete {
                missing: missing.clone(),
            },
            Error::PersistFailed { reason } => Self::SaveFailed {
                reason: reason.clone(),
            },
            _ => Self::ConnectionFailed,
        }
    }

    /// Check if the workout was saved.
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Drives one scan -> connect -> read -> persist attempt.
pub struct WorkoutSync<S: ScanControl, C: GattConnector, K: HealthRecordSink> {
    scanner: ScanOrchestrator<S>,
    connection: ConnectionManager<C>,
    sink: K,
    status_tx: broadcast::Sender<SyncStatus>,
    outcome: Option<SyncOutcome>,
}

impl<S: ScanControl, C: GattConnector, K: HealthRecordSink> WorkoutSync<S, C, K> {
    /// Create a new sync actor.
    pub fn new(
        scan: S,
        connector: C,
        sink: K,
        permissions: Arc<dyn PermissionGateway>,
        config: SyncConfig,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(32);

        Self {
            scanner: ScanOrchestrator::new(
                scan,
                permissions.clone(),
                AdvertisementFilter::new(config.target_service),
                config.scan_timeout,
                status_tx.clone(),
            ),
            connection: ConnectionManager::new(
                connector,
                config.target_service,
                permissions,
                status_tx.clone(),
            ),
            sink,
            status_tx,
            outcome: None,
        }
    }

    /// Subscribe to status events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// The outcome, once the attempt has ended.
    pub fn outcome(&self) -> Option<&SyncOutcome> {
        self.outcome.as_ref()
    }

    /// Check if the attempt has ended.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Current scan state.
    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The scan orchestrator.
    pub fn scanner(&self) -> &ScanOrchestrator<S> {
        &self.scanner
    }

    /// The connection manager.
    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// The sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Start scanning for the treadmill.
    ///
    /// # Errors
    ///
    /// Propagates [`ScanOrchestrator::start_scan`] failures; the attempt is
    /// then finished. A finished attempt cannot be restarted and returns
    /// [`Error::Internal`].
    pub fn start(&mut self) -> Result<()> {
        if self.outcome.is_some() {
            return Err(Error::Internal("sync attempt already finished".to_string()));
        }

        self.scanner.start_scan().map_err(|e| {
            let outcome = match &e {
                Error::AdapterUnavailable | Error::PermissionDenied => SyncOutcome::from_error(&e),
                _ => SyncOutcome::ScanFailed(ScanFailureReason::InternalError),
            };
            self.finish(outcome);
            e
        })
    }

    /// Consume one event from the sequential event stream.
    pub async fn handle_event(&mut self, event: BleEvent) {
        match event {
            BleEvent::Advertisement(advertisement) => {
                let Some(device) = self.scanner.on_advertisement(&advertisement) else {
                    return;
                };
                match self.connection.connect(&device) {
                    Ok(()) => {}
                    Err(Error::AlreadyConnecting) => {
                        warn!("Ignoring match for {}: connection already owned", device);
                    }
                    Err(e) => {
                        warn!("Could not connect to {}: {}", device, e);
                        self.finish(SyncOutcome::from_error(&e));
                    }
                }
            }
            BleEvent::ScanTimeout => {
                self.scanner.on_scan_timeout();
                if self.scanner.state() == ScanState::TimedOut {
                    self.finish(SyncOutcome::DeviceNotFound);
                }
            }
            BleEvent::ScanFailed(code) => {
                let reason = self.scanner.on_scan_error(code);
                if self.scanner.state() == ScanState::Failed {
                    self.finish(SyncOutcome::ScanFailed(reason));
                }
            }
            BleEvent::ConnectionStateChanged { connected } => {
                let end = self.connection.on_connection_state_changed(connected);
                self.on_attempt_end(end).await;
            }
            BleEvent::ServicesDiscovered(result) => {
                let end = self.connection.on_services_discovered(result);
                self.on_attempt_end(end).await;
            }
            BleEvent::CharacteristicRead {
                uuid,
                status,
                value,
            } => {
                let end = self.connection.on_characteristic_read(uuid, status, &value);
                self.on_attempt_end(end).await;
            }
        }
    }

    /// Start scanning, then consume `events` until the attempt ends.
    ///
    /// Always tears down before returning. On an attempt that has already
    /// finished, returns its outcome without touching the radio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the event stream closes before the
    /// attempt ends.
    pub async fn run(&mut self, events: &mut mpsc::UnboundedReceiver<BleEvent>) -> Result<SyncOutcome> {
        if let Some(outcome) = &self.outcome {
            debug!("Sync already finished: {:?}", outcome);
            return Ok(outcome.clone());
        }

        if let Err(e) = self.start() {
            debug!("Sync did not start: {}", e);
        }

        while self.outcome.is_none() {
            match events.recv().await {
                Some(event) => self.handle_event(event).await,
                None => {
                    self.teardown();
                    return Err(Error::Internal("event stream closed".to_string()));
                }
            }
        }

        self.teardown();
        self.outcome
            .clone()
            .ok_or_else(|| Error::Internal("sync finished without outcome".to_string()))
    }

    /// Stop the scan, disconnect and release the GATT handle.
    ///
    /// Runs every step regardless of state; safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Err(e) = self.scanner.stop_scan() {
            warn!("Error stopping scan during teardown: {}", e);
        }
        self.connection.teardown();
        debug!("Cleaned up GATT connection");
    }

    async fn on_attempt_end(&mut self, end: Option<AttemptEnd>) {
        match end {
            None => {}
            Some(AttemptEnd::Failed(e)) => self.finish(SyncOutcome::from_error(&e)),
            Some(AttemptEnd::Drained(summary)) => {
                let outcome = self.persist(summary).await;
                self.finish(outcome);
            }
        }
    }

    async fn persist(&mut self, summary: WorkoutSummary) -> SyncOutcome {
        let workout = match summary.complete() {
            Ok(workout) => workout,
            Err(e) => {
                warn!("{}, not saving", e);
                let outcome = SyncOutcome::from_error(&e);
                if let SyncOutcome::Incomplete { missing } = &outcome {
                    self.emit(SyncStatus::WorkoutIncomplete {
                        missing: missing.clone(),
                    });
                }
                return outcome;
            }
        };

        match self.sink.persist(&workout).await {
            Ok(()) => {
                info!("{} workout saved successfully", workout.title);
                self.emit(SyncStatus::WorkoutSaved {
                    title: workout.title.clone(),
                });
                SyncOutcome::Saved(workout)
            }
            Err(e) => {
                warn!("Failed to save workout: {}", e);
                let reason = match e {
                    Error::PersistFailed { reason } => reason,
                    other => other.to_string(),
                };
                self.emit(SyncStatus::SaveFailed {
                    reason: reason.clone(),
                });
                SyncOutcome::SaveFailed { reason }
            }
        }
    }

    fn finish(&mut self, outcome: SyncOutcome) {
        if self.outcome.is_none() {
            info!("Sync finished: {:?}", outcome);
            self.outcome = Some(outcome);
        }
    }

    fn emit(&self, status: SyncStatus) {
        let _ = self.status_tx.send(status);
    }
}

impl<S: ScanControl, C: GattConnector, K: HealthRecordSink> Drop for WorkoutSync<S, C, K> {
    fn drop(&mut self) {
        self.teardown();
    }
}
