//! BLE scanning functionality.
//!
//! Owns the single scan session and routes the first matching advertisement
//! to the caller.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::ble::advertising::{Advertisement, AdvertisementFilter, DeviceIdentity};
use crate::ble::platform::{PermissionGateway, ScanControl};
use crate::error::{Error, Result};
use crate::status::SyncStatus;

/// Closed set of reasons a platform scan can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanFailureReason {
    /// A scan with the same settings is already running.
    AlreadyStarted,
    /// The application could not be registered with the scanner.
    RegistrationFailed,
    /// Internal stack error.
    InternalError,
    /// The adapter does not support the requested scan.
    FeatureUnsupported,
}

impl ScanFailureReason {
    /// Map a raw platform error code. Unknown codes are internal errors.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::AlreadyStarted,
            2 => Self::RegistrationFailed,
            4 => Self::FeatureUnsupported,
            _ => Self::InternalError,
        }
    }

    /// The raw platform error code for this reason.
    pub fn code(&self) -> i32 {
        match self {
            Self::AlreadyStarted => 1,
            Self::RegistrationFailed => 2,
            Self::InternalError => 3,
            Self::FeatureUnsupported => 4,
        }
    }
}

impl std::fmt::Display for ScanFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "already started"),
            Self::RegistrationFailed => write!(f, "app registration failed"),
            Self::InternalError => write!(f, "internal error"),
            Self::FeatureUnsupported => write!(f, "feature unsupported"),
        }
    }
}

/// Lifecycle of the scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanState {
    /// No scan requested yet.
    #[default]
    Idle,
    /// Waiting for a matching advertisement.
    Scanning,
    /// A device matched; further results are ignored.
    Matched,
    /// The timeout fired before a match.
    TimedOut,
    /// The platform aborted the scan.
    Failed,
}

impl ScanState {
    /// Check if advertisements are still being considered.
    pub fn is_accepting(&self) -> bool {
        matches!(self, Self::Scanning)
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Matched => write!(f, "Matched"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Drives one scan session for the treadmill.
pub struct ScanOrchestrator<S> {
    /// Platform scan control.
    control: S,
    /// Permission gateway queried before privileged calls.
    permissions: Arc<dyn PermissionGateway>,
    /// Target filter.
    filter: AdvertisementFilter,
    /// How long to scan before giving up.
    timeout: Duration,
    /// Session lifecycle.
    state: ScanState,
    /// Whether the platform scan is presumed running.
    radio_active: bool,
    /// Status channel.
    status_tx: broadcast::Sender<SyncStatus>,
}

impl<S: ScanControl> ScanOrchestrator<S> {
    /// Create a new scan orchestrator.
    pub fn new(
        control: S,
        permissions: Arc<dyn PermissionGateway>,
        filter: AdvertisementFilter,
        timeout: Duration,
        status_tx: broadcast::Sender<SyncStatus>,
    ) -> Self {
        Self {
            control,
            permissions,
            filter,
            timeout,
            state: ScanState::Idle,
            radio_active: false,
            status_tx,
        }
    }

    /// Get the current scan state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Check if the platform scan is presumed running.
    pub fn is_scanning(&self) -> bool {
        self.radio_active
    }

    /// Get the underlying scan control.
    pub fn control(&self) -> &S {
        &self.control
    }

    /// Start scanning for the target service and arm the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if Bluetooth is off,
    /// [`Error::PermissionDenied`] if permissions are missing, or the
    /// platform error if the scan could not be issued.
    pub fn start_scan(&mut self) -> Result<()> {
        if self.radio_active {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        if !self.control.is_adapter_enabled() {
            warn!("Bluetooth adapter is disabled");
            self.emit(SyncStatus::AdapterUnavailable);
            return Err(Error::AdapterUnavailable);
        }

        if !self.permissions.has_bluetooth_permissions() {
            warn!("Missing permissions, BLE scanning will not start");
            self.emit(SyncStatus::PermissionDenied);
            return Err(Error::PermissionDenied);
        }

        info!(
            "Starting BLE scan for service {} ({:?} timeout)",
            self.filter.service(),
            self.timeout
        );

        if let Err(e) = self.control.start_scan(self.filter.service(), self.timeout) {
            warn!("Failed to start scan: {}", e);
            self.state = ScanState::Failed;
            self.emit(SyncStatus::ScanFailed {
                reason: ScanFailureReason::InternalError,
            });
            return Err(e);
        }

        self.radio_active = true;
        self.state = ScanState::Scanning;
        self.emit(SyncStatus::Scanning);
        Ok(())
    }

    /// Handle a scan result.
    ///
    /// Returns the device on the first match. Scanning is stopped before the
    /// device is returned; later results are ignored.
    pub fn on_advertisement(&mut self, advertisement: &Advertisement) -> Option<DeviceIdentity> {
        trace!(
            "Device detected - Address: {}, RSSI: {:?}, Data: {} bytes, Services: {:?}",
            advertisement.device.address,
            advertisement.rssi,
            advertisement.payload.len(),
            advertisement.service_uuids
        );

        if !self.state.is_accepting() {
            trace!("Scan is {}, ignoring advertisement", self.state);
            return None;
        }

        if !self.filter.matches(advertisement) {
            trace!("Not the treadmill: {}", advertisement.device.address);
            return None;
        }

        info!("Treadmill detected: {}", advertisement.device);
        self.state = ScanState::Matched;

        if let Err(e) = self.stop_scan() {
            warn!("Could not stop scan before connecting: {}", e);
        }

        self.emit(SyncStatus::DeviceFound {
            address: advertisement.device.address.clone(),
        });

        Some(advertisement.device.clone())
    }

    /// Handle the scan timeout. A no-op once a device has matched.
    pub fn on_scan_timeout(&mut self) {
        if !self.state.is_accepting() {
            debug!("Scan timeout after {}, ignoring", self.state);
            return;
        }

        info!("Scan timed out, treadmill not found");
        self.state = ScanState::TimedOut;

        if let Err(e) = self.stop_scan() {
            warn!("Could not stop scan after timeout: {}", e);
        }

        self.emit(SyncStatus::DeviceNotFound);
    }

    /// Handle a platform scan failure. The scan is considered stopped.
    ///
    /// Only a session that has not yet matched or timed out fails; later
    /// errors are logged and otherwise ignored.
    pub fn on_scan_error(&mut self, code: i32) -> ScanFailureReason {
        let reason = ScanFailureReason::from_code(code);
        self.radio_active = false;

        if !matches!(self.state, ScanState::Idle | ScanState::Scanning) {
            debug!("Scan error {} ({}) after {}, ignoring", code, reason, self.state);
            return reason;
        }

        warn!("BLE scan failed with error {}: {}", code, reason);
        self.state = ScanState::Failed;
        self.emit(SyncStatus::ScanFailed { reason });

        reason
    }

    /// Stop scanning. Stopping an inactive scan is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if permissions were revoked; the
    /// scan is then presumed still running and the call may be retried.
    pub fn stop_scan(&mut self) -> Result<()> {
        if !self.radio_active {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        if !self.permissions.has_bluetooth_permissions() {
            warn!("Missing required permissions, cannot stop BLE scan");
            self.emit(SyncStatus::PermissionDenied);
            return Err(Error::PermissionDenied);
        }

        info!("Stopping BLE scan");
        self.radio_active = false;

        self.control.stop_scan()
    }

    fn emit(&self, status: SyncStatus) {
        let _ = self.status_tx.send(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::platform::MockPermissionGateway;
    use crate::ble::uuids::*;
    use crate::testing::{FakeScanner, ScanCall};
    use pretty_assertions::assert_eq;

    fn granted() -> Arc<dyn PermissionGateway> {
        let mut gateway = MockPermissionGateway::new();
        gateway.expect_has_bluetooth_permissions().return_const(true);
        Arc::new(gateway)
    }

    fn orchestrator(
        scanner: FakeScanner,
        permissions: Arc<dyn PermissionGateway>,
    ) -> (ScanOrchestrator<FakeScanner>, broadcast::Receiver<SyncStatus>) {
        let (tx, rx) = broadcast::channel(16);
        let scan = ScanOrchestrator::new(
            scanner,
            permissions,
            AdvertisementFilter::default(),
            Duration::from_secs(20),
            tx,
        );
        (scan, rx)
    }

    fn treadmill_adv() -> Advertisement {
        Advertisement::new(
            DeviceIdentity::new("dev-1", "AA:BB:CC:DD:EE:FF"),
            vec![WORKOUT_SERVICE_UUID],
        )
    }

    #[test]
    fn test_scan_failure_reason_mapping() {
        assert_eq!(ScanFailureReason::from_code(1), ScanFailureReason::AlreadyStarted);
        assert_eq!(ScanFailureReason::from_code(2), ScanFailureReason::RegistrationFailed);
        assert_eq!(ScanFailureReason::from_code(3), ScanFailureReason::InternalError);
        assert_eq!(ScanFailureReason::from_code(4), ScanFailureReason::FeatureUnsupported);
        assert_eq!(ScanFailureReason::from_code(99), ScanFailureReason::InternalError);
        assert_eq!(ScanFailureReason::from_code(4).code(), 4);
    }

    #[test]
    fn test_start_requires_adapter() {
        let scanner = FakeScanner::new();
        scanner.set_adapter_enabled(false);
        let (mut scan, mut rx) = orchestrator(scanner.clone(), granted());

        assert!(matches!(scan.start_scan(), Err(Error::AdapterUnavailable)));
        assert_eq!(rx.try_recv().unwrap(), SyncStatus::AdapterUnavailable);
        assert!(scanner.calls().is_empty());
    }

    #[test]
    fn test_start_requires_permissions() {
        let scanner = FakeScanner::new();
        let mut gateway = MockPermissionGateway::new();
        gateway.expect_has_bluetooth_permissions().return_const(false);
        let (mut scan, _rx) = orchestrator(scanner.clone(), Arc::new(gateway));

        assert!(matches!(scan.start_scan(), Err(Error::PermissionDenied)));
        assert_eq!(scan.state(), ScanState::Idle);
        assert!(scanner.calls().is_empty());
    }

    #[test]
    fn test_match_stops_scan_and_ignores_later_results() {
        let scanner = FakeScanner::new();
        let (mut scan, _rx) = orchestrator(scanner.clone(), granted());
        scan.start_scan().unwrap();

        let other = Advertisement::new(DeviceIdentity::new("dev-0", "00:00:00:00:00:01"), vec![]);
        assert!(scan.on_advertisement(&other).is_none());

        let device = scan.on_advertisement(&treadmill_adv()).unwrap();
        assert_eq!(device.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(scan.state(), ScanState::Matched);
        assert!(!scan.is_scanning());

        assert!(scan.on_advertisement(&treadmill_adv()).is_none());
        assert_eq!(
            scanner.calls(),
            vec![
                ScanCall::Start(WORKOUT_SERVICE_UUID, Duration::from_secs(20)),
                ScanCall::Stop,
            ]
        );
    }

    #[test]
    fn test_timeout_after_match_is_noop() {
        let scanner = FakeScanner::new();
        let (mut scan, mut rx) = orchestrator(scanner.clone(), granted());
        scan.start_scan().unwrap();
        scan.on_advertisement(&treadmill_adv()).unwrap();
        scan.on_scan_timeout();

        assert_eq!(scan.state(), ScanState::Matched);
        assert_eq!(scanner.calls().len(), 2);
        assert_eq!(rx.try_recv().unwrap(), SyncStatus::Scanning);
        assert!(matches!(rx.try_recv().unwrap(), SyncStatus::DeviceFound { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_timeout_stops_scan_and_reports_not_found() {
        let scanner = FakeScanner::new();
        let (mut scan, mut rx) = orchestrator(scanner.clone(), granted());
        scan.start_scan().unwrap();
        scan.on_scan_timeout();

        assert_eq!(scan.state(), ScanState::TimedOut);
        assert!(!scan.is_scanning());
        assert!(scan.on_advertisement(&treadmill_adv()).is_none());
        let _ = rx.try_recv();
        assert_eq!(rx.try_recv().unwrap(), SyncStatus::DeviceNotFound);
    }

    #[test]
    fn test_scan_error_marks_stopped() {
        let scanner = FakeScanner::new();
        let (mut scan, _rx) = orchestrator(scanner.clone(), granted());
        scan.start_scan().unwrap();

        assert_eq!(scan.on_scan_error(4), ScanFailureReason::FeatureUnsupported);
        assert!(!scan.is_scanning());
        assert!(scan.stop_scan().is_ok());
        assert_eq!(scanner.calls().len(), 1);
    }

    #[test]
    fn test_scan_error_after_match_keeps_match() {
        let scanner = FakeScanner::new();
        let (mut scan, mut rx) = orchestrator(scanner.clone(), granted());
        scan.start_scan().unwrap();
        scan.on_advertisement(&treadmill_adv()).unwrap();

        assert_eq!(scan.on_scan_error(2), ScanFailureReason::RegistrationFailed);
        assert_eq!(scan.state(), ScanState::Matched);
        assert_eq!(rx.try_recv().unwrap(), SyncStatus::Scanning);
        assert!(matches!(rx.try_recv().unwrap(), SyncStatus::DeviceFound { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_with_revoked_permissions_leaves_scan_running() {
        let scanner = FakeScanner::new();
        let mut gateway = MockPermissionGateway::new();
        let mut seq = mockall::Sequence::new();
        gateway
            .expect_has_bluetooth_permissions()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(true);
        gateway
            .expect_has_bluetooth_permissions()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(false);
        gateway
            .expect_has_bluetooth_permissions()
            .in_sequence(&mut seq)
            .return_const(true);
        let (mut scan, _rx) = orchestrator(scanner.clone(), Arc::new(gateway));

        scan.start_scan().unwrap();
        assert!(matches!(scan.stop_scan(), Err(Error::PermissionDenied)));
        assert!(scan.is_scanning());

        scan.stop_scan().unwrap();
        assert!(!scan.is_scanning());
        scan.stop_scan().unwrap();
        assert_eq!(scanner.calls().len(), 2);
    }
}
