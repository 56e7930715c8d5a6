//! Recording fakes for the scan and GATT seams.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::advertising::DeviceIdentity;
use crate::ble::characteristics::WorkoutCharacteristic;
use crate::ble::platform::{
    DiscoveredService, GattClient, GattConnector, PermissionGateway, ScanControl,
};
use crate::ble::uuids::WORKOUT_SERVICE_UUID;
use crate::error::{Error, Result};

/// The workout service with all five characteristics.
pub fn full_service() -> DiscoveredService {
    DiscoveredService::new(
        WORKOUT_SERVICE_UUID,
        WorkoutCharacteristic::CANONICAL_ORDER
            .iter()
            .map(|c| c.uuid())
            .collect(),
    )
}

/// Permissions that start granted and can be revoked mid-flow.
#[derive(Clone)]
pub struct RevocablePermissions {
    granted: Arc<AtomicBool>,
}

impl RevocablePermissions {
    pub fn new() -> Self {
        Self {
            granted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn revoke(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }
}

impl PermissionGateway for RevocablePermissions {
    fn has_bluetooth_permissions(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCall {
    Start(Uuid, Duration),
    Stop,
}

struct ScannerState {
    adapter_enabled: bool,
    calls: Vec<ScanCall>,
}

#[derive(Clone)]
pub struct FakeScanner {
    state: Arc<Mutex<ScannerState>>,
}

impl FakeScanner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScannerState {
                adapter_enabled: true,
                calls: Vec::new(),
            })),
        }
    }

    pub fn set_adapter_enabled(&self, enabled: bool) {
        self.state.lock().adapter_enabled = enabled;
    }

    pub fn calls(&self) -> Vec<ScanCall> {
        self.state.lock().calls.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == ScanCall::Stop).count()
    }
}

impl ScanControl for FakeScanner {
    fn is_adapter_enabled(&self) -> bool {
        self.state.lock().adapter_enabled
    }

    fn start_scan(&mut self, service: Uuid, timeout: Duration) -> Result<()> {
        self.state.lock().calls.push(ScanCall::Start(service, timeout));
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        self.state.lock().calls.push(ScanCall::Stop);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattCall {
    Connect(String),
    DiscoverServices,
    Read(Uuid),
    Disconnect,
    Close,
}

#[derive(Default)]
struct GattState {
    calls: Vec<GattCall>,
    refuse_reads: Vec<Uuid>,
    refuse_connect: bool,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<GattState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make issuing a read of `uuid` fail synchronously.
    pub fn refuse_read(&self, uuid: Uuid) {
        self.state.lock().refuse_reads.push(uuid);
    }

    pub fn refuse_connect(&self) {
        self.state.lock().refuse_connect = true;
    }

    pub fn calls(&self) -> Vec<GattCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &GattCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn reads(&self) -> Vec<Uuid> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GattCall::Read(uuid) => Some(*uuid),
                _ => None,
            })
            .collect()
    }

    pub fn last_read(&self) -> Option<Uuid> {
        self.reads().last().copied()
    }
}

impl GattConnector for FakeConnector {
    type Gatt = FakeGatt;

    fn connect(&mut self, device: &DeviceIdentity) -> Result<FakeGatt> {
        let mut state = self.state.lock();
        if state.refuse_connect {
            return Err(Error::ConnectionFailed {
                reason: "refused".to_string(),
            });
        }
        state.calls.push(GattCall::Connect(device.id.clone()));
        Ok(FakeGatt {
            state: self.state.clone(),
        })
    }
}

pub struct FakeGatt {
    state: Arc<Mutex<GattState>>,
}

impl GattClient for FakeGatt {
    fn discover_services(&mut self) -> Result<()> {
        self.state.lock().calls.push(GattCall::DiscoverServices);
        Ok(())
    }

    fn read_characteristic(&mut self, uuid: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        if state.refuse_reads.contains(&uuid) {
            return Err(Error::CharacteristicMissing {
                uuid: uuid.to_string(),
            });
        }
        state.calls.push(GattCall::Read(uuid));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state.lock().calls.push(GattCall::Disconnect);
    }

    fn close(self) {
        self.state.lock().calls.push(GattCall::Close);
    }
}
