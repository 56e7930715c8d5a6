//! btleplug-backed platform implementation.
//!
//! Every asynchronous btleplug call is spawned on the current tokio runtime
//! and its result is delivered as a [`BleEvent`] on one unbounded channel,
//! so the state machines only ever see a single sequential event stream.

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::advertising::{Advertisement, DeviceIdentity};
use crate::ble::platform::{
    BleEvent, DiscoveredService, GattClient, GattConnector, GattStatus, ScanControl,
};
use crate::ble::scanner::ScanFailureReason;
use crate::error::{Error, Result};

/// Peripherals seen during scanning, keyed by peripheral id.
type Registry = Arc<RwLock<HashMap<String, Peripheral>>>;

fn runtime() -> Result<Handle> {
    Handle::try_current().map_err(|e| Error::Internal(format!("no tokio runtime: {}", e)))
}

/// Open the first Bluetooth adapter and build a scanner/connector pair
/// that report into `events`.
///
/// # Errors
///
/// Returns [`Error::AdapterUnavailable`] if no adapter is present.
pub async fn open(events: mpsc::UnboundedSender<BleEvent>) -> Result<(BtleScanner, BtleConnector)> {
    let manager = Manager::new()
        .await
        .map_err(|_e| Error::AdapterUnavailable)?;

    let adapter = manager
        .adapters()
        .await
        .map_err(Error::Bluetooth)?
        .into_iter()
        .next()
        .ok_or(Error::AdapterUnavailable)?;

    info!(
        "Using Bluetooth adapter: {:?}",
        adapter.adapter_info().await.ok()
    );

    let mut scanner = BtleScanner::with_adapter(adapter, events);
    scanner.track_adapter_state().await;
    let connector = scanner.connector();
    Ok((scanner, connector))
}

/// Whether an adapter in `state` can scan. `Unknown` is given the benefit
/// of the doubt.
fn is_powered(state: &CentralState) -> bool {
    !matches!(state, CentralState::PoweredOff)
}

/// Convert btleplug peripheral properties into a scan result.
fn advertisement(id: String, properties: PeripheralProperties) -> Advertisement {
    let mut device = DeviceIdentity::new(id, properties.address.to_string());
    if let Some(name) = properties.local_name {
        device = device.with_name(name);
    }

    let mut advertisement = Advertisement::new(device, properties.services);
    advertisement.rssi = properties.rssi;
    advertisement.payload = properties
        .manufacturer_data
        .into_values()
        .flatten()
        .collect();
    advertisement
}

/// Scan control over a btleplug adapter.
pub struct BtleScanner {
    adapter: Adapter,
    events: mpsc::UnboundedSender<BleEvent>,
    registry: Registry,
    powered: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
}

impl BtleScanner {
    /// Create a scanner on a specific adapter.
    pub fn with_adapter(adapter: Adapter, events: mpsc::UnboundedSender<BleEvent>) -> Self {
        Self {
            adapter,
            events,
            registry: Arc::new(RwLock::new(HashMap::new())),
            powered: Arc::new(AtomicBool::new(true)),
            pump: None,
            timer: None,
            watcher: None,
        }
    }

    /// Read the current adapter power state and keep it current.
    ///
    /// Until this runs the adapter is assumed powered. Requires a tokio
    /// runtime.
    pub async fn track_adapter_state(&mut self) {
        match self.adapter.adapter_state().await {
            Ok(state) => {
                debug!("Adapter state: {:?}", state);
                self.powered.store(is_powered(&state), Ordering::SeqCst);
            }
            Err(e) => warn!("Could not read adapter state: {}", e),
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }

        let mut stream = match self.adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot watch adapter state: {}", e);
                return;
            }
        };

        let powered = self.powered.clone();
        self.watcher = Some(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let CentralEvent::StateUpdate(state) = event {
                    debug!("Adapter state changed: {:?}", state);
                    powered.store(is_powered(&state), Ordering::SeqCst);
                }
            }
        }));
    }

    /// A connector that resolves devices found by this scanner.
    pub fn connector(&self) -> BtleConnector {
        BtleConnector {
            adapter: self.adapter.clone(),
            events: self.events.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn abort_tasks(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    async fn pump(
        adapter: Adapter,
        service: Uuid,
        events: mpsc::UnboundedSender<BleEvent>,
        registry: Registry,
    ) {
        let internal = ScanFailureReason::InternalError.code();

        let mut stream = match adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to get adapter events: {}", e);
                let _ = events.send(BleEvent::ScanFailed(internal));
                return;
            }
        };

        let filter = ScanFilter {
            services: vec![service],
        };
        if let Err(e) = adapter.start_scan(filter).await {
            error!("Failed to start adapter scan: {}", e);
            let _ = events.send(BleEvent::ScanFailed(internal));
            return;
        }

        while let Some(event) = stream.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ServicesAdvertisement { id, .. } => id,
                _ => continue,
            };

            let Some(advertisement) = Self::resolve(&adapter, &id, &registry).await else {
                continue;
            };

            if events.send(BleEvent::Advertisement(advertisement)).is_err() {
                debug!("Event receiver dropped, ending scan pump");
                break;
            }
        }

        debug!("Scan event loop ended");
    }

    async fn resolve(
        adapter: &Adapter,
        id: &PeripheralId,
        registry: &Registry,
    ) -> Option<Advertisement> {
        let peripheral = match adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        let identifier = id.to_string();
        registry.write().insert(identifier.clone(), peripheral);

        Some(advertisement(identifier, properties))
    }
}

impl ScanControl for BtleScanner {
    fn is_adapter_enabled(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn start_scan(&mut self, service: Uuid, timeout: Duration) -> Result<()> {
        let handle = runtime()?;
        self.abort_tasks();

        self.pump = Some(handle.spawn(Self::pump(
            self.adapter.clone(),
            service,
            self.events.clone(),
            self.registry.clone(),
        )));

        let events = self.events.clone();
        self.timer = Some(handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(BleEvent::ScanTimeout);
        }));

        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        let handle = runtime()?;
        self.abort_tasks();

        let adapter = self.adapter.clone();
        handle.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop adapter scan: {}", e);
            }
        });

        Ok(())
    }
}

impl Drop for BtleScanner {
    fn drop(&mut self) {
        self.abort_tasks();
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// Connects to peripherals found by a [`BtleScanner`].
#[derive(Clone)]
pub struct BtleConnector {
    adapter: Adapter,
    events: mpsc::UnboundedSender<BleEvent>,
    registry: Registry,
}

impl GattConnector for BtleConnector {
    type Gatt = BtleGatt;

    fn connect(&mut self, device: &DeviceIdentity) -> Result<BtleGatt> {
        let runtime = runtime()?;

        let peripheral = self
            .registry
            .read()
            .get(&device.id)
            .cloned()
            .ok_or_else(|| Error::ConnectionFailed {
                reason: format!("unknown peripheral {}", device.id),
            })?;

        let mut gatt = BtleGatt {
            peripheral,
            events: self.events.clone(),
            runtime,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            tasks: Vec::new(),
        };

        // Report link loss after the connection is up.
        let adapter = self.adapter.clone();
        let id = gatt.peripheral.id();
        let events = self.events.clone();
        gatt.spawn(async move {
            let mut stream = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Cannot watch for disconnects: {}", e);
                    return;
                }
            };
            while let Some(event) = stream.next().await {
                if matches!(&event, CentralEvent::DeviceDisconnected(other) if *other == id) {
                    debug!("Device disconnected: {:?}", id);
                    let _ = events.send(BleEvent::ConnectionStateChanged { connected: false });
                    break;
                }
            }
        });

        let peripheral = gatt.peripheral.clone();
        let events = self.events.clone();
        gatt.spawn(async move {
            let connected = match peripheral.connect().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Connection attempt failed: {}", e);
                    false
                }
            };
            let _ = events.send(BleEvent::ConnectionStateChanged { connected });
        });

        Ok(gatt)
    }
}

/// GATT handle for one connected peripheral.
pub struct BtleGatt {
    peripheral: Peripheral,
    events: mpsc::UnboundedSender<BleEvent>,
    runtime: Handle,
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl BtleGatt {
    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(self.runtime.spawn(task));
    }
}

impl GattClient for BtleGatt {
    fn discover_services(&mut self) -> Result<()> {
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        let cache = self.characteristics.clone();

        self.spawn(async move {
            let result = match peripheral.discover_services().await {
                Ok(()) => {
                    let mut cache = cache.write();
                    Ok(peripheral
                        .services()
                        .into_iter()
                        .map(|service| {
                            for c in &service.characteristics {
                                cache.insert(c.uuid, c.clone());
                            }
                            DiscoveredService::new(
                                service.uuid,
                                service.characteristics.iter().map(|c| c.uuid).collect(),
                            )
                        })
                        .collect())
                }
                Err(e) => {
                    warn!("Failed to discover services: {}", e);
                    Err(GattStatus::FAILURE)
                }
            };
            let _ = events.send(BleEvent::ServicesDiscovered(result));
        });

        Ok(())
    }

    fn read_characteristic(&mut self, uuid: Uuid) -> Result<()> {
        let characteristic = self
            .characteristics
            .read()
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicMissing {
                uuid: uuid.to_string(),
            })?;

        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        self.spawn(async move {
            let (status, value) = match peripheral.read(&characteristic).await {
                Ok(value) => (GattStatus::SUCCESS, value),
                Err(e) => {
                    warn!("Failed to read {}: {}", characteristic.uuid, e);
                    (GattStatus::FAILURE, Vec::new())
                }
            };
            let _ = events.send(BleEvent::CharacteristicRead {
                uuid: characteristic.uuid,
                status,
                value,
            });
        });

        Ok(())
    }

    fn disconnect(&mut self) {
        let peripheral = self.peripheral.clone();
        // Detached so that close() does not cancel it.
        self.runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                error!("Failed to disconnect: {}", e);
            }
        });
    }

    fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!("Closed GATT handle for {:?}", self.peripheral.id());
    }
}
