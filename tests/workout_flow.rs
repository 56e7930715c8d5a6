//! End-to-end sync flows through the public API.

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use treadmill_workout_ble::{
    Advertisement, AlwaysGranted, BleEvent, DeviceIdentity, DiscoveredService, GattClient,
    GattConnector, GattStatus, MemorySink, PermissionGateway, Result, ScanControl, SyncConfig,
    SyncOutcome, SyncStatus, WorkoutCharacteristic, WorkoutSync,
};
use treadmill_workout_ble::ble::uuids::WORKOUT_SERVICE_UUID;
use uuid::Uuid;

/// Platform stand-in that answers every request on the event channel,
/// the way a radio stack would.
#[derive(Clone)]
struct SimulatedTreadmill {
    events: mpsc::UnboundedSender<BleEvent>,
    payloads: Arc<Vec<(Uuid, Vec<u8>)>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl SimulatedTreadmill {
    fn new(events: mpsc::UnboundedSender<BleEvent>, payloads: Vec<(Uuid, Vec<u8>)>) -> Self {
        Self {
            events,
            payloads: Arc::new(payloads),
            log: Arc::default(),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().push(entry.into());
    }
}

impl ScanControl for SimulatedTreadmill {
    fn is_adapter_enabled(&self) -> bool {
        true
    }

    fn start_scan(&mut self, service: Uuid, _timeout: Duration) -> Result<()> {
        self.record("scan");
        let nearby = DeviceIdentity::new("other", "11:22:33:44:55:66").with_name("Headphones");
        let treadmill = DeviceIdentity::new("tm", "AA:BB:CC:DD:EE:FF").with_name("TR-900");
        let _ = self
            .events
            .send(BleEvent::Advertisement(Advertisement::new(nearby, vec![])));
        let _ = self.events.send(BleEvent::Advertisement(
            Advertisement::new(treadmill, vec![service]).with_rssi(-55),
        ));
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        self.record("stop");
        Ok(())
    }
}

impl GattConnector for SimulatedTreadmill {
    type Gatt = SimulatedTreadmill;

    fn connect(&mut self, device: &DeviceIdentity) -> Result<Self::Gatt> {
        self.record(format!("connect {}", device.address));
        let _ = self
            .events
            .send(BleEvent::ConnectionStateChanged { connected: true });
        Ok(self.clone())
    }
}

impl GattClient for SimulatedTreadmill {
    fn discover_services(&mut self) -> Result<()> {
        let characteristics = self.payloads.iter().map(|(uuid, _)| *uuid).collect();
        let _ = self.events.send(BleEvent::ServicesDiscovered(Ok(vec![
            DiscoveredService::new(WORKOUT_SERVICE_UUID, characteristics),
        ])));
        Ok(())
    }

    fn read_characteristic(&mut self, uuid: Uuid) -> Result<()> {
        self.record(format!("read {}", uuid));
        let value = self
            .payloads
            .iter()
            .find(|(u, _)| *u == uuid)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let _ = self.events.send(BleEvent::CharacteristicRead {
            uuid,
            status: GattStatus::SUCCESS,
            value,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.record("disconnect");
    }

    fn close(self) {
        self.record("close");
    }
}

fn morning_run() -> Vec<(Uuid, Vec<u8>)> {
    vec![
        (WorkoutCharacteristic::ElapsedTime.uuid(), 1800i32.to_be_bytes().to_vec()),
        (WorkoutCharacteristic::AvgHeartRate.uuid(), 142u16.to_be_bytes().to_vec()),
        (WorkoutCharacteristic::TotalDistance.uuid(), 5000f32.to_be_bytes().to_vec()),
        (WorkoutCharacteristic::CaloriesBurned.uuid(), 320u16.to_be_bytes().to_vec()),
        (WorkoutCharacteristic::Title.uuid(), b"Morning Run".to_vec()),
    ]
}

fn permissions() -> Arc<dyn PermissionGateway> {
    Arc::new(AlwaysGranted)
}

#[tokio::test]
async fn syncs_and_persists_a_complete_workout() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let platform = SimulatedTreadmill::new(tx, morning_run());
    let sink = Arc::new(MemorySink::new());

    let mut sync = WorkoutSync::new(
        platform.clone(),
        platform.clone(),
        sink.clone(),
        permissions(),
        SyncConfig::default(),
    );
    let mut status = sync.subscribe();

    let outcome = sync.run(&mut rx).await.unwrap();

    let saved = sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].title, "Morning Run");
    assert_eq!(saved[0].elapsed_s, 1800);
    assert_eq!(saved[0].distance_m, 5000.0);
    assert_eq!(outcome, SyncOutcome::Saved(saved[0].clone()));

    let reads: Vec<String> = platform
        .log()
        .into_iter()
        .filter(|e| e.starts_with("read "))
        .collect();
    let expected: Vec<String> = WorkoutCharacteristic::CANONICAL_ORDER
        .iter()
        .map(|c| format!("read {}", c.uuid()))
        .collect();
    assert_eq!(reads, expected);

    let log = platform.log();
    assert_eq!(log.first().map(String::as_str), Some("scan"));
    assert_eq!(log.iter().filter(|e| *e == "close").count(), 1);
    assert_eq!(log.iter().filter(|e| e.starts_with("connect")).count(), 1);

    let mut statuses = Vec::new();
    while let Ok(s) = status.try_recv() {
        statuses.push(s);
    }
    assert_eq!(statuses.first(), Some(&SyncStatus::Scanning));
    assert_eq!(
        statuses.last(),
        Some(&SyncStatus::WorkoutSaved {
            title: "Morning Run".to_string()
        })
    );
}

#[tokio::test]
async fn truncated_distance_blocks_persistence() {
    let mut payloads = morning_run();
    payloads[2].1.truncate(3);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let platform = SimulatedTreadmill::new(tx, payloads);
    let sink = Arc::new(MemorySink::new());

    let mut sync = WorkoutSync::new(
        platform.clone(),
        platform.clone(),
        sink.clone(),
        permissions(),
        SyncConfig::default(),
    );

    let outcome = sync.run(&mut rx).await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Incomplete {
            missing: vec!["total_distance"]
        }
    );
    assert!(sink.saved().is_empty());
    // The remaining reads still ran after the decode failure.
    assert_eq!(
        platform.log().iter().filter(|e| e.starts_with("read ")).count(),
        5
    );
}
