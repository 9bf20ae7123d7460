//! Shared test fixtures
#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use alarmsrv::config::DispatchConfig;
use alarmsrv::domain::{AlarmMessage, Protocol, SensorInfo};
use alarmsrv::drivers::{AlarmDevice, DeviceOutcome, DriverTable};
use alarmsrv::{AlarmService, AlarmServiceHandle, DeviceCache, MemorySensorStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One observed driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { sensor_id: String, values: Vec<String> },
    Stop { sensor_id: String, value: String },
    Shutdown,
}

/// How the fake driver misbehaves for a given sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Fail,
    Panic,
}

/// Driver that records every call instead of touching hardware
pub struct RecordingDriver {
    protocol: Protocol,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Vec<(String, Fault)>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingDriver {
    pub fn new(protocol: Protocol) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        })
    }

    /// Make every send and stop take `delay`, like a slow device
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fail_for(&self, sensor_id: &str, fault: Fault) {
        self.faults.lock().push((sensor_id.to_string(), fault));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, sensor_id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| match c {
                Call::Send { sensor_id: id, .. } | Call::Stop { sensor_id: id, .. } => {
                    id == sensor_id
                },
                Call::Shutdown => false,
            })
            .collect()
    }

    fn fault(&self, sensor_id: &str) -> Option<Fault> {
        self.faults
            .lock()
            .iter()
            .find(|(id, _)| id == sensor_id)
            .map(|(_, f)| *f)
    }

    async fn settle(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn outcome(&self, sensor_id: &str) -> DeviceOutcome {
        match self.fault(sensor_id) {
            Some(Fault::Panic) => panic!("simulated socket error on {}", sensor_id),
            Some(Fault::Fail) => DeviceOutcome::failure("simulated socket error"),
            None => DeviceOutcome::Success,
        }
    }
}

#[async_trait]
impl AlarmDevice for RecordingDriver {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn send(&self, sensor: &SensorInfo, alarms: &[AlarmMessage]) -> DeviceOutcome {
        self.calls.lock().push(Call::Send {
            sensor_id: sensor.id.clone(),
            values: alarms.iter().map(|a| a.alarm_value.clone()).collect(),
        });
        self.settle().await;
        self.outcome(&sensor.id)
    }

    async fn stop(&self, sensor: &SensorInfo, alarm: &AlarmMessage) -> DeviceOutcome {
        self.calls.lock().push(Call::Stop {
            sensor_id: sensor.id.clone(),
            value: alarm.alarm_value.clone(),
        });
        self.settle().await;
        self.outcome(&sensor.id)
    }

    async fn shutdown(&self) {
        self.calls.lock().push(Call::Shutdown);
    }
}

pub fn alarm(sensor_id: &str, alarm_type: &str, value: &str, duration_ms: i64) -> AlarmMessage {
    AlarmMessage {
        sensor_id: sensor_id.to_string(),
        type_id: "t-la6".to_string(),
        alarm_type: alarm_type.to_string(),
        alarm_value: value.to_string(),
        duration_ms,
        regen_interval_ms: 0,
        priority: 0,
        on_off: None,
    }
}

/// Store with LA6 towers `s1`..`sN` of type `t-la6`
pub fn tower_store(count: usize) -> Arc<MemorySensorStore> {
    let store = Arc::new(MemorySensorStore::new());
    store.upsert_type("t-la6", "LA6_POE");
    for i in 1..=count {
        store.upsert_sensor(SensorInfo::new(
            format!("s{}", i),
            format!("tower {}", i),
            "t-la6",
            "127.0.0.1",
            10000,
        ));
    }
    store
}

pub struct TestService {
    pub handle: AlarmServiceHandle,
    pub driver: Arc<RecordingDriver>,
    pub store: Arc<MemorySensorStore>,
}

/// Dispatch service over `tower_store(sensors)` with a recording LA6 driver
pub async fn start_service(sensors: usize, tick_interval_ms: u64) -> TestService {
    let store = tower_store(sensors);
    let cache = Arc::new(DeviceCache::new(store.clone()));
    cache.reload().await.unwrap();

    let driver = RecordingDriver::new(Protocol::La6Poe);
    let drivers = DriverTable::new().with_driver(driver.clone());
    let config = DispatchConfig {
        tick_interval_ms,
        ..Default::default()
    };
    let handle = AlarmService::spawn(&config, cache, drivers);
    TestService {
        handle,
        driver,
        store,
    }
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
