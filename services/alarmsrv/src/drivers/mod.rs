//! Device drivers
//!
//! One driver per [`Protocol`]. Drivers translate the abstract "set alarm
//! state" / "clear alarm state" commands into device I/O and report a
//! [`DeviceOutcome`]; no device failure ever propagates to the caller.

pub mod adam6050;
pub mod aepel;
pub mod iologik;
pub mod la6_poe;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AlarmsrvConfig;
use crate::domain::{AlarmMessage, Protocol, SensorInfo};

pub use adam6050::Adam6050Driver;
pub use aepel::AepelSpeakerDriver;
pub use iologik::IoLogikDriver;
pub use la6_poe::La6PoeDriver;

/// Result of one device call, consumed only for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Success,
    Failure { reason: String },
    /// Nothing was sent on purpose (time restriction, placeholder driver)
    Skipped { reason: String },
}

impl DeviceOutcome {
    pub fn failure(reason: impl fmt::Display) -> Self {
        DeviceOutcome::Failure {
            reason: reason.to_string(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        DeviceOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeviceOutcome::Success)
    }

    /// Emit the single log line closing a device call
    pub fn log(&self, action: &str, sensor: &SensorInfo, alarm: Option<&AlarmMessage>) {
        let (alarm_type, alarm_value) = alarm
            .map(|a| (a.alarm_type.as_str(), a.alarm_value.as_str()))
            .unwrap_or(("", ""));
        match self {
            DeviceOutcome::Success => info!(
                "{} ok: sensor={} ({}) alarmType={} alarmValue={}",
                action, sensor.id, sensor.name, alarm_type, alarm_value
            ),
            DeviceOutcome::Failure { reason } => warn!(
                "{} failed: sensor={} ({}) alarmType={} alarmValue={}: {}",
                action, sensor.id, sensor.name, alarm_type, alarm_value, reason
            ),
            DeviceOutcome::Skipped { reason } => debug!(
                "{} skipped: sensor={} ({}) alarmType={} alarmValue={}: {}",
                action, sensor.id, sensor.name, alarm_type, alarm_value, reason
            ),
        }
    }
}

impl From<DeviceError> for DeviceOutcome {
    fn from(err: DeviceError) -> Self {
        DeviceOutcome::failure(err)
    }
}

/// Internal driver errors, converted to [`DeviceOutcome::Failure`] at the boundary
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Device returned HTTP {0}")]
    Status(u16),

    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Timed out {0}")]
    Timeout(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device rejected command (NAK)")]
    Nak,

    #[error("Device closed the connection without replying")]
    EmptyResponse,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("State mismatch: expected {expected}, read back {actual}")]
    Verification { expected: i64, actual: i64 },
}

/// Alarm device protocol driver
#[async_trait]
pub trait AlarmDevice: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Apply the full current alarm list for one sensor
    async fn send(&self, sensor: &SensorInfo, alarms: &[AlarmMessage]) -> DeviceOutcome;

    /// Clear the state set for `alarm`
    async fn stop(&self, sensor: &SensorInfo, alarm: &AlarmMessage) -> DeviceOutcome;

    /// Release background tasks and connections
    async fn shutdown(&self) {}
}

/// Protocol -> driver lookup
#[derive(Clone, Default)]
pub struct DriverTable {
    drivers: HashMap<Protocol, Arc<dyn AlarmDevice>>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four production drivers
    pub fn standard(config: &AlarmsrvConfig) -> Self {
        Self::new()
            .with_driver(Arc::new(Adam6050Driver::new()))
            .with_driver(Arc::new(IoLogikDriver::new(&config.iologik)))
            .with_driver(Arc::new(AepelSpeakerDriver::new(config.speaker.clone())))
            .with_driver(Arc::new(La6PoeDriver::new(&config.la6)))
    }

    /// Register or replace the driver for its protocol
    pub fn with_driver(mut self, driver: Arc<dyn AlarmDevice>) -> Self {
        self.drivers.insert(driver.protocol(), driver);
        self
    }

    pub fn get(&self, protocol: Protocol) -> Option<Arc<dyn AlarmDevice>> {
        self.drivers.get(&protocol).cloned()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub async fn shutdown_all(&self) {
        for driver in self.drivers.values() {
            driver.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_covers_all_protocols() {
        let table = DriverTable::standard(&AlarmsrvConfig::default());
        assert_eq!(table.len(), Protocol::ALL.len());
        for protocol in Protocol::ALL {
            let driver = table.get(protocol);
            assert!(driver.is_some_and(|d| d.protocol() == protocol));
        }
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome: DeviceOutcome = DeviceError::Nak.into();
        assert_eq!(
            outcome,
            DeviceOutcome::Failure {
                reason: "Device rejected command (NAK)".to_string()
            }
        );
        assert!(!outcome.is_success());
    }
}
