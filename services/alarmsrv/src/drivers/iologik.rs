//! MOXA ioLogik E1211 digital outputs over the RESTful API
//!
//! Each command writes `doStatus` with a PUT and reads it back with a GET;
//! the call only succeeds when the device reports the requested state.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AlarmDevice, DeviceError, DeviceOutcome};
use crate::config::IoLogikConfig;
use crate::domain::{AlarmMessage, Protocol, SensorInfo};

/// Media type the RESTful API insists on
const ACCEPT_HEADER: &str = "vdn.dac.v1/*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoStatus {
    Off = 0,
    On = 1,
}

impl DoStatus {
    /// Target for `send`: On unless the message says `onOff != 1`
    pub fn for_send(alarm: &AlarmMessage) -> Self {
        match alarm.on_off {
            None | Some(1) => DoStatus::On,
            Some(_) => DoStatus::Off,
        }
    }

    /// Target for `stop`: the inverse of [`for_send`](Self::for_send)
    pub fn for_stop(alarm: &AlarmMessage) -> Self {
        match Self::for_send(alarm) {
            DoStatus::On => DoStatus::Off,
            DoStatus::Off => DoStatus::On,
        }
    }

    /// Anything other than 1, including read errors, counts as Off
    fn from_raw(raw: i64) -> Self {
        if raw == 1 {
            DoStatus::On
        } else {
            DoStatus::Off
        }
    }
}

pub struct IoLogikDriver {
    client: Client,
}

impl IoLogikDriver {
    pub fn new(config: &IoLogikConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!("ioLogik HTTP client fallback to defaults: {}", e);
                Client::new()
            });
        Self { client }
    }

    fn status_url(sensor: &SensorInfo, index: u32) -> String {
        format!(
            "http://{}:{}/api/slot/0/io/do/{}/doStatus",
            sensor.ip, sensor.port, index
        )
    }

    async fn write_status(
        &self,
        sensor: &SensorInfo,
        index: u32,
        status: DoStatus,
    ) -> Result<(), DeviceError> {
        let body = json!({
            "slot": 0,
            "io": { "do": { index.to_string(): { "doStatus": status as i64 } } }
        });
        let response = self
            .client
            .put(Self::status_url(sensor, index))
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeviceError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Current `doStatus`, -1 when it cannot be read
    async fn read_status(&self, sensor: &SensorInfo, index: u32) -> i64 {
        match self.try_read_status(sensor, index).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("ioLogik {} read of DO{} failed: {}", sensor.endpoint(), index, e);
                -1
            },
        }
    }

    async fn try_read_status(&self, sensor: &SensorInfo, index: u32) -> Result<i64, DeviceError> {
        let response = self
            .client
            .get(Self::status_url(sensor, index))
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeviceError::Status(response.status().as_u16()));
        }
        let body: Value = response.json().await?;
        Ok(parse_do_status(&body))
    }

    /// Write then verify one output
    async fn apply(
        &self,
        sensor: &SensorInfo,
        alarm: &AlarmMessage,
        target: DoStatus,
    ) -> Result<(), DeviceError> {
        let index: u32 = alarm.alarm_value.trim().parse().map_err(|_| {
            DeviceError::InvalidCommand(format!("'{}' is not a DO index", alarm.alarm_value))
        })?;

        // A rejected write is still verified: the output may already be in the target state
        if let Err(e) = self.write_status(sensor, index, target).await {
            warn!("ioLogik {} write of DO{} failed: {}", sensor.endpoint(), index, e);
        }
        debug!(
            "ioLogik request port={} type={} payload={:?} sensor={}",
            alarm.alarm_value, alarm.alarm_type, target, sensor.name
        );

        let current = DoStatus::from_raw(self.read_status(sensor, index).await);
        if current != target {
            return Err(DeviceError::Verification {
                expected: target as i64,
                actual: current as i64,
            });
        }
        Ok(())
    }
}

/// First entry of `io.do`, e.g. `{"io":{"do":{"0":{"doStatus":1}}}}` -> 1
pub fn parse_do_status(body: &Value) -> i64 {
    body.get("io")
        .and_then(|io| io.get("do"))
        .and_then(Value::as_object)
        .and_then(|entries| entries.values().next())
        .and_then(|entry| entry.get("doStatus"))
        .and_then(Value::as_i64)
        .unwrap_or(-1)
}

#[async_trait]
impl AlarmDevice for IoLogikDriver {
    fn protocol(&self) -> Protocol {
        Protocol::IoLogikE1211
    }

    async fn send(&self, sensor: &SensorInfo, alarms: &[AlarmMessage]) -> DeviceOutcome {
        let mut failures = Vec::new();
        for alarm in alarms {
            let target = DoStatus::for_send(alarm);
            if let Err(e) = self.apply(sensor, alarm, target).await {
                failures.push(format!("DO{}: {}", alarm.alarm_value, e));
            }
        }

        if failures.is_empty() {
            DeviceOutcome::Success
        } else {
            DeviceOutcome::failure(failures.join("; "))
        }
    }

    async fn stop(&self, sensor: &SensorInfo, alarm: &AlarmMessage) -> DeviceOutcome {
        match self.apply(sensor, alarm, DoStatus::for_stop(alarm)).await {
            Ok(()) => DeviceOutcome::Success,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(on_off: Option<i64>) -> AlarmMessage {
        AlarmMessage {
            sensor_id: "s1".into(),
            type_id: "t".into(),
            alarm_type: "DO".into(),
            alarm_value: "2".into(),
            duration_ms: 1000,
            regen_interval_ms: 0,
            priority: 0,
            on_off,
        }
    }

    #[test]
    fn test_targets() {
        assert_eq!(DoStatus::for_send(&alarm(None)), DoStatus::On);
        assert_eq!(DoStatus::for_send(&alarm(Some(1))), DoStatus::On);
        assert_eq!(DoStatus::for_send(&alarm(Some(0))), DoStatus::Off);
        assert_eq!(DoStatus::for_stop(&alarm(None)), DoStatus::Off);
        assert_eq!(DoStatus::for_stop(&alarm(Some(1))), DoStatus::Off);
        assert_eq!(DoStatus::for_stop(&alarm(Some(0))), DoStatus::On);
    }

    #[test]
    fn test_parse_do_status() {
        assert_eq!(parse_do_status(&json!({"io":{"do":{"2":{"doStatus":1}}}})), 1);
        assert_eq!(parse_do_status(&json!({"io":{"do":{"2":{"doStatus":0}}}})), 0);
        assert_eq!(parse_do_status(&json!({"io":{"do":{}}})), -1);
        assert_eq!(parse_do_status(&json!({"error":"x"})), -1);
    }
}
