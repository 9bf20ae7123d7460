//! Advantech ADAM-6050 digital output controller
//!
//! Placeholder: logs the Modbus/TCP write it would perform.

use async_trait::async_trait;
use tracing::info;

use super::{AlarmDevice, DeviceOutcome};
use crate::domain::{AlarmMessage, Protocol, SensorInfo};

#[derive(Debug, Default)]
pub struct Adam6050Driver;

impl Adam6050Driver {
    pub fn new() -> Self {
        Self
    }
}

fn on_off_label(alarm: &AlarmMessage) -> String {
    alarm
        .on_off
        .map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

#[async_trait]
impl AlarmDevice for Adam6050Driver {
    fn protocol(&self) -> Protocol {
        Protocol::Adam6050
    }

    async fn send(&self, sensor: &SensorInfo, alarms: &[AlarmMessage]) -> DeviceOutcome {
        for alarm in alarms {
            info!(
                "[Adam6050] send (noop) port={} type={} onOff={} sensor={}",
                alarm.alarm_value,
                alarm.alarm_type,
                on_off_label(alarm),
                sensor.name
            );
        }
        DeviceOutcome::skipped("Modbus output not implemented")
    }

    async fn stop(&self, sensor: &SensorInfo, alarm: &AlarmMessage) -> DeviceOutcome {
        info!(
            "[Adam6050] stop (noop) port={} type={} onOff={} sensor={}",
            alarm.alarm_value,
            alarm.alarm_type,
            on_off_label(alarm),
            sensor.name
        );
        DeviceOutcome::skipped("Modbus output not implemented")
    }
}
