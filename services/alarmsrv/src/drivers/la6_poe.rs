//! PATLITE LA6-POE signal tower over the PNS binary protocol
//!
//! Every command opens a fresh TCP connection, writes one detail run
//! control frame and reads a single reply.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{AlarmDevice, DeviceError, DeviceOutcome};
use crate::config::La6Config;
use crate::domain::{AlarmMessage, Protocol, SensorInfo};

/// Product category 'AB'
pub const PNS_PRODUCT_ID: u16 = 0x4142;
/// Detail run control 'D'
pub const PNS_DETAIL_RUN_CONTROL: u8 = 0x44;
pub const PNS_NAK: u8 = 0x15;

const LED_GROUPS: usize = 5;
const BLINK: usize = 5;
const BUZZER: usize = 6;

/// Detail run control payload: five LED groups, blink flag, buzzer pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnsCommand(pub [u8; 7]);

impl Default for PnsCommand {
    /// All groups in the idle colour, no blink, buzzer off
    fn default() -> Self {
        PnsCommand([4, 4, 4, 4, 4, 0, 0])
    }
}

impl PnsCommand {
    /// Fold the alarm list into one command, later alarms overriding earlier fields
    pub fn from_alarms(alarms: &[AlarmMessage]) -> Self {
        let mut cmd = Self::default();
        for alarm in alarms {
            cmd.apply(
                &alarm.alarm_type.to_uppercase(),
                &alarm.alarm_value.to_uppercase(),
            );
        }
        cmd
    }

    fn set_leds(&mut self, code: u8) {
        self.0[..LED_GROUPS].fill(code);
        self.0[BLINK] = 0;
    }

    fn apply(&mut self, alarm_type: &str, value: &str) {
        match (alarm_type, value) {
            ("LED", "RED") => {
                self.set_leds(1);
                self.0[BUZZER] = 1;
            },
            ("LED", "YELLOW") => {
                self.set_leds(2);
                self.0[BUZZER] = 9;
            },
            ("LED", "GREEN") => self.set_leds(4),
            ("LED", "NONE") => self.set_leds(1),
            ("BUZZER", "OFF") => self.0[BUZZER] = 0,
            ("BUZZER", "ON") => {
                if self.0[BUZZER] == 0 {
                    self.0[BUZZER] = 1;
                }
            },
            ("BUZZER", pattern) if pattern.starts_with("PATTERN") => {
                self.0[BUZZER] = pattern["PATTERN".len()..]
                    .trim()
                    .parse::<i64>()
                    .map_or(1, |n| n.clamp(1, 3) as u8);
            },
            _ => {},
        }
    }

    /// `[product id BE][cmd][0x00][len BE][payload]`
    pub fn to_frame(&self) -> Bytes {
        let mut frame = BytesMut::with_capacity(6 + self.0.len());
        frame.put_u16(PNS_PRODUCT_ID);
        frame.put_u8(PNS_DETAIL_RUN_CONTROL);
        frame.put_u8(0x00);
        frame.put_u16(self.0.len() as u16);
        frame.put_slice(&self.0);
        frame.freeze()
    }
}

pub struct La6PoeDriver {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl La6PoeDriver {
    pub fn new(config: &La6Config) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }

    async fn run_control(&self, sensor: &SensorInfo, cmd: PnsCommand) -> Result<(), DeviceError> {
        let endpoint = sensor.endpoint();
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| DeviceError::Timeout("connecting"))?
            .map_err(|e| DeviceError::Connect {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        timeout(self.read_timeout, stream.write_all(&cmd.to_frame()))
            .await
            .map_err(|_| DeviceError::Timeout("sending PNS command"))??;

        let mut buf = [0u8; 1024];
        let n = timeout(self.read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| DeviceError::Timeout("waiting for PNS reply"))??;

        match buf[..n].first() {
            None => Err(DeviceError::EmptyResponse),
            Some(&PNS_NAK) => Err(DeviceError::Nak),
            Some(_) => {
                debug!("LA6-POE {} replied {:02x?}", sensor.name, &buf[..n]);
                Ok(())
            },
        }
    }
}

#[async_trait]
impl AlarmDevice for La6PoeDriver {
    fn protocol(&self) -> Protocol {
        Protocol::La6Poe
    }

    async fn send(&self, sensor: &SensorInfo, alarms: &[AlarmMessage]) -> DeviceOutcome {
        let cmd = PnsCommand::from_alarms(alarms);
        for alarm in alarms {
            info!(
                "LA6-POE request type={} payload={} sensor={}",
                alarm.alarm_type, alarm.alarm_value, sensor.name
            );
        }
        match self.run_control(sensor, cmd).await {
            Ok(()) => DeviceOutcome::Success,
            Err(e) => e.into(),
        }
    }

    async fn stop(&self, sensor: &SensorInfo, alarm: &AlarmMessage) -> DeviceOutcome {
        info!(
            "LA6-POE stop type={} payload={} sensor={}",
            alarm.alarm_type, alarm.alarm_value, sensor.name
        );
        match self.run_control(sensor, PnsCommand::default()).await {
            Ok(()) => DeviceOutcome::Success,
            Err(e) => e.into(),
        }
    }
}
