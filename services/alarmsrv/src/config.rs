//! AlarmSrv configuration
//!
//! Layered with figment: built-in defaults, then the YAML file, then
//! `ALARMSRV_` environment variables (`__` separates nested keys, e.g.
//! `ALARMSRV_BUS__REDIS_URL`).

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AlarmSrvError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/alarmsrv.yaml";
pub const ENV_PREFIX: &str = "ALARMSRV_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlarmsrvConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub dispatch: DispatchConfig,
    pub speaker: SpeakerConfig,
    pub iologik: IoLogikConfig,
    pub la6: La6Config,
}

/// Admin API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "alarmsrv".to_string(),
            host: common::DEFAULT_API_HOST.to_string(),
            port: 6010,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding `sensors` and `sensor_types`
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/alarmsrv.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    pub redis_url: String,
    /// Alarm-state updates (JSON array payload)
    pub alarm_channel: String,
    /// Any message here reloads the sensor cache
    pub reload_channel: String,
    /// Delay before resubscribing after the connection drops
    pub reconnect_delay_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: common::DEFAULT_REDIS_URL.to_string(),
            alarm_channel: "alarm.updated".to_string(),
            reload_channel: "sensor.changed".to_string(),
            reconnect_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Countdown tick; every active alarm loses this much duration per tick
    pub tick_interval_ms: u64,
    /// Queued commands on one sensor lane above which a backlog warning is logged
    pub lane_backlog_warn: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            lane_backlog_warn: 64,
        }
    }
}

impl DispatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// AEPEL IP speaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeakerConfig {
    pub username: String,
    pub password: String,
    pub poll_interval_ms: u64,
    /// Slack added to a voice port's regen interval before it counts as stale
    pub margin_ms: u64,
    /// Tracked endpoints above this count are all evicted
    pub max_endpoints: usize,
    pub request_timeout_ms: u64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "aepel1234".to_string(),
            poll_interval_ms: 250,
            margin_ms: 2000,
            max_endpoints: 16,
            request_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IoLogikConfig {
    pub request_timeout_ms: u64,
}

impl Default for IoLogikConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct La6Config {
    pub connect_timeout_ms: u64,
    /// Bounds both the command write and the wait for the reply
    pub read_timeout_ms: u64,
}

impl Default for La6Config {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3000,
            read_timeout_ms: 3000,
        }
    }
}

impl AlarmsrvConfig {
    /// Load from `path` (missing file is fine) and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AlarmsrvConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings that would stall or spin the service
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 8] = [
            ("dispatch.tick_interval_ms", self.dispatch.tick_interval_ms > 0),
            ("dispatch.lane_backlog_warn", self.dispatch.lane_backlog_warn > 0),
            ("speaker.poll_interval_ms", self.speaker.poll_interval_ms > 0),
            ("speaker.request_timeout_ms", self.speaker.request_timeout_ms > 0),
            ("iologik.request_timeout_ms", self.iologik.request_timeout_ms > 0),
            ("la6.connect_timeout_ms", self.la6.connect_timeout_ms > 0),
            ("la6.read_timeout_ms", self.la6.read_timeout_ms > 0),
            ("bus.alarm_channel", !self.bus.alarm_channel.trim().is_empty()),
        ];

        if let Some((field, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(AlarmSrvError::Config(format!(
                "{} must be non-zero / non-empty",
                field
            )));
        }
        if self.bus.redis_url.trim().is_empty() {
            return Err(AlarmSrvError::Config("bus.redis_url cannot be empty".to_string()));
        }
        Ok(())
    }
}
