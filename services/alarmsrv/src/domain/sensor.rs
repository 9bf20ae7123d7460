//! Sensor configuration snapshot and protocol names

use chrono::{Local, Timelike};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Default cap on how long one speaker voice port may keep playing (seconds)
pub const DEFAULT_MAX_TIME_SECS: i64 = 120;
/// Default pause between two speaker plays (seconds)
pub const DEFAULT_PAUSE_TIME_SECS: i64 = 2;

/// Device protocol family, selected by the sensor type's name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Adam6050,
    IoLogikE1211,
    AepelSpeaker,
    La6Poe,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Adam6050,
        Protocol::IoLogikE1211,
        Protocol::AepelSpeaker,
        Protocol::La6Poe,
    ];

    /// Name stored in `sensor_types.name`
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Adam6050 => "Adam6050",
            Protocol::IoLogikE1211 => "IoLogik_E1211",
            Protocol::AepelSpeaker => "AEPEL_IPSpeaker",
            Protocol::La6Poe => "LA6_POE",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown protocol '{}'", s))
    }
}

/// Daily window, in minutes since local midnight, during which alarms are suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRestriction {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl TimeRestriction {
    /// Boundaries are inclusive; `start > end` wraps past midnight and
    /// `start == end` never restricts.
    pub fn is_restricted_at(&self, minute_of_day: u32) -> bool {
        let (start, end) = (self.start_minute, self.end_minute);
        if start == end {
            false
        } else if start < end {
            (start..=end).contains(&minute_of_day)
        } else {
            minute_of_day >= start || minute_of_day <= end
        }
    }
}

/// One physical alarm device as configured in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorInfo {
    pub id: String,
    pub name: String,
    pub type_id: String,
    pub ip: String,
    pub port: u16,
    /// Speaker only: seconds a voice port may play before being cut off
    pub max_time_secs: i64,
    /// Speaker only: seconds to wait after each play
    pub pause_time_secs: i64,
    pub restriction: Option<TimeRestriction>,
}

impl SensorInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        type_id: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_id: type_id.into(),
            ip: ip.into(),
            port,
            max_time_secs: DEFAULT_MAX_TIME_SECS,
            pause_time_secs: DEFAULT_PAUSE_TIME_SECS,
            restriction: None,
        }
    }

    pub fn with_speaker_timing(mut self, max_time_secs: i64, pause_time_secs: i64) -> Self {
        self.max_time_secs = max_time_secs;
        self.pause_time_secs = pause_time_secs;
        self
    }

    pub fn with_restriction(mut self, start_minute: u32, end_minute: u32) -> Self {
        self.restriction = Some(TimeRestriction {
            start_minute,
            end_minute,
        });
        self
    }

    /// `ip:port`, also the speaker endpoint key
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn is_restricted_at(&self, minute_of_day: u32) -> bool {
        self.restriction
            .is_some_and(|r| r.is_restricted_at(minute_of_day))
    }

    /// Evaluate the restriction window against the local wall clock
    pub fn is_current_time_restricted(&self) -> bool {
        let now = Local::now();
        self.is_restricted_at(now.hour() * 60 + now.minute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        assert_eq!("IoLogik_E1211".parse::<Protocol>(), Ok(Protocol::IoLogikE1211));
        assert_eq!("AEPEL_IPSpeaker".parse::<Protocol>(), Ok(Protocol::AepelSpeaker));
        assert_eq!("LA6_POE".parse::<Protocol>(), Ok(Protocol::La6Poe));
        assert_eq!("Adam6050".parse::<Protocol>(), Ok(Protocol::Adam6050));
        assert!("la6_poe".parse::<Protocol>().is_err());
        for p in Protocol::ALL {
            assert_eq!(p.to_string().parse::<Protocol>(), Ok(p));
        }
    }

    #[test]
    fn test_equal_bounds_never_restrict() {
        let r = TimeRestriction {
            start_minute: 600,
            end_minute: 600,
        };
        assert!((0..1440).all(|m| !r.is_restricted_at(m)));
    }

    #[test]
    fn test_overnight_window() {
        let r = TimeRestriction {
            start_minute: 1320,
            end_minute: 360,
        };
        assert!(r.is_restricted_at(1380)); // 23:00
        assert!(!r.is_restricted_at(420)); // 07:00
        assert!(r.is_restricted_at(1320));
        assert!(r.is_restricted_at(360));
        assert!(r.is_restricted_at(0));
        assert!(!r.is_restricted_at(361));
        assert!(!r.is_restricted_at(1319));
    }

    #[test]
    fn test_daytime_window() {
        let r = TimeRestriction {
            start_minute: 540,
            end_minute: 1080,
        };
        assert!(r.is_restricted_at(540));
        assert!(r.is_restricted_at(1080));
        assert!(!r.is_restricted_at(539));
        assert!(!r.is_restricted_at(1081));
    }

    #[test]
    fn test_unrestricted_sensor() {
        let sensor = SensorInfo::new("s1", "hall", "t1", "10.0.0.5", 80);
        assert!(!sensor.is_current_time_restricted());
        assert_eq!(sensor.endpoint(), "10.0.0.5:80");
        assert_eq!(sensor.max_time_secs, DEFAULT_MAX_TIME_SECS);

        let always = sensor.with_restriction(0, 1439);
        assert!(always.is_restricted_at(720));
    }
}
