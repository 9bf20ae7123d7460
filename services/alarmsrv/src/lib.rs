//! AlarmSrv - alarm device orchestration
//!
//! Receives alarm-state updates from the bus, keeps the active alarm set
//! per sensor with a duration countdown, and drives the physical devices
//! (I/O relays, IP speakers, LED towers) through protocol drivers.

pub mod api;
pub mod bootstrap;
pub mod bus;
pub mod cache;
pub mod config;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod service;

pub use cache::{DeviceCache, MemorySensorStore, SensorStore, SqliteSensorStore};
pub use config::AlarmsrvConfig;
pub use domain::{AlarmMessage, Protocol, SensorInfo};
pub use drivers::{AlarmDevice, DeviceOutcome, DriverTable};
pub use error::{AlarmSrvError, Result};
pub use service::{AlarmService, AlarmServiceHandle};
