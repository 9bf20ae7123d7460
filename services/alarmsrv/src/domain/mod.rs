//! Domain model: sensors, protocols and alarm messages

pub mod message;
pub mod sensor;

pub use message::{parse_payload, AlarmMessage};
pub use sensor::{Protocol, SensorInfo, TimeRestriction};
