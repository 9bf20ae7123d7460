//! Alarm dispatch: active alarm state, countdown and device command lanes

pub mod alarm_service;
pub mod dispatcher;
pub mod registry;

pub use alarm_service::{AlarmService, AlarmServiceHandle};
pub use dispatcher::CommandDispatcher;
pub use registry::{ActiveSensor, AlarmRegistry, DeviceCommand};
